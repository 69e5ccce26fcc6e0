//! Operator link → station pipeline.
//!
//! Bytes go through the frame decoder exactly as they arrive on the
//! serial port; replies and side effects are checked on the mock rig.

use otv_daq::adapters::time::ManualClock;
use otv_daq::app::service::sample_once;
use otv_daq::drivers::valves::Channel;
use otv_daq::rpc::codec::FrameDecoder;
use otv_daq::sensors::Sensor;

use crate::mock_hw::{Rig, Write};

fn send(rig: &Rig, decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<String> {
    let mut replies = Vec::new();
    decoder.feed(bytes, |body| replies.extend(rig.station.handle_frame(body)));
    replies
}

fn sample_all(rig: &Rig) {
    for sensor in rig.station.sensors().iter() {
        sample_once(sensor.as_ref());
    }
}

#[test]
fn query_lists_sensors_then_actuators() {
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();
    rig.clock.set(25);
    rig.pt1.set(3.5);
    sample_all(&rig);

    let replies = send(&rig, &mut decoder, b"\r\n{}\r\n");
    assert_eq!(
        replies,
        vec![r#"{"PT1":[25,3.5,3.5],"LC1":[25,0.0,0.0],"actuators":[0,0,0,0,0,0,0,0]}"#]
    );
}

#[test]
fn query_split_across_reads_still_answers() {
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();
    assert!(send(&rig, &mut decoder, b"{").is_empty());
    assert_eq!(send(&rig, &mut decoder, b"}").len(), 1);
}

#[test]
fn channel_frame_then_query_reflects_states() {
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();

    let replies = send(&rig, &mut decoder, b"{S00001001}{}");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].ends_with(r#""actuators":[0,0,0,0,1,0,0,1]}"#));
    assert!(rig.station.channels().get(Channel::HeliumBottle));
    assert_eq!(rig.driver.len(), 8);
}

#[test]
fn tare_frame_calibrates_load_cell() {
    let rig = Rig::new(ManualClock::new(1));
    let mut decoder = FrameDecoder::new();
    rig.lc1.set(0.8);

    send(&rig, &mut decoder, b"{TLC1,50}");
    crate::mock_hw::wait_for(|| rig.station.calibrations_pending() == 0);
    let lc1 = rig.station.sensors().find("LC1").unwrap();
    let value = lc1.sample().unwrap().value;
    assert!((value - 50.0).abs() < 1e-3, "tared value {value}");
}

#[test]
fn malformed_frames_change_nothing() {
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();

    let replies = send(
        &rig,
        &mut decoder,
        b"{XYZ}{S1}{CFI2000,480}{CFP0}{T,5}{GNOPE,2}",
    );
    assert!(replies.is_empty());
    assert!(rig.driver.writes().is_empty());
    assert!(!rig.station.sequencer().is_running());
}

#[test]
fn pulse_frame_runs_to_completion() {
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();

    send(&rig, &mut decoder, b"{COP250}");
    crate::mock_hw::wait_for(|| !rig.station.sequencer().is_running());
    assert_eq!(
        rig.driver.writes(),
        vec![
            Write::new(0, Channel::OxidizerMain, true),
            Write::new(250, Channel::OxidizerMain, false),
        ]
    );
}

#[test]
fn mount_sample_eject_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burn.csv");
    let rig = Rig::new(ManualClock::new(0));
    let mut decoder = FrameDecoder::new();

    send(&rig, &mut decoder, format!("{{DM{}}}", path.display()).as_bytes());
    rig.clock.set(7);
    sample_all(&rig);
    send(&rig, &mut decoder, b"{DE}");
    sample_all(&rig);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "\"PT1\", 1, 1, 7\n\"LC1\", 0, 0, 7\n");
}
