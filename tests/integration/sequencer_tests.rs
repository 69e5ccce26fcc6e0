//! Sequencer behaviour driven through operator frames.

use std::time::{Duration, Instant};

use otv_daq::adapters::time::ManualClock;
use otv_daq::drivers::valves::Channel;
use otv_daq::sequencer::Sequence;

use crate::mock_hw::{Rig, Write, wait_for};

#[test]
fn default_fire_frame_follows_the_timeline() {
    let rig = Rig::new(ManualClock::new(0));
    rig.station.handle_frame("CFI");
    wait_for(|| !rig.station.sequencer().is_running());

    use Channel::*;
    let expected = vec![
        Write::new(0, FuelMain, true),
        Write::new(480, Igniter, true),
        Write::new(480, OxidizerMain, true),
        Write::new(2800, Igniter, false),
        Write::new(15_000, OxidizerMain, false),
        Write::new(15_000, FuelMain, false),
        Write::new(15_000, HeliumBottle, true),
        Write::new(45_000, HeliumBottle, false),
        Write::new(45_000, FuelVent, true),
        Write::new(45_000, OxidizerVent, true),
        Write::new(75_000, FuelVent, false),
        Write::new(75_000, OxidizerVent, false),
    ];
    assert_eq!(rig.driver.writes(), expected);
}

#[test]
fn igniter_cutoff_is_fixed_when_valve_delay_is_long() {
    let rig = Rig::new(ManualClock::new(0));
    rig.station.handle_frame("CFI3000,2800");
    wait_for(|| !rig.station.sequencer().is_running());

    let writes = rig.driver.writes();
    let ign: Vec<_> = writes
        .iter()
        .filter(|w| w.index == Channel::Igniter.index())
        .collect();
    assert_eq!(ign.len(), 2);
    assert_eq!(ign[0].at_ms, 2800);
    assert_eq!(ign[1].at_ms, 2800);
    assert!(!ign[1].on);
}

#[test]
fn abort_frame_preempts_fire_during_valve_delay() {
    let rig = Rig::new(ManualClock::frozen());
    rig.station.handle_frame("CFI");
    wait_for(|| rig.driver.len() == 1);

    rig.station.handle_frame("CAB");
    wait_for(|| !rig.station.sequencer().is_running());

    // Time moving on must not wake the superseded fire sequence.
    rig.clock.advance(20_000);
    std::thread::sleep(std::time::Duration::from_millis(10));

    let writes = rig.driver.writes();
    assert_eq!(writes[0], Write::new(0, Channel::FuelMain, true));
    assert!(writes[1..].iter().all(|w| !w.on));
    assert_eq!(writes.len(), 7);
    assert!(!rig.station.channels().get(Channel::FuelMain));
}

#[test]
fn abort_preempts_fire_mid_burn() {
    let rig = Rig::new(ManualClock::frozen());
    rig.station.handle_frame("CFI");
    wait_for(|| rig.driver.len() == 1);
    rig.clock.advance(1000);
    wait_for(|| rig.driver.len() == 3);

    rig.station.handle_frame("CAB");
    let cut = rig.driver.len();
    wait_for(|| !rig.station.sequencer().is_running());
    rig.clock.advance(5000);
    std::thread::sleep(std::time::Duration::from_millis(10));

    let writes = rig.driver.writes();
    assert!(writes[cut..].iter().all(|w| !w.on));
    let snapshot = rig.station.channels().snapshot();
    assert!(!snapshot[Channel::Igniter.index()]);
    assert!(!snapshot[Channel::OxidizerMain.index()]);
}

#[test]
fn rapid_dispatches_keep_only_the_last() {
    let rig = Rig::new(ManualClock::frozen());
    let sequencer = rig.station.sequencer();

    for pulse_ms in [100, 200, 300, 400] {
        sequencer
            .dispatch(Sequence::PulseFuel { pulse_ms })
            .unwrap();
    }
    sequencer
        .dispatch(Sequence::PulseHelium { pulse_ms: 50 })
        .unwrap();
    let helium_open = |w: &Write| w.index == Channel::HeliumBottle.index() && w.on;
    wait_for(|| rig.driver.writes().iter().any(helium_open));
    rig.clock.advance(1000);
    wait_for(|| !sequencer.is_running());

    let writes = rig.driver.writes();
    let first_helium = writes
        .iter()
        .position(|w| w.index == Channel::HeliumBottle.index())
        .unwrap();
    assert!(
        writes[..first_helium]
            .iter()
            .all(|w| w.index == Channel::FuelMain.index() && w.on)
    );
    let helium: Vec<_> = writes[first_helium..].iter().map(|w| (w.index, w.on)).collect();
    assert_eq!(
        helium,
        vec![
            (Channel::HeliumBottle.index(), true),
            (Channel::HeliumBottle.index(), false)
        ]
    );
    assert_eq!(sequencer.generation(), 5);
}

#[test]
fn abort_is_not_held_up_by_a_stalled_tare() {
    let rig = Rig::new(ManualClock::frozen());
    rig.station.handle_frame("CFI");
    wait_for(|| rig.driver.len() == 1);
    rig.clock.advance(1000);
    wait_for(|| rig.driver.len() == 3);

    // The tare waits on a sensor that never becomes ready on its own.
    rig.lc1.set_ready(false);
    let sent = Instant::now();
    rig.station.handle_frame("TLC1,0");
    rig.station.handle_frame("CAB");
    wait_for(|| !rig.station.sequencer().is_running());
    let took = sent.elapsed();
    assert!(took < Duration::from_millis(250), "abort took {took:?}");

    let snapshot = rig.station.channels().snapshot();
    assert!(!snapshot[Channel::FuelMain.index()]);
    assert!(!snapshot[Channel::OxidizerMain.index()]);
    assert!(!snapshot[Channel::Igniter.index()]);
    assert_eq!(rig.station.calibrations_pending(), 1);

    rig.lc1.set_ready(true);
    wait_for(|| rig.station.calibrations_pending() == 0);
}
