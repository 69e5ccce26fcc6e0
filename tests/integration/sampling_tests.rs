//! Sampling paths: the periodic scheduler and the ISR-fed event queue.

use std::sync::Arc;

use otv_daq::adapters::sim::SimInput;
use otv_daq::adapters::time::ManualClock;
use otv_daq::app::ports::{SharedClock, SharedSink};
use otv_daq::app::service::{sample_job, sample_once};
use otv_daq::events::PriorityEventQueue;
use otv_daq::scheduler::PeriodicScheduler;
use otv_daq::sensors::flow::{FlowInput, PulseCounter};
use otv_daq::sensors::guarded::GuardedSensor;
use otv_daq::sensors::transfer::Identity;
use otv_daq::sensors::Sensor;

use crate::mock_hw::{MemorySink, wait_for};

fn sensor(
    name: &'static str,
    input: SimInput,
    clock: &SharedClock,
    sink: &SharedSink,
) -> Arc<dyn Sensor> {
    Arc::new(GuardedSensor::new(name, input, Identity, clock.clone()).with_sink(sink.clone()))
}

#[test]
fn scheduler_samples_each_sensor_at_its_rate() {
    let clock = ManualClock::new(0);
    let shared: SharedClock = Arc::new(clock.clone());
    let sink = Arc::new(MemorySink::default());
    let dyn_sink: SharedSink = sink.clone();

    let fast = sensor("PT1", SimInput::new(1.0), &shared, &dyn_sink);
    let slow = sensor("RTD1", SimInput::new(2.0), &shared, &dyn_sink);
    let sched = PeriodicScheduler::new(shared.clone());
    sched.register("PT1", 20, sample_job(fast));
    sched.register("RTD1", 90, sample_job(slow));

    // Two ticks per millisecond so coinciding deadlines both fire on time.
    for _ in 0..1000 {
        clock.advance(1);
        sched.tick();
        sched.tick();
    }

    let records = sink.records();
    let count = |name: &str| records.iter().filter(|r| r.name == name).count();
    assert_eq!(count("PT1"), 50);
    assert_eq!(count("RTD1"), 11);
}

#[test]
fn failing_sensor_never_stalls_the_others() {
    let clock = ManualClock::new(0);
    let shared: SharedClock = Arc::new(clock.clone());
    let sink = Arc::new(MemorySink::default());
    let dyn_sink: SharedSink = sink.clone();

    let broken_input = SimInput::new(0.0);
    broken_input.set_failing(true);
    let broken = sensor("PT9", broken_input, &shared, &dyn_sink);
    let healthy = sensor("PT1", SimInput::new(1.0), &shared, &dyn_sink);

    let sched = PeriodicScheduler::new(shared.clone());
    sched.register("PT9", 10, sample_job(broken));
    sched.register("PT1", 10, sample_job(healthy));
    for _ in 0..100 {
        clock.advance(1);
        sched.tick();
        sched.tick();
    }

    let records = sink.records();
    assert!(records.iter().all(|r| r.name == "PT1"));
    assert_eq!(records.len(), 10);
}

#[test]
fn isr_posted_flow_jobs_are_sampled() {
    let clock = ManualClock::new(1);
    let shared: SharedClock = Arc::new(clock.clone());
    let sink = Arc::new(MemorySink::default());
    let dyn_sink: SharedSink = sink.clone();

    let counter = Arc::new(PulseCounter::new());
    let flow: Arc<dyn Sensor> = Arc::new(
        GuardedSensor::new(
            "OX_MFR",
            FlowInput::new(counter.clone(), shared.clone()),
            Identity,
            shared.clone(),
        )
        .with_sink(dyn_sink),
    );

    let queue: Arc<PriorityEventQueue<Arc<dyn Sensor>, 4>> = Arc::new(PriorityEventQueue::new());
    let consumer = {
        let queue = queue.clone();
        let clock = shared.clone();
        std::thread::spawn(move || {
            queue.run_with(clock.as_ref(), |sensor| sample_once(sensor.as_ref()));
        })
    };

    // Timer "ISR": edges, then a posted sample job.
    let producer = {
        let queue = queue.clone();
        let flow = flow.clone();
        let counter = counter.clone();
        std::thread::spawn(move || {
            let mut posted = 0;
            while posted < 5 {
                for _ in 0..10 {
                    counter.on_edge();
                }
                if queue.post(flow.clone(), 0) {
                    posted += 1;
                }
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
        })
    };
    producer.join().unwrap();

    wait_for(|| queue.pending_len() == 0 && queue.in_flight() == 0);
    queue.stop();
    consumer.join().unwrap();

    let records = sink.records();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.name == "OX_MFR" && r.raw >= 0.0));
    assert_eq!(queue.free_len(), queue.capacity());
}
