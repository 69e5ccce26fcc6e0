//! The station: explicit context object for the whole DAQ core.
//!
//! [`Station`] owns the sensor registry, the channel bank, the sequencer
//! and the data log.  It is built once at startup by the top-level driver
//! and handed (by reference or `Arc`) to every loop that needs it.
//!
//! ```text
//!  operator frame ──▶ parse ──▶ ┌──────────────────────────┐ ──▶ query reply
//!                               │         Station           │
//!                               │ sensors · channels · seq  │
//!  scheduler / event queue ───▶ │ sample jobs · data log    │
//!                               └──────────────────────────┘
//! ```
//!
//! Every error is handled here: logged, never propagated into a loop.
//!
//! Calibration commands run on their own `"calibration"` context, in
//! arrival order.  A tare holds its sensor for the whole averaging window,
//! and the command loop must stay free for the next frame (an abort, most
//! urgently) while it does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::config::SystemConfig;
use crate::datalog::DataLog;
use crate::drivers::task_pin;
use crate::drivers::valves::ChannelBank;
use crate::error::{CommandError, Error, SensorError};
use crate::sensors::{Sensor, SensorRegistry};
use crate::sequencer::CommandSequencer;

use super::commands::{self, Calibration, Command, StorageCommand};
use super::ports::SharedClock;
use super::telemetry::QueryReply;

/// Calibration jobs that may wait behind a running tare.
const CALIBRATION_DEPTH: usize = 8;

/// Stack for the calibration context (KiB).
const CALIBRATION_STACK_KB: usize = 32;

struct CalibrationJob {
    sensor: Arc<dyn Sensor>,
    op: Calibration,
}

impl CalibrationJob {
    fn apply(self) {
        match self.op {
            Calibration::Tare { expected } => {
                if let Err(e) = self.sensor.tare(expected) {
                    warn!("Station: tare of '{}' failed: {}", self.sensor.name(), e);
                }
            }
            Calibration::Gain(gain) => self.sensor.set_gain(gain),
            Calibration::Offset(offset) => self.sensor.set_offset(offset),
        }
    }
}

/// Applies calibration jobs one at a time, off the command loop.
struct Calibrator {
    jobs: Option<SyncSender<CalibrationJob>>,
    pending: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl Calibrator {
    fn start() -> Result<Self, Error> {
        let (jobs, inbox) = mpsc::sync_channel::<CalibrationJob>(CALIBRATION_DEPTH);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = {
            let pending = pending.clone();
            task_pin::spawn_named("calibration", CALIBRATION_STACK_KB, move || {
                for job in inbox {
                    job.apply();
                    pending.fetch_sub(1, Ordering::AcqRel);
                }
            })?
        };
        Ok(Self {
            jobs: Some(jobs),
            pending,
            worker: Some(worker),
        })
    }

    fn submit(&self, job: CalibrationJob) -> Result<(), Error> {
        let jobs = self.jobs.as_ref().ok_or(Error::Stopped)?;
        self.pending.fetch_add(1, Ordering::AcqRel);
        jobs.try_send(job).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            match e {
                TrySendError::Full(_) => Error::CapacityExceeded,
                TrySendError::Disconnected(_) => Error::Stopped,
            }
        })
    }
}

impl Drop for Calibrator {
    fn drop(&mut self) {
        // Closing the channel ends the worker once queued jobs are done.
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Station: calibration context panicked");
            }
        }
    }
}

/// The DAQ core's context object.
pub struct Station {
    config: SystemConfig,
    sensors: SensorRegistry,
    channels: Arc<ChannelBank>,
    sequencer: CommandSequencer,
    datalog: Arc<DataLog>,
    calibrator: Calibrator,
}

impl Station {
    /// Build the station and start its calibration context.
    pub fn new(
        config: SystemConfig,
        sensors: SensorRegistry,
        channels: Arc<ChannelBank>,
        datalog: Arc<DataLog>,
        clock: SharedClock,
    ) -> Result<Self, Error> {
        let sequencer = CommandSequencer::new(channels.clone(), clock, &config);
        let calibrator = Calibrator::start()?;
        info!(
            "Station: {} sensors, igniter cutoff {}ms",
            sensors.len(),
            config.igniter_time_ms
        );
        Ok(Self {
            config,
            sensors,
            channels,
            sequencer,
            datalog,
            calibrator,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    pub fn channels(&self) -> &ChannelBank {
        &self.channels
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }

    pub fn datalog(&self) -> &DataLog {
        &self.datalog
    }

    /// Calibration commands accepted but not yet applied.
    pub fn calibrations_pending(&self) -> usize {
        self.calibrator.pending.load(Ordering::Acquire)
    }

    /// Decode and handle one frame body.  Returns a reply for queries.
    pub fn handle_frame(&self, body: &str) -> Option<String> {
        match commands::parse(body, &self.config) {
            Ok(cmd) => self.handle(cmd),
            Err(e) => {
                warn!("Station: ignoring {{{}}}: {}", body, e);
                None
            }
        }
    }

    /// Route one decoded command.
    pub fn handle(&self, cmd: Command) -> Option<String> {
        match self.try_handle(cmd) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Station: command failed: {}", e);
                None
            }
        }
    }

    fn try_handle(&self, cmd: Command) -> Result<Option<String>, Error> {
        match cmd {
            Command::Query => return Ok(Some(self.query())),
            Command::Calibrate { sensor, op } => {
                let sensor = self
                    .sensors
                    .find(&sensor)
                    .ok_or(CommandError::UnknownSensor)?
                    .clone();
                self.calibrator.submit(CalibrationJob { sensor, op })?;
            }
            Command::SetChannels(states) => {
                if let Some(running) = self.sequencer.current() {
                    warn!("Station: direct channel write during '{}'", running);
                }
                self.channels.set_all(&states);
            }
            Command::Sequence(sequence) => {
                self.sequencer.dispatch(sequence)?;
            }
            Command::Storage(StorageCommand::Mount(path)) => {
                self.datalog.mount(path.as_str())?;
            }
            Command::Storage(StorageCommand::Eject) => self.datalog.eject()?,
        }
        Ok(None)
    }

    /// Leave the stand safe before the loops stop: abort whatever is
    /// running and wait for the abort's writes.
    pub fn shutdown(&self) {
        match self.sequencer.abort_and_wait() {
            Ok(()) => info!("Station: safed for shutdown"),
            Err(e) => error!("Station: shutdown abort failed: {}", e),
        }
    }

    /// Serialise every sensor snapshot and channel state.
    pub fn query(&self) -> String {
        QueryReply::new(&self.sensors, self.channels.snapshot()).to_json()
    }
}

/// Build a sampling job for `sensor`, suitable for the periodic scheduler
/// or the event queue.  Failures are logged and swallowed.
pub fn sample_job(sensor: Arc<dyn Sensor>) -> impl FnMut() + Send + 'static {
    move || sample_once(sensor.as_ref())
}

/// Take one sample, logging (never propagating) a failure.
pub fn sample_once(sensor: &dyn Sensor) {
    match sensor.sample() {
        Ok(_) => {}
        Err(SensorError::NotReady) => debug!("Sensors: '{}' not ready", sensor.name()),
        Err(e) => warn!("Sensors: '{}' sample failed: {}", sensor.name(), e),
    }
}
