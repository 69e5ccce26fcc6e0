//! Command sequencer.
//!
//! Runs at most one timed actuation sequence at a time, each on its own
//! named execution context.
//!
//! ```text
//!            dispatch                     natural completion
//!   IDLE ───────────────▶ RUNNING ───────────────────────────▶ IDLE
//!                           │  ▲
//!                           │  │ dispatch (last command wins)
//!                           └──┘
//! ```
//!
//! ## Cancellation
//!
//! Every dispatch bumps a generation counter.  A running sequence polls
//! it at every step and inside every wait (at most `cancel_poll_ms`
//! apart) and unwinds through `?` as soon as it no longer owns the
//! current generation.  Channel writes check ownership under the same
//! lock the dispatcher bumps the generation under, so once a dispatch has
//! begun no step of the superseded sequence can reach a channel.
//!
//! A superseded sequence gets no cleanup.  Whatever it already wrote
//! stays written; the new sequence (typically an abort) is responsible for
//! leaving the stand safe.

pub mod sequences;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{error, info, warn};

use crate::app::ports::SharedClock;
use crate::config::SystemConfig;
use crate::drivers::task_pin;
use crate::drivers::valves::{Channel, ChannelBank};
use crate::error::Error;
use crate::safety::SafetyEnvelope;

pub use sequences::{Sequence, SequenceTiming};

/// Stack for a sequence context (KiB).
const SEQUENCE_STACK_KB: usize = 32;

/// Marker returned through `?` when a newer dispatch superseded this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// State shared between the dispatcher and the running context.
struct Shared {
    generation: AtomicU64,
    /// Name of the running sequence.  Also the write gate.
    current: Mutex<Option<&'static str>>,
}

impl Shared {
    fn lock_current(&self) -> MutexGuard<'_, Option<&'static str>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sequence context
// ═══════════════════════════════════════════════════════════════

/// What a running sequence can do: write channels, read the sequence
/// timer, and wait.  Every operation fails with [`Cancelled`] once
/// superseded.
pub struct SequenceContext {
    generation: u64,
    shared: Arc<Shared>,
    channels: Arc<ChannelBank>,
    clock: SharedClock,
    started_ms: u64,
    poll_ms: u32,
}

impl SequenceContext {
    /// True once a newer dispatch has begun.
    pub fn cancelled(&self) -> bool {
        self.shared.generation.load(Ordering::Acquire) != self.generation
    }

    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.cancelled() { Err(Cancelled) } else { Ok(()) }
    }

    /// Write one channel, unless superseded.
    pub fn set(&self, channel: Channel, on: bool) -> Result<(), Cancelled> {
        let _gate = self.shared.lock_current();
        self.checkpoint()?;
        self.channels.set(channel, on);
        Ok(())
    }

    /// Milliseconds since this sequence started.
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_ms)
    }

    /// Wait `ms` from now.
    pub fn wait_ms(&self, ms: u32) -> Result<(), Cancelled> {
        self.wait_until(self.elapsed_ms() + u64::from(ms))
    }

    /// Wait until the sequence timer reaches `target_ms`.
    pub fn wait_until(&self, target_ms: u64) -> Result<(), Cancelled> {
        loop {
            self.checkpoint()?;
            if self.elapsed_ms() >= target_ms {
                return Ok(());
            }
            self.pause_toward(target_ms)?;
        }
    }

    /// Sleep one poll interval, or less if `target_ms` is closer.
    pub fn pause_toward(&self, target_ms: u64) -> Result<(), Cancelled> {
        let remaining = target_ms.saturating_sub(self.elapsed_ms());
        let step = remaining.min(u64::from(self.poll_ms.max(1))) as u32;
        if step > 0 {
            self.clock.sleep_ms(step);
        }
        self.checkpoint()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sequencer
// ═══════════════════════════════════════════════════════════════

/// One-at-a-time sequence runner with last-command-wins dispatch.
pub struct CommandSequencer {
    channels: Arc<ChannelBank>,
    clock: SharedClock,
    envelope: SafetyEnvelope,
    timing: SequenceTiming,
    shared: Arc<Shared>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl CommandSequencer {
    pub fn new(channels: Arc<ChannelBank>, clock: SharedClock, config: &SystemConfig) -> Self {
        Self {
            channels,
            clock,
            envelope: SafetyEnvelope::new(config),
            timing: SequenceTiming::from_config(config),
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                current: Mutex::new(None),
            }),
            runner: Mutex::new(None),
        }
    }

    /// Validate `sequence`, supersede whatever is running, and start it.
    ///
    /// A sequence that fails validation is rejected before anything else
    /// happens: the running sequence (if any) keeps running and no channel
    /// is written.  Returns the new dispatch generation.
    pub fn dispatch(&self, sequence: Sequence) -> Result<u64, Error> {
        sequence.validate(&self.envelope)?;

        let mut runner = self.runner.lock().unwrap_or_else(PoisonError::into_inner);

        let generation = {
            let mut current = self.shared.lock_current();
            if let Some(previous) = *current {
                warn!("Sequencer: '{}' superseded by '{}'", previous, sequence.name());
            }
            *current = Some(sequence.name());
            self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        if let Some(handle) = runner.take() {
            if handle.join().is_err() {
                error!("Sequencer: superseded context panicked");
            }
        }

        let ctx = SequenceContext {
            generation,
            shared: self.shared.clone(),
            channels: self.channels.clone(),
            clock: self.clock.clone(),
            started_ms: self.clock.now_ms(),
            poll_ms: self.timing.poll_ms,
        };
        let timing = self.timing;

        info!("Sequencer: dispatch #{} '{}'", generation, sequence.name());
        let spawned = task_pin::spawn_named("sequence", SEQUENCE_STACK_KB, move || {
            run_to_end(sequence, ctx, timing);
        });
        match spawned {
            Ok(handle) => {
                *runner = Some(handle);
                Ok(generation)
            }
            Err(e) => {
                self.finish(generation);
                Err(e)
            }
        }
    }

    /// Supersede the running sequence without starting another, and wait
    /// for its context to exit.
    pub fn cancel(&self) {
        let mut runner = self.runner.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut current = self.shared.lock_current();
            *current = None;
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
        }
        if let Some(handle) = runner.take() {
            let _ = handle.join();
        }
    }

    /// Dispatch an abort and wait for it to finish writing.
    ///
    /// Unlike [`cancel`](Self::cancel), this leaves every propellant and
    /// ignition channel closed, so it is what shutdown uses.
    pub fn abort_and_wait(&self) -> Result<(), Error> {
        self.dispatch(Sequence::Abort)?;
        let handle = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Sequencer: abort context panicked");
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_current().is_some()
    }

    /// Name of the running sequence.
    pub fn current(&self) -> Option<&'static str> {
        *self.shared.lock_current()
    }

    /// Number of dispatches (and cancels) so far.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    fn finish(&self, generation: u64) {
        clear_if_current(&self.shared, generation);
    }
}

impl Drop for CommandSequencer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn clear_if_current(shared: &Shared, generation: u64) {
    let mut current = shared.lock_current();
    if shared.generation.load(Ordering::Acquire) == generation {
        *current = None;
    }
}

fn run_to_end(sequence: Sequence, ctx: SequenceContext, timing: SequenceTiming) {
    let outcome = sequence.run(&ctx, &timing);
    clear_if_current(&ctx.shared, ctx.generation);
    match outcome {
        Ok(()) => info!(
            "Sequencer: '{}' complete after {}ms",
            sequence.name(),
            ctx.elapsed_ms()
        ),
        Err(Cancelled) => info!(
            "Sequencer: '{}' cancelled at {}ms",
            sequence.name(),
            ctx.elapsed_ms()
        ),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
