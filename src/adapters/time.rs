//! Time adapters.
//!
//! Provides the monotonic clock and suspension points for the DAQ core.
//!
//! - [`SystemClock`]: wraps `std::time::Instant`; a cooperative yield is a
//!   short sleep so host loops do not spin a core at 100%.
//! - [`ManualClock`]: simulated time for deterministic tests.  Time only
//!   moves when a test (or a sleeping execution context) advances it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::app::ports::Clock;

/// Host monotonic clock.
pub struct SystemClock {
    start: Instant,
    idle_pause: Duration,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SystemClock {
    /// `idle_pause_ms` is slept on every cooperative yield.
    pub fn new(idle_pause_ms: u32) -> Self {
        Self {
            start: Instant::now(),
            idle_pause: Duration::from_millis(u64::from(idle_pause_ms)),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn yield_now(&self) {
        if self.idle_pause.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.idle_pause);
        }
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Simulated clock.
///
/// Clones share the same time base.  `yield_now` advances time by the
/// configured tick; `sleep_ms` advances by the requested amount unless the
/// clock is frozen, in which case it only yields the OS thread so another
/// context can make progress.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualInner>,
}

struct ManualInner {
    now: AtomicU64,
    tick_ms: AtomicU64,
    frozen: AtomicBool,
}

impl ManualClock {
    /// Clock starting at 0 that advances `tick_ms` per yield.
    pub fn new(tick_ms: u64) -> Self {
        Self {
            inner: Arc::new(ManualInner {
                now: AtomicU64::new(0),
                tick_ms: AtomicU64::new(tick_ms),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// Clock that never advances on its own.
    pub fn frozen() -> Self {
        let clock = Self::new(0);
        clock.set_frozen(true);
        clock
    }

    pub fn advance(&self, ms: u64) {
        self.inner.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.inner.now.fetch_max(ms, Ordering::SeqCst);
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.inner.frozen.store(frozen, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.inner.now.load(Ordering::SeqCst)
    }

    fn yield_now(&self) {
        if self.inner.frozen.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_micros(200));
        } else {
            self.advance(self.inner.tick_ms.load(Ordering::SeqCst));
        }
    }

    fn sleep_ms(&self, ms: u32) {
        if self.inner.frozen.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_micros(200));
        } else {
            self.advance(u64::from(ms));
        }
    }
}
