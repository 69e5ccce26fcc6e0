//! Cooperative periodic scheduler.
//!
//! Runs every recurring sampling task from one loop.  Each tick the loop
//! picks the entry that is **most behind schedule** (largest overdue value)
//! and, if that entry is actually due, runs it synchronously and pushes its
//! deadline one period past the selection time.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  register(label, period, action)   ◀── any thread, any time  │
//! │                 │                                            │
//! │                 ▼                                            │
//! │  ┌──────────────────────────────────────────────┐            │
//! │  │ entries: [ {action, period, next_deadline} ] │            │
//! │  └──────────────────────┬───────────────────────┘            │
//! │                         ▼                                    │
//! │        run(): argmax(now - next_deadline) ─▶ action()        │
//! │                         │                                    │
//! │                         ▼                                    │
//! │                     yield, repeat                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no preemption: a slow action delays every other entry.  When
//! two entries are equally overdue the one registered first wins.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::app::ports::SharedClock;

/// Boxed periodic action.
pub type PeriodicAction = Box<dyn FnMut() + Send>;

// ═══════════════════════════════════════════════════════════════
//  Entry
// ═══════════════════════════════════════════════════════════════

/// Internal bookkeeping for a live periodic task.
struct PeriodicTaskEntry {
    label: &'static str,
    /// `None` only while the loop is running the action outside the lock.
    action: Option<PeriodicAction>,
    period_ms: u64,
    next_deadline_ms: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// The periodic scheduler.
pub struct PeriodicScheduler {
    entries: Mutex<Vec<PeriodicTaskEntry>>,
    clock: SharedClock,
    stop_requested: AtomicBool,
}

impl PeriodicScheduler {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            clock,
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Add a recurring action.  First due `period_ms` from now.
    ///
    /// Safe to call while [`run`](Self::run) is looping on another thread.
    /// Returns the entry index.
    pub fn register(
        &self,
        label: &'static str,
        period_ms: u32,
        action: impl FnMut() + Send + 'static,
    ) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.lock_entries();
        entries.push(PeriodicTaskEntry {
            label,
            action: Some(Box::new(action)),
            period_ms: u64::from(period_ms),
            next_deadline_ms: now + u64::from(period_ms),
        });
        info!(
            "Scheduler: registered '{}' every {}ms at slot {}",
            label,
            period_ms,
            entries.len() - 1
        );
        entries.len() - 1
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One scheduling decision.  Returns the index of the entry that fired.
    ///
    /// The winning action runs with the entry lock released, so it may call
    /// [`register`](Self::register) without deadlocking.
    pub fn tick(&self) -> Option<usize> {
        let now = self.clock.now_ms();
        let (index, mut action) = {
            let mut entries = self.lock_entries();
            let (index, overdue) = most_overdue(&entries, now)?;
            if overdue < 0 {
                return None;
            }
            let entry = &mut entries[index];
            debug!("Scheduler: '{}' overdue by {}ms", entry.label, overdue);
            (index, entry.action.take()?)
        };

        action();

        let mut entries = self.lock_entries();
        let entry = &mut entries[index];
        entry.action = Some(action);
        entry.next_deadline_ms = now + entry.period_ms;
        Some(index)
    }

    /// Run forever (until [`stop`](Self::stop)), yielding between ticks.
    pub fn run(&self) {
        info!("Scheduler: running {} entries", self.len());
        while !self.stop_requested.load(Ordering::Acquire) {
            self.tick();
            self.clock.yield_now();
        }
        self.stop_requested.store(false, Ordering::Release);
        info!("Scheduler: stopped");
    }

    /// Ask the loop to exit after its current tick.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<PeriodicTaskEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Index and overdue value of the entry furthest behind schedule.
///
/// Strict comparison: the first-registered entry wins ties.
fn most_overdue(entries: &[PeriodicTaskEntry], now: u64) -> Option<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;
    for (i, entry) in entries.iter().enumerate() {
        let overdue = now as i64 - entry.next_deadline_ms as i64;
        match best {
            Some((_, b)) if overdue <= b => {}
            _ => best = Some((i, overdue)),
        }
    }
    best
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::time::ManualClock;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn periodic_fires_at_least_twice_in_250ms() {
        let clock = ManualClock::new(0);
        let sched = PeriodicScheduler::new(Arc::new(clock.clone()));
        let (hits, action) = counter();
        sched.register("a", 100, action);

        for _ in 0..250 {
            clock.advance(1);
            sched.tick();
        }
        assert!(hits.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn nothing_fires_before_due() {
        let clock = ManualClock::new(0);
        let sched = PeriodicScheduler::new(Arc::new(clock.clone()));
        let (hits, action) = counter();
        sched.register("a", 100, action);

        clock.advance(99);
        assert_eq!(sched.tick(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        clock.advance(1);
        assert_eq!(sched.tick(), Some(0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn most_overdue_wins_not_earliest_deadline() {
        let clock = ManualClock::new(0);
        let sched = PeriodicScheduler::new(Arc::new(clock.clone()));
        let (_, fast) = counter();
        let (_, slow) = counter();
        sched.register("fast", 10, fast); // deadline 10
        sched.register("slow", 5, slow); // deadline 5

        clock.set(50);
        // slow is 45ms overdue, fast 40ms.
        assert_eq!(sched.tick(), Some(1));
        assert_eq!(sched.tick(), Some(0));
    }

    #[test]
    fn ties_go_to_first_registered() {
        let clock = ManualClock::new(0);
        let sched = PeriodicScheduler::new(Arc::new(clock.clone()));
        let (_, a) = counter();
        let (_, b) = counter();
        sched.register("a", 20, a);
        sched.register("b", 20, b);

        clock.set(20);
        assert_eq!(sched.tick(), Some(0));
        assert_eq!(sched.tick(), Some(1));
        assert_eq!(sched.tick(), None);
    }

    #[test]
    fn deadline_advances_from_selection_time() {
        let clock = ManualClock::new(0);
        let sched = PeriodicScheduler::new(Arc::new(clock.clone()));
        let (hits, action) = counter();
        sched.register("a", 100, action);

        clock.set(130); // 30ms late
        assert_eq!(sched.tick(), Some(0));
        clock.set(229);
        assert_eq!(sched.tick(), None);
        clock.set(230);
        assert_eq!(sched.tick(), Some(0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn action_may_register_without_deadlock() {
        let clock = ManualClock::new(0);
        let sched = Arc::new(PeriodicScheduler::new(Arc::new(clock.clone())));
        let inner = sched.clone();
        let mut once = true;
        sched.register("spawner", 10, move || {
            if once {
                once = false;
                inner.register("child", 10, || {});
            }
        });

        clock.set(10);
        assert_eq!(sched.tick(), Some(0));
        assert_eq!(sched.len(), 2);
    }

    #[test]
    fn register_while_running_on_another_thread() {
        let clock = ManualClock::new(1);
        let sched = Arc::new(PeriodicScheduler::new(Arc::new(clock)));
        let (base, action) = counter();
        sched.register("base", 5, action);

        let runner = {
            let sched = sched.clone();
            std::thread::spawn(move || sched.run())
        };
        while base.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }

        let late: Vec<_> = (0..5)
            .map(|i| {
                let (hits, action) = counter();
                sched.register("late", 3 + i, action);
                hits
            })
            .collect();
        for hits in &late {
            while hits.load(Ordering::SeqCst) < 2 {
                std::thread::yield_now();
            }
        }

        sched.stop();
        runner.join().unwrap();
        assert_eq!(sched.len(), 6);
    }

    #[test]
    fn run_stops_on_request() {
        let clock = ManualClock::new(1);
        let sched = Arc::new(PeriodicScheduler::new(Arc::new(clock.clone())));
        let (hits, action) = counter();
        sched.register("a", 10, action);
        let stopper = sched.clone();
        sched.register("stop", 95, move || stopper.stop());

        sched.run();
        assert!(hits.load(Ordering::SeqCst) >= 8);
        assert!(!sched.is_empty());
    }
}
