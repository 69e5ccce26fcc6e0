//! Interrupt-safe priority event queue.
//!
//! One-shot tasks are posted from any context (timer interrupts, pulse
//! counters, the command loop) and executed by a single consumer loop,
//! lowest priority number first.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌──────────────┐
//! │ Timer ISR   │────▶│                      │     │              │
//! │ Pulse ISR   │────▶│  PriorityEventQueue  │────▶│  run() loop  │
//! │ Software    │────▶│  (fixed arena)       │     │  (consumer)  │
//! └─────────────┘     └──────────────────────┘     └──────────────┘
//! ```
//!
//! Storage is a fixed arena of `N` slots addressed by `u16` handles and
//! threaded onto two intrusive doubly-linked lists: *free* and *pending*.
//! Nothing allocates after construction.  Every list mutation happens inside
//! a critical section, so `post` is safe from interrupt context and no
//! observer ever sees a half-linked list.
//!
//! The queue always keeps one free guard slot: a queue of capacity `N`
//! holds at most `N - 1` outstanding tasks, and `post` returns `false`
//! (dropping the task) rather than consume the last slot.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

use crate::app::ports::Clock;

type Link = Option<u16>;

struct Slot<T> {
    action: Option<T>,
    priority: i32,
    prev: Link,
    next: Link,
}

/// Arena plus the heads of both intrusive lists.
struct Lists<T, const N: usize> {
    slots: [Slot<T>; N],
    free_head: Link,
    free_len: usize,
    pending_head: Link,
    pending_tail: Link,
    pending_len: usize,
}

impl<T, const N: usize> Lists<T, N> {
    fn new() -> Self {
        let slots = core::array::from_fn(|i| Slot {
            action: None,
            priority: 0,
            prev: i.checked_sub(1).map(|p| p as u16),
            next: if i + 1 < N { Some((i + 1) as u16) } else { None },
        });
        Self {
            slots,
            free_head: if N > 0 { Some(0) } else { None },
            free_len: N,
            pending_head: None,
            pending_tail: None,
            pending_len: 0,
        }
    }

    fn pop_free(&mut self) -> Link {
        let idx = self.free_head?;
        let next = self.slots[idx as usize].next;
        self.free_head = next;
        if let Some(n) = next {
            self.slots[n as usize].prev = None;
        }
        self.slots[idx as usize].next = None;
        self.free_len -= 1;
        Some(idx)
    }

    fn push_free(&mut self, idx: u16) {
        let slot = &mut self.slots[idx as usize];
        slot.action = None;
        slot.prev = None;
        slot.next = self.free_head;
        if let Some(h) = self.free_head {
            self.slots[h as usize].prev = Some(idx);
        }
        self.free_head = Some(idx);
        self.free_len += 1;
    }

    fn append_pending(&mut self, idx: u16) {
        let tail = self.pending_tail;
        {
            let slot = &mut self.slots[idx as usize];
            slot.prev = tail;
            slot.next = None;
        }
        match tail {
            Some(t) => self.slots[t as usize].next = Some(idx),
            None => self.pending_head = Some(idx),
        }
        self.pending_tail = Some(idx);
        self.pending_len += 1;
    }

    /// O(1) unlink via the slot's own links.
    fn unlink_pending(&mut self, idx: u16) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.pending_head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.pending_tail = prev,
        }
        let slot = &mut self.slots[idx as usize];
        slot.prev = None;
        slot.next = None;
        self.pending_len -= 1;
    }

    /// Lowest priority number; the earliest-enqueued entry wins ties.
    fn scan_min(&self) -> Link {
        let mut best = self.pending_head?;
        let mut cur = self.slots[best as usize].next;
        while let Some(i) = cur {
            if self.slots[i as usize].priority < self.slots[best as usize].priority {
                best = i;
            }
            cur = self.slots[i as usize].next;
        }
        Some(best)
    }
}

/// Fixed-capacity, interrupt-safe, priority-ordered one-shot task queue.
pub struct PriorityEventQueue<T, const N: usize> {
    lists: Mutex<CriticalSectionRawMutex, RefCell<Lists<T, N>>>,
    stop_requested: AtomicBool,
}

impl<T: Send, const N: usize> Default for PriorityEventQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send, const N: usize> PriorityEventQueue<T, N> {
    /// Preallocate all `N` slots into the free set.
    pub fn new() -> Self {
        const { assert!(N >= 1 && N <= u16::MAX as usize, "capacity must fit a u16 handle") };
        Self {
            lists: Mutex::new(RefCell::new(Lists::new())),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Total slot count (free + pending + in flight).
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Post a task.  Safe to call from interrupt context.
    ///
    /// Returns `false` and drops `action` when taking a slot would empty the
    /// free set.  Callers must check the result.
    #[must_use = "a full queue drops the task"]
    pub fn post(&self, action: T, priority: i32) -> bool {
        self.lists.lock(|cell| {
            let mut lists = cell.borrow_mut();
            if lists.free_len <= 1 {
                return false;
            }
            let Some(idx) = lists.pop_free() else {
                return false;
            };
            {
                let slot = &mut lists.slots[idx as usize];
                slot.action = Some(action);
                slot.priority = priority;
            }
            lists.append_pending(idx);
            true
        })
    }

    /// Unlink and return the pending task with the smallest priority number.
    ///
    /// The returned [`Task`] keeps its slot until it is executed or dropped,
    /// at which point the slot goes back on the free list.
    pub fn dequeue_next(&self) -> Option<Task<'_, T, N>> {
        let (slot, priority, action) = self.lists.lock(|cell| {
            let mut lists = cell.borrow_mut();
            let idx = lists.scan_min()?;
            lists.unlink_pending(idx);
            let slot = &mut lists.slots[idx as usize];
            let action = slot.action.take();
            Some((idx, slot.priority, action))
        })?;

        let lease = SlotLease { queue: self, slot };
        // A pending slot always carries an action; an empty one is simply recycled.
        let action = action?;
        Some(Task {
            priority,
            action,
            lease,
        })
    }

    /// Consumer loop.  Executes tasks until [`stop`](Self::stop) is observed.
    ///
    /// The stop flag is checked once per iteration, after the in-flight
    /// action has returned and the loop has yielded.
    pub fn run_with(&self, clock: &dyn Clock, mut dispatch: impl FnMut(T)) {
        info!("Event queue: running (capacity {})", N);
        while !self.stop_requested.load(Ordering::Acquire) {
            if let Some(task) = self.dequeue_next() {
                task.execute(&mut dispatch);
            }
            clock.yield_now();
        }
        self.stop_requested.store(false, Ordering::Release);
        info!("Event queue: stopped");
    }

    /// Request the consumer loop to exit at its next yield boundary.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Tasks waiting to run.
    pub fn pending_len(&self) -> usize {
        self.lists.lock(|cell| cell.borrow().pending_len)
    }

    /// Slots available to `post` (including the guard slot).
    pub fn free_len(&self) -> usize {
        self.lists.lock(|cell| cell.borrow().free_len)
    }

    /// Tasks dequeued but not yet executed or dropped.
    pub fn in_flight(&self) -> usize {
        self.lists.lock(|cell| {
            let lists = cell.borrow();
            N - lists.free_len - lists.pending_len
        })
    }

    fn release(&self, slot: u16) {
        self.lists.lock(|cell| cell.borrow_mut().push_free(slot));
    }
}

impl<T: FnOnce() + Send, const N: usize> PriorityEventQueue<T, N> {
    /// Consumer loop for queues whose payload is the action itself.
    pub fn run(&self, clock: &dyn Clock) {
        self.run_with(clock, |action| action());
    }
}

/// Returns a slot to the free list when dropped.
struct SlotLease<'q, T: Send, const N: usize> {
    queue: &'q PriorityEventQueue<T, N>,
    slot: u16,
}

impl<T: Send, const N: usize> Drop for SlotLease<'_, T, N> {
    fn drop(&mut self) {
        self.queue.release(self.slot);
    }
}

/// A dequeued task.  Owns its slot until executed or dropped.
pub struct Task<'q, T: Send, const N: usize> {
    pub priority: i32,
    action: T,
    lease: SlotLease<'q, T, N>,
}

impl<T: Send, const N: usize> Task<'_, T, N> {
    pub fn action(&self) -> &T {
        &self.action
    }

    /// Run `f` on the action, then free the slot.
    pub fn execute<R>(self, f: impl FnOnce(T) -> R) -> R {
        let Task { action, lease, .. } = self;
        let result = f(action);
        drop(lease);
        result
    }

    /// Take the action and free the slot immediately.
    pub fn into_action(self) -> T {
        self.action
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
