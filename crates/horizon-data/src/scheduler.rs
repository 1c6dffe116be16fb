//! Deferred task scheduler for delayed and buffered listeners.
//!
//! Each thread owns its own queue of deferred tasks. Nothing runs on its own:
//! the host pumps the queue from its loop with [`run_expired`], using
//! [`time_until_next`] to decide how long it may sleep. [`flush`] runs
//! everything that is still pending regardless of due time, which is what a
//! host does at shutdown and what tests use instead of sleeping.
//!
//! # Example
//!
//! ```
//! use horizon_data::scheduler;
//! use std::time::Duration;
//!
//! let task = scheduler::schedule(Duration::from_millis(50), || println!("later"));
//! assert!(scheduler::is_pending(&task));
//! assert_eq!(scheduler::flush(), 1);
//! ```
//!
//! # Cancelling from other threads
//!
//! A [`ScheduledTask`] handle is `Send + Sync` and remembers the queue it
//! belongs to. Cancelling it from another thread marks it cancelled; the
//! owning thread then drops it instead of running it, and no other thread's
//! tasks are affected.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU8, AtomicU64};
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a deferred task.
    pub struct DeferredTaskId;
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

const PENDING: u8 = 0;
const RAN: u8 = 1;
const CANCELLED: u8 = 2;

/// A handle to a task scheduled on a [`DeferredQueue`].
///
/// Handles may be cloned and sent to other threads. Only the thread owning
/// the queue ever runs the task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: DeferredTaskId,
    queue: u64,
    state: Arc<AtomicU8>,
}

impl ScheduledTask {
    /// The task's key within its queue.
    pub fn id(&self) -> DeferredTaskId {
        self.id
    }

    /// Whether the task has neither run nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.load(atomic::Ordering::Acquire) == PENDING
    }

    /// Mark the task cancelled. Returns `true` if it was still pending.
    fn mark_cancelled(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, atomic::Ordering::AcqRel, atomic::Ordering::Acquire)
            .is_ok()
    }
}

/// A boxed task closure.
type BoxedDeferredTask = Box<dyn FnOnce() + 'static>;

/// Internal deferred task data.
struct DeferredTaskData {
    /// Insertion sequence, breaks ties between equal due times.
    seq: u64,
    /// Shared with the task's handles.
    state: Arc<AtomicU8>,
    /// The task closure to execute.
    task: BoxedDeferredTask,
}

/// An entry in the scheduler queue (min-heap by due time).
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: DeferredTaskId,
    due: Instant,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A queue of deferred one-shot tasks.
///
/// Cancelled tasks are removed from the task table immediately; their heap
/// entries are discarded lazily when they reach the front of the queue.
///
/// Tasks cancelled through a handle on another thread stay in the table
/// until the owning thread next touches the queue.
pub struct DeferredQueue {
    id: u64,
    tasks: SlotMap<DeferredTaskId, DeferredTaskData>,
    queue: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl DeferredQueue {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, atomic::Ordering::Relaxed),
            tasks: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule a task to run once `delay` has elapsed.
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> ScheduledTask
    where
        F: FnOnce() + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        let due = Instant::now() + delay;
        let state = Arc::new(AtomicU8::new(PENDING));
        let id = self.tasks.insert(DeferredTaskData {
            seq,
            state: state.clone(),
            task: Box::new(task),
        });
        self.queue.push(QueueEntry { id, due, seq });
        tracing::trace!(target: targets::SCHEDULER, ?id, ?delay, "scheduled deferred task");
        ScheduledTask {
            id,
            queue: self.id,
            state,
        }
    }

    /// Cancel a pending task.
    ///
    /// A handle from another queue is only marked cancelled; that queue
    /// drops the task later. Returns `true` if the task was still pending.
    pub fn cancel(&mut self, task: &ScheduledTask) -> bool {
        let cancelled = task.mark_cancelled();
        if task.queue == self.id {
            self.tasks.remove(task.id);
        }
        cancelled
    }

    /// Check whether a task is still pending.
    pub fn is_pending(&self, task: &ScheduledTask) -> bool {
        task.is_pending()
    }

    /// Get the number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|data| data.state.load(atomic::Ordering::Acquire) == PENDING)
            .count()
    }

    /// Get the duration until the next task is due, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.queue
            .peek()
            .map(|entry| entry.due.saturating_duration_since(Instant::now()))
    }

    /// Remove the next task that is due at or before `deadline`.
    ///
    /// Passing `None` takes the next task regardless of its due time.
    fn pop_due(&mut self, deadline: Option<Instant>) -> Option<BoxedDeferredTask> {
        loop {
            self.discard_cancelled();
            let entry = *self.queue.peek()?;
            if deadline.is_some_and(|deadline| entry.due > deadline) {
                return None;
            }
            self.queue.pop();
            let Some(data) = self.tasks.remove(entry.id) else {
                continue;
            };
            // Loses against a cancel that raced in from another thread.
            let claimed = data
                .state
                .compare_exchange(PENDING, RAN, atomic::Ordering::AcqRel, atomic::Ordering::Acquire)
                .is_ok();
            if claimed {
                return Some(data.task);
            }
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.queue.peek() {
            let live = self.tasks.get(entry.id).is_some_and(|data| {
                data.seq == entry.seq && data.state.load(atomic::Ordering::Acquire) == PENDING
            });
            if live {
                break;
            }
            let entry = *entry;
            self.queue.pop();
            if self
                .tasks
                .get(entry.id)
                .is_some_and(|data| data.seq == entry.seq)
            {
                self.tasks.remove(entry.id);
            }
        }
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static QUEUE: RefCell<DeferredQueue> = RefCell::new(DeferredQueue::new());
}

/// Schedule a task on the current thread's queue.
pub fn schedule<F>(delay: Duration, task: F) -> ScheduledTask
where
    F: FnOnce() + 'static,
{
    QUEUE.with(|queue| queue.borrow_mut().schedule(delay, task))
}

/// Cancel a task, whichever thread's queue it was scheduled on.
///
/// Returns `true` if the task was still pending.
pub fn cancel(task: &ScheduledTask) -> bool {
    QUEUE
        .try_with(|queue| queue.borrow_mut().cancel(task))
        .unwrap_or_else(|_| task.mark_cancelled())
}

/// Check whether a task has neither run nor been cancelled.
pub fn is_pending(task: &ScheduledTask) -> bool {
    task.is_pending()
}

/// Get the number of tasks pending on the current thread's queue.
pub fn pending_count() -> usize {
    QUEUE.with(|queue| queue.borrow().pending_count())
}

/// Get the duration until the current thread's next task is due.
pub fn time_until_next() -> Option<Duration> {
    QUEUE.with(|queue| queue.borrow_mut().time_until_next())
}

/// Run every task whose due time has passed.
///
/// Tasks scheduled while running are only picked up if they are already due.
/// Returns the number of tasks executed.
pub fn run_expired() -> usize {
    let now = Instant::now();
    run_while(Some(now))
}

/// Run every pending task in due-time order, regardless of due time.
///
/// Tasks scheduled while flushing are run as well. Returns the number of
/// tasks executed.
pub fn flush() -> usize {
    run_while(None)
}

fn run_while(deadline: Option<Instant>) -> usize {
    let mut count = 0;
    // The borrow is released before each task runs, so tasks may schedule
    // or cancel other tasks.
    while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().pop_due(deadline)) {
        task();
        count += 1;
    }
    if count > 0 {
        tracing::trace!(target: targets::SCHEDULER, count, "ran deferred tasks");
    }
    count
}
