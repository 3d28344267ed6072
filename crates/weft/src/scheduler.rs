use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::error::TaskError;

/// Task priority; lower values run first. Ties are broken by arrival order.
pub type Priority = u8;

/// Priority band used for all engine-internal work (render units, commits,
/// effect flushes). Callers scheduling their own tasks can run ahead of or
/// behind the engine by picking a band on either side.
pub const PRIORITY_NORMAL: Priority = 8;

/// Handle for cancelling a scheduled task before it starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// A scheduled callback. Receives the context the scheduler is driven with;
/// returning [`TaskStatus::Yielded`] re-enqueues the continuation at the
/// same priority, which is how long-running work cooperates with the slice
/// budget.
pub type TaskFn<C> = Box<dyn FnOnce(&mut C) -> Result<TaskStatus<C>, TaskError>>;

pub enum TaskStatus<C> {
    Done,
    Yielded(TaskFn<C>),
}

struct QueuedTask<C> {
    priority: Priority,
    seq: u64,
    id: TaskId,
    task: TaskFn<C>,
}

impl<C> PartialEq for QueuedTask<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<C> Eq for QueuedTask<C> {}

impl<C> PartialOrd for QueuedTask<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for QueuedTask<C> {
    // BinaryHeap is a max-heap; reverse the comparison so the lowest
    // (priority, seq) pair pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cooperative single-threaded task queue.
///
/// Decouples "what must run" from "when": callers enqueue tasks, and the
/// embedder drives [`run_slice`] from its own loop. The queue never runs
/// anything outside `run_slice`, and a slice stops dispatching once elapsed
/// wall time exceeds the budget — the only concurrency primitive here is
/// that yield.
///
/// [`run_slice`]: Scheduler::run_slice
pub struct Scheduler<C> {
    queue: BinaryHeap<QueuedTask<C>>,
    queued: FxHashSet<TaskId>,
    cancelled: FxHashSet<TaskId>,
    next_id: u64,
    next_seq: u64,
    slice: Duration,
}

/// Default slice budget: long enough to batch a useful amount of work,
/// short enough to stay under a frame.
pub const DEFAULT_SLICE: Duration = Duration::from_millis(5);

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self::with_slice(DEFAULT_SLICE)
    }

    /// A zero budget dispatches exactly one task per slice, which makes
    /// yield points observable in tests.
    pub fn with_slice(slice: Duration) -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            queued: FxHashSet::default(),
            cancelled: FxHashSet::default(),
            next_id: 0,
            next_seq: 0,
            slice,
        }
    }

    pub fn schedule(&mut self, priority: Priority, task: TaskFn<C>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.enqueue(priority, id, task);
        id
    }

    fn enqueue(&mut self, priority: Priority, id: TaskId, task: TaskFn<C>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued.insert(id);
        self.queue.push(QueuedTask {
            priority,
            seq,
            id,
            task,
        });
    }

    /// Remove a not-yet-started task. No-op if the task already ran or was
    /// never queued. Removal is lazy: the entry is skipped when popped.
    pub fn cancel(&mut self, id: TaskId) {
        if self.queued.remove(&id) {
            self.cancelled.insert(id);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.queued.is_empty()
    }

    fn pop_runnable(&mut self) -> Option<QueuedTask<C>> {
        while let Some(entry) = self.queue.pop() {
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            self.queued.remove(&entry.id);
            return Some(entry);
        }
        None
    }

    /// Run queued tasks until the queue empties or the slice budget is
    /// exhausted, whichever comes first. A task error is logged and the
    /// loop continues with the remaining tasks. Returns whether work
    /// remains, in which case the embedder should call again on a later
    /// turn.
    pub fn run_slice(&mut self, cx: &mut C) -> bool {
        let started = Instant::now();
        while let Some(entry) = self.pop_runnable() {
            match (entry.task)(cx) {
                Ok(TaskStatus::Done) => {}
                Ok(TaskStatus::Yielded(task)) => {
                    self.enqueue(entry.priority, entry.id, task);
                }
                Err(error) => {
                    log::error!("[SCHED] task {:?} failed: {error}", entry.id);
                }
            }
            if started.elapsed() >= self.slice {
                break;
            }
        }
        !self.is_idle()
    }
}
