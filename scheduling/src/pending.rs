//! Per-thread pending-work queue for cross-thread task operations
//! (spec.md §4.H "Pending-work protocol").
//!
//! Enqueue rules: if the caller is the task's bound thread and the router
//! is running, the operation applies inline; otherwise the caller takes the
//! target thread's pending lock, links the task at the tail, and wakes the
//! target thread. A task can have at most one pending operation in flight;
//! a second request before the first is processed overwrites the desired
//! operation rather than queuing twice (coalescing, "last operation wins").

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::task::Task;

#[derive(Clone)]
pub enum PendingOp {
    Schedule,
    Unschedule,
    MoveThread(i32),
}

struct Entry {
    task: Task,
    op: PendingOp,
}

#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<VecDeque<Entry>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues `op` for `task`. Returns `true` if this call actually
    /// linked a new entry (the caller should wake the owning thread);
    /// `false` if the task was already queued and this call only updated
    /// the desired operation in place.
    pub fn enqueue(&self, task: &Task, op: PendingOp) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if task.try_claim_pending() {
            guard.push_back(Entry {
                task: task.clone(),
                op,
            });
            true
        } else {
            // Already queued or being processed: overwrite the desired op
            // for the existing entry if we can find it, otherwise (it's
            // mid-processing) just drop this request — process_pending
            // will see the task's live state via with_state when it next
            // runs, since Schedule/Unschedule mutate state immediately
            // below in `apply`, not lazily.
            if let Some(e) = guard.iter_mut().find(|e| e.task.same(task)) {
                e.op = op;
            }
            false
        }
    }

    /// Pops and returns the next pending entry, marking it "processing".
    pub(crate) fn pop(&self) -> Option<(Task, PendingOp)> {
        let mut guard = self.inner.lock().unwrap();
        guard.pop_front().map(|e| {
            e.task.mark_pending_processing();
            (e.task, e.op)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
