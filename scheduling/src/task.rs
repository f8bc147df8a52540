//! Task: a reschedulable callback owned by an element and bound to a thread
//! (spec.md §3 "Task", §4.D).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::stride::{stride_for_tickets, DEFAULT_TICKETS};

/// Thread id used for the quiescent "parking lot" thread that holds tasks
/// whose owner is being torn down (spec.md's "Quiescent thread").
pub const QUIESCENT_THREAD: i32 = -1;

pub(crate) struct TaskState {
    pub(crate) pass: u64,
    pub(crate) stride: u32,
    pub(crate) tickets: u16,
    pub(crate) is_scheduled: bool,
    pub(crate) is_strong_unscheduled: bool,
    pub(crate) home_thread_id: i32,
    /// Position in the bound thread's scheduled list/heap, maintained only
    /// by that thread.
    pub(crate) scheduled_index: Option<usize>,
    /// Monotonic insertion order into the bound thread's `HeapTaskList`,
    /// used as a tie-break so tasks with equal `pass` pop in FIFO order
    /// (mirrors `TimerSet`'s `seq` field).
    pub(crate) heap_seq: u64,
}

struct TaskInner {
    name: String,
    state: Mutex<TaskState>,
    callback: Mutex<Box<dyn FnMut() -> bool + Send>>,
    /// 0 = idle, 1 = queued on a thread's pending queue, 2 = currently being
    /// processed by that thread. Mirrors spec.md's sentinel states, reduced
    /// to a small enum-like counter per §9's redesign note.
    pending_seq: AtomicI64,
}

/// A reschedulable callback, cheaply clonable (an `Arc` handle). Two clones
/// referring to the same task compare equal with [`Task::same`].
#[derive(Clone)]
pub struct Task(Arc<TaskInner>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingMark {
    Idle,
    Queued,
    Processing,
}

impl Task {
    pub fn new<F: FnMut() -> bool + Send + 'static>(name: impl Into<String>, thread_id: i32, callback: F) -> Task {
        let tickets = DEFAULT_TICKETS;
        Task(Arc::new(TaskInner {
            name: name.into(),
            state: Mutex::new(TaskState {
                pass: 0,
                stride: stride_for_tickets(tickets),
                tickets,
                is_scheduled: false,
                is_strong_unscheduled: false,
                home_thread_id: thread_id,
                scheduled_index: None,
                heap_seq: 0,
            }),
            callback: Mutex::new(Box::new(callback)),
            pending_seq: AtomicI64::new(0),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn same(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn home_thread_id(&self) -> i32 {
        self.0.state.lock().unwrap().home_thread_id
    }

    pub fn set_home_thread_id(&self, tid: i32) {
        self.0.state.lock().unwrap().home_thread_id = tid;
    }

    pub fn is_scheduled(&self) -> bool {
        self.0.state.lock().unwrap().is_scheduled
    }

    pub fn is_strong_unscheduled(&self) -> bool {
        self.0.state.lock().unwrap().is_strong_unscheduled
    }

    pub fn set_tickets(&self, tickets: u16) {
        let mut s = self.0.state.lock().unwrap();
        s.tickets = tickets;
        s.stride = stride_for_tickets(tickets);
    }

    pub fn tickets(&self) -> u16 {
        self.0.state.lock().unwrap().tickets
    }

    pub fn pass(&self) -> u64 {
        self.0.state.lock().unwrap().pass
    }

    /// Marks the task as wanting to run; does not itself place it on a
    /// scheduled list (that happens when the pending operation is applied
    /// on the bound thread).
    pub fn mark_scheduled(&self) {
        let mut s = self.0.state.lock().unwrap();
        s.is_scheduled = true;
    }

    pub fn mark_unscheduled(&self) {
        let mut s = self.0.state.lock().unwrap();
        s.is_scheduled = false;
    }

    /// Strong-unschedule: the task will not be placed on the scheduled list
    /// even if `schedule()` is called, until explicitly `reschedule()`d.
    pub fn strong_unschedule(&self) {
        let mut s = self.0.state.lock().unwrap();
        s.is_scheduled = false;
        s.is_strong_unscheduled = true;
    }

    pub fn reschedule(&self) {
        let mut s = self.0.state.lock().unwrap();
        s.is_strong_unscheduled = false;
        s.is_scheduled = true;
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut TaskState) -> R) -> R {
        f(&mut self.0.state.lock().unwrap())
    }

    pub(crate) fn run_callback(&self) -> bool {
        (self.0.callback.lock().unwrap())()
    }

    /// Advances `pass` by `stride`; returns the new pass.
    pub(crate) fn advance_pass(&self) -> u64 {
        let mut s = self.0.state.lock().unwrap();
        s.pass = s.pass.wrapping_add(s.stride as u64);
        s.pass
    }

    /// Attempts to claim the "queued" pending mark for this task, returning
    /// `true` if this caller is the one that should actually enqueue it
    /// (coalescing: if it's already queued, the desired operation simply
    /// overwrites whatever is already pending, and no second enqueue is
    /// needed).
    pub(crate) fn try_claim_pending(&self) -> bool {
        self.0
            .pending_seq
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_pending_processing(&self) {
        self.0.pending_seq.store(2, Ordering::SeqCst);
    }

    pub(crate) fn clear_pending(&self) {
        self.0.pending_seq.store(0, Ordering::SeqCst);
    }

    pub(crate) fn pending_mark(&self) -> PendingMark {
        match self.0.pending_seq.load(Ordering::SeqCst) {
            0 => PendingMark::Idle,
            1 => PendingMark::Queued,
            _ => PendingMark::Processing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_unschedule_blocks_schedule_until_reschedule() {
        let t = Task::new("t", 0, || true);
        t.strong_unschedule();
        t.mark_scheduled();
        // mark_scheduled alone doesn't clear the strong-unschedule flag;
        // only an explicit reschedule() does.
        assert!(t.is_strong_unscheduled());
        t.reschedule();
        assert!(!t.is_strong_unscheduled());
        assert!(t.is_scheduled());
    }

    #[test]
    fn pending_claim_is_single_winner() {
        let t = Task::new("t", 0, || true);
        assert!(t.try_claim_pending());
        assert!(!t.try_claim_pending());
        t.clear_pending();
        assert!(t.try_claim_pending());
    }
}
