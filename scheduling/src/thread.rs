//! Per-thread cooperative scheduler loop (spec.md §4.E "Thread").
//!
//! A `Thread` owns one `TaskList`, one `TimerSet`, and one `SelectSet`
//! exclusively — no other thread touches them directly, which is why none of
//! those three types are internally synchronized for cross-thread access.
//! Cross-thread requests go through the thread's [`PendingQueue`], which is.
//! The driver loop runs seven steps per iteration, matching the original's
//! documented `driver()` body: bump the epoch, drain pending work, run up to
//! `tasks_per_iter` tasks, fire due timers, poll the selector, dispatch
//! signals, then check the stop flag.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use router_packet::Timestamp;

use crate::pending::{PendingOp, PendingQueue};
use crate::select::{Backend, SelectSet};
use crate::task::{Task, QUIESCENT_THREAD};
use crate::tasklist::{HeapTaskList, SortedTaskList, TaskList};
use crate::timer::TimerSet;

/// Default per spec.md §4.E: how many scheduled tasks to run before moving
/// on to timers/select within one iteration.
pub const DEFAULT_TASKS_PER_ITER: u32 = 64;
/// How many full iterations run before an OS-level yield/sleep check.
pub const DEFAULT_ITERS_PER_OS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Paused,
    Blocked,
    TimerWait,
    LockSelect,
    LockTasks,
    RunTask,
    RunTimer,
    RunSignal,
    RunPending,
    RunSelect,
}

/// Chooses the scheduled-task container a [`Thread`] uses; spec.md §4.D
/// leaves both sorted-list and heap as valid, the pack carrying both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskListKind {
    Sorted,
    Heap,
}

fn make_task_list(kind: TaskListKind) -> Box<dyn TaskList> {
    match kind {
        TaskListKind::Sorted => Box::new(SortedTaskList::new()),
        TaskListKind::Heap => Box::new(HeapTaskList::new()),
    }
}

/// One cooperative-scheduling thread. Thread id `-1` is reserved as the
/// quiescent "parking lot" for tasks whose element is torn down but whose
/// `Task` handle may still be live (spec.md's Quiescent thread).
pub struct Thread {
    id: i32,
    tasks: Mutex<Box<dyn TaskList>>,
    timers: Mutex<TimerSet>,
    select: Mutex<SelectSet>,
    pending: PendingQueue,
    state: AtomicU64,
    paused: AtomicBool,
    blocked: AtomicBool,
    stop_requested: AtomicBool,
    tasks_per_iter: u32,
    iters_per_os: u32,
    driver_epoch: AtomicI64,
    /// Bumped each time `drive_once` observes `blocked` and parks instead of
    /// running a task — `Master::block_all`'s acknowledgment that this
    /// thread is not, and will not be, inside a task callback.
    block_ack: AtomicI64,
}

impl Thread {
    pub fn new(id: i32, task_list_kind: TaskListKind, select_backend: Backend) -> std::io::Result<Arc<Thread>> {
        Ok(Arc::new(Thread {
            id,
            tasks: Mutex::new(make_task_list(task_list_kind)),
            timers: Mutex::new(TimerSet::new()),
            select: Mutex::new(SelectSet::new(select_backend)?),
            pending: PendingQueue::new(),
            state: AtomicU64::new(ThreadState::Paused as u64),
            paused: AtomicBool::new(true),
            blocked: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            tasks_per_iter: DEFAULT_TASKS_PER_ITER,
            iters_per_os: DEFAULT_ITERS_PER_OS,
            driver_epoch: AtomicI64::new(0),
            block_ack: AtomicI64::new(0),
        }))
    }

    pub fn is_quiescent(&self) -> bool {
        self.id == QUIESCENT_THREAD
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn wake(&self) {
        self.select.lock().unwrap().wake();
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        if !paused {
            self.wake();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
        if !blocked {
            self.wake();
        }
    }

    pub fn driver_epoch(&self) -> i64 {
        self.driver_epoch.load(Ordering::SeqCst)
    }

    pub fn block_ack(&self) -> i64 {
        self.block_ack.load(Ordering::SeqCst)
    }

    fn set_state(&self, s: ThreadState) {
        self.state.store(s as u64, Ordering::Relaxed);
    }

    pub fn state(&self) -> ThreadState {
        match self.state.load(Ordering::Relaxed) {
            0 => ThreadState::Paused,
            1 => ThreadState::Blocked,
            2 => ThreadState::TimerWait,
            3 => ThreadState::LockSelect,
            4 => ThreadState::LockTasks,
            5 => ThreadState::RunTask,
            6 => ThreadState::RunTimer,
            7 => ThreadState::RunSignal,
            8 => ThreadState::RunPending,
            _ => ThreadState::RunSelect,
        }
    }

    /// Schedules `task` onto this thread's task list immediately. Only
    /// valid when called from the owning thread itself; cross-thread
    /// requests must go through [`Thread::request_schedule`].
    fn schedule_now(&self, task: &Task) {
        let mut list = self.tasks.lock().unwrap();
        if list.contains(task) {
            return;
        }
        task.mark_scheduled();
        list.insert(task.clone());
    }

    fn unschedule_now(&self, task: &Task) {
        self.tasks.lock().unwrap().remove(task);
        task.mark_unscheduled();
    }

    /// Cross-thread-safe request to schedule `task` on its bound thread.
    pub fn request_schedule(&self, task: &Task) {
        if self.pending.enqueue(task, PendingOp::Schedule) {
            self.wake();
        }
    }

    pub fn request_unschedule(&self, task: &Task) {
        if self.pending.enqueue(task, PendingOp::Unschedule) {
            self.wake();
        }
    }

    pub fn request_move_thread(&self, task: &Task, dest: i32) {
        if self.pending.enqueue(task, PendingOp::MoveThread(dest)) {
            self.wake();
        }
    }

    fn process_pending(&self) {
        self.set_state(ThreadState::RunPending);
        while let Some((task, op)) = self.pending.pop() {
            match op {
                PendingOp::Schedule => {
                    if !task.is_strong_unscheduled() {
                        self.schedule_now(&task);
                    }
                }
                PendingOp::Unschedule => self.unschedule_now(&task),
                PendingOp::MoveThread(_dest) => {
                    // Caller is expected to have already removed the task
                    // from its old thread's list; here we just accept it
                    // onto this one.
                    self.schedule_now(&task);
                }
            }
            task.clear_pending();
        }
    }

    fn run_tasks(&self) -> u32 {
        self.set_state(ThreadState::RunTask);
        let mut run = 0;
        while run < self.tasks_per_iter {
            let head = self.tasks.lock().unwrap().pop_head();
            let Some(task) = head else { break };
            task.mark_unscheduled();
            task.advance_pass();
            if task.run_callback() {
                task.mark_scheduled();
                self.schedule_now(&task);
            }
            run += 1;
        }
        run
    }

    fn fire_timers(&self, now: Timestamp) -> usize {
        self.set_state(ThreadState::RunTimer);
        self.timers.lock().unwrap().fire_expired(now)
    }

    fn compute_timeout(&self, now: Timestamp) -> Option<Duration> {
        if !self.tasks.lock().unwrap().is_empty() {
            return Some(Duration::ZERO);
        }
        self.timers.lock().unwrap().next_delay(now)
    }

    fn run_select(&self, timeout: Option<Duration>) -> std::io::Result<usize> {
        self.set_state(ThreadState::RunSelect);
        let ready = self.select.lock().unwrap().wait(timeout)?;
        Ok(ready.len())
    }

    pub fn timers(&self) -> &Mutex<TimerSet> {
        &self.timers
    }

    pub fn select(&self) -> &Mutex<SelectSet> {
        &self.select
    }

    /// Runs one full iteration of the driver loop. Returns `false` once a
    /// stop has been requested and should not be iterated again.
    pub fn drive_once(&self, now: Timestamp, signal_check: impl FnOnce()) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.driver_epoch.fetch_add(1, Ordering::SeqCst);

        if self.paused.load(Ordering::SeqCst) {
            self.set_state(ThreadState::Paused);
            let _ = self.run_select(Some(Duration::from_millis(50)));
            return true;
        }
        if self.blocked.load(Ordering::SeqCst) {
            self.set_state(ThreadState::Blocked);
            self.block_ack.fetch_add(1, Ordering::SeqCst);
            let _ = self.run_select(Some(Duration::from_millis(50)));
            return true;
        }

        self.process_pending();
        self.run_tasks();
        self.fire_timers(now);
        self.set_state(ThreadState::RunSignal);
        signal_check();
        let timeout = self.compute_timeout(now);
        let _ = self.run_select(timeout);

        !self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn iters_per_os(&self) -> u32 {
        self.iters_per_os
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn scheduled_task_runs_and_restops_itself() {
        let thread = Thread::new(0, TaskListKind::Heap, Backend::Poll).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new("t", 0, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            false
        });
        thread.set_paused(false);
        thread.schedule_now(&task);
        thread.drive_once(Timestamp::ZERO, || {});
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!task.is_scheduled());
    }

    #[test]
    fn cross_thread_schedule_request_is_applied_next_iteration() {
        let thread = Thread::new(1, TaskListKind::Sorted, Backend::Poll).unwrap();
        thread.set_paused(false);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new("t", 1, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            false
        });
        task.mark_scheduled();
        thread.request_schedule(&task);
        thread.drive_once(Timestamp::ZERO, || {});
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn paused_thread_runs_no_tasks() {
        let thread = Thread::new(2, TaskListKind::Heap, Backend::Poll).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let task = Task::new("t", 2, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
            false
        });
        thread.schedule_now(&task);
        thread.drive_once(Timestamp::ZERO, || {});
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    /// Stride fairness: two always-reschedulable tasks with a 3:1 ticket
    /// ratio should be interleaved in close to that ratio. Stride
    /// scheduling is a deterministic arithmetic schedule rather than a
    /// probabilistic one, so the ratio converges within a tight tolerance
    /// well short of the million-execution scale the invariant states —
    /// this test uses a relaxed iteration count suitable for a fast suite.
    #[test]
    fn stride_scheduling_approximates_ticket_ratio_over_many_iterations() {
        let thread = Thread::new(4, TaskListKind::Heap, Backend::Poll).unwrap();
        thread.set_paused(false);

        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let a2 = count_a.clone();
        let task_a = Task::new("a", 4, move || {
            a2.fetch_add(1, Ordering::SeqCst);
            true
        });
        task_a.set_tickets(300);
        let b2 = count_b.clone();
        let task_b = Task::new("b", 4, move || {
            b2.fetch_add(1, Ordering::SeqCst);
            true
        });
        task_b.set_tickets(100);

        task_a.mark_scheduled();
        thread.schedule_now(&task_a);
        task_b.mark_scheduled();
        thread.schedule_now(&task_b);

        for _ in 0..3000 {
            thread.drive_once(Timestamp::ZERO, || {});
        }

        let a = count_a.load(Ordering::SeqCst) as f64;
        let b = count_b.load(Ordering::SeqCst) as f64;
        assert!(a > 1000.0 && b > 1000.0, "too few executions: a={a} b={b}");
        let ratio = a / b;
        assert!((ratio - 3.0).abs() < 0.05, "ticket ratio 3:1 not approximated, got {ratio}");
    }

    #[test]
    fn request_stop_halts_loop() {
        let thread = Thread::new(3, TaskListKind::Heap, Backend::Poll).unwrap();
        thread.set_paused(false);
        thread.request_stop();
        assert!(!thread.drive_once(Timestamp::ZERO, || {}));
    }
}
