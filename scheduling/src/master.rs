//! Process-wide coordinator (spec.md §4.I "Master").
//!
//! Owns every [`Thread`], the quiescent thread, and a dedicated signal
//! thread. `pause`/`unpause` and `block_all`/`unblock_all` fence across all
//! worker threads by bumping each thread's driver epoch and waiting for it
//! to change, rather than by suspending threads mid-callback (spec.md §4.E's
//! "suspension only inside the selector's blocking call").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use router_packet::Timestamp;

use crate::select::Backend;
use crate::task::{Task, QUIESCENT_THREAD};
use crate::thread::{TaskListKind, Thread};

type SignalCallback = Box<dyn Fn(i32) + Send + Sync>;

/// Coordinates a fixed pool of worker threads plus the quiescent thread.
/// Construction spawns no OS threads; [`Master::run`] does, one per worker
/// plus one signal-dispatch thread, joining all of them on drop via
/// [`MasterGuards`].
pub struct Master {
    threads: Vec<Arc<Thread>>,
    quiescent: Arc<Thread>,
    pause_count: AtomicI32,
    block_count: AtomicI32,
    signal_handlers: Mutex<HashMap<i32, Vec<SignalCallback>>>,
    stopping: AtomicBool,
    pending_signal: AtomicI32,
}

impl Master {
    pub fn new(num_threads: usize, task_list_kind: TaskListKind, backend: Backend) -> std::io::Result<Arc<Master>> {
        let mut threads = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            threads.push(Thread::new(i as i32, task_list_kind, backend)?);
        }
        let quiescent = Thread::new(QUIESCENT_THREAD, task_list_kind, backend)?;
        Ok(Arc::new(Master {
            threads,
            quiescent,
            pause_count: AtomicI32::new(0),
            block_count: AtomicI32::new(0),
            signal_handlers: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
            pending_signal: AtomicI32::new(0),
        }))
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn thread(&self, id: i32) -> &Arc<Thread> {
        if id == QUIESCENT_THREAD {
            &self.quiescent
        } else {
            &self.threads[id as usize]
        }
    }

    pub fn threads(&self) -> &[Arc<Thread>] {
        &self.threads
    }

    /// Moves `task` to the quiescent thread, for use while its owning
    /// element is being torn down.
    pub fn quiesce(&self, task: &Task) {
        let home = task.home_thread_id();
        if home != QUIESCENT_THREAD {
            self.thread(home).request_unschedule(task);
        }
        task.set_home_thread_id(QUIESCENT_THREAD);
    }

    /// Increments the pause count; while nonzero, every worker thread
    /// parks in its driver loop without running tasks or timers.
    pub fn pause(&self) {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
        for t in &self.threads {
            t.set_paused(true);
        }
    }

    /// Decrements the pause count; threads resume once it reaches zero.
    pub fn unpause(&self) {
        let prev = self.pause_count.fetch_sub(1, Ordering::SeqCst);
        if prev <= 1 {
            for t in &self.threads {
                t.set_paused(false);
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_count.load(Ordering::SeqCst) > 0
    }

    /// Blocks the calling thread until every worker has acknowledged that
    /// it is not currently inside a task callback (spec.md §4.H). Only
    /// returns once each thread's driver loop has itself observed the
    /// `blocked` flag and parked, not merely once the flag has been set.
    pub fn block_all(&self) {
        let prev = self.block_count.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            let starts: Vec<i64> = self.threads.iter().map(|t| t.block_ack()).collect();
            for t in &self.threads {
                t.set_blocked(true);
            }
            for t in &self.threads {
                t.wake();
            }
            loop {
                let done = self.threads.iter().zip(&starts).all(|(t, start)| t.block_ack() > *start);
                if done {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    pub fn unblock_all(&self) {
        let prev = self.block_count.fetch_sub(1, Ordering::SeqCst);
        if prev <= 1 {
            for t in &self.threads {
                t.set_blocked(false);
            }
        }
    }

    /// Blocks the calling thread until every worker has observed at least
    /// one driver iteration since this call started — used after a
    /// configuration change that must be visible on all threads before
    /// proceeding (the original's "fence" wait).
    pub fn wait_for_fence(&self) {
        let starts: Vec<i64> = self.threads.iter().map(|t| t.driver_epoch()).collect();
        for t in &self.threads {
            t.wake();
        }
        loop {
            let done = self
                .threads
                .iter()
                .zip(&starts)
                .all(|(t, start)| t.driver_epoch() > *start);
            if done {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn add_signal_handler<F: Fn(i32) + Send + Sync + 'static>(&self, signum: i32, handler: F) {
        self.signal_handlers
            .lock()
            .unwrap()
            .entry(signum)
            .or_default()
            .push(Box::new(handler));
    }

    /// Records a signal number for the next driver iteration of every
    /// worker thread to dispatch. Safe to call from a dedicated signal
    /// thread or directly from a libc signal handler context (only does an
    /// atomic store).
    pub fn raise_signal(&self, signum: i32) {
        self.pending_signal.store(signum, Ordering::SeqCst);
        for t in &self.threads {
            t.wake();
        }
    }

    fn dispatch_signal(&self, signum: i32) {
        if let Some(handlers) = self.signal_handlers.lock().unwrap().get(&signum) {
            for h in handlers {
                h(signum);
            }
        }
    }

    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        for t in &self.threads {
            t.request_stop();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Spawns one OS thread per worker and runs each thread's driver loop
    /// until [`Master::request_stop`] is called. Returns a guard joining
    /// all threads on drop or explicit [`MasterGuards::join`].
    pub fn run(self: Arc<Master>) -> MasterGuards {
        let mut handles = Vec::with_capacity(self.threads.len());
        for (i, thread) in self.threads.iter().cloned().enumerate() {
            let master = self.clone();
            let handle = std::thread::Builder::new()
                .name(format!("router-worker-{i}"))
                .spawn(move || {
                    loop {
                        let now = Timestamp::from_duration(
                            std::time::SystemTime::now()
                                .duration_since(std::time::UNIX_EPOCH)
                                .unwrap_or_default(),
                        );
                        let signum = master.pending_signal.swap(0, Ordering::SeqCst);
                        let keep_going = thread.drive_once(now, || {
                            if signum != 0 {
                                master.dispatch_signal(signum);
                            }
                        });
                        if !keep_going {
                            break;
                        }
                        if master.is_stopping() {
                            break;
                        }
                    }
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        MasterGuards { handles }
    }
}

/// Joins every spawned worker thread, either explicitly via [`join`] or on
/// drop, mirroring the corpus's `WorkerGuards` join-on-drop pattern.
pub struct MasterGuards {
    handles: Vec<JoinHandle<()>>,
}

impl MasterGuards {
    pub fn join(mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

impl Drop for MasterGuards {
    fn drop(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_unpause_is_reference_counted() {
        let master = Master::new(2, TaskListKind::Heap, Backend::Poll).unwrap();
        master.pause();
        master.pause();
        assert!(master.is_paused());
        master.unpause();
        assert!(master.is_paused());
        master.unpause();
        assert!(!master.is_paused());
    }

    #[test]
    fn quiesce_moves_task_home_thread_to_quiescent() {
        let master = Master::new(1, TaskListKind::Heap, Backend::Poll).unwrap();
        let task = Task::new("t", 0, || true);
        master.quiesce(&task);
        assert_eq!(task.home_thread_id(), QUIESCENT_THREAD);
    }

    #[test]
    fn block_all_waits_for_worker_acknowledgment() {
        let master = Master::new(1, TaskListKind::Heap, Backend::Poll).unwrap();
        master.unpause();
        let worker = master.thread(0).clone();
        let handle = std::thread::spawn(move || loop {
            if !worker.drive_once(Timestamp::ZERO, || {}) {
                break;
            }
        });

        master.block_all();
        assert!(master.thread(0).block_ack() > 0);

        master.thread(0).request_stop();
        master.unblock_all();
        handle.join().unwrap();
    }

    #[test]
    fn signal_handler_runs_on_dispatch() {
        let master = Master::new(1, TaskListKind::Heap, Backend::Poll).unwrap();
        let hit = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hit2 = hit.clone();
        master.add_signal_handler(2, move |_| hit2.store(true, Ordering::SeqCst));
        master.dispatch_signal(2);
        assert!(hit.load(Ordering::SeqCst));
    }
}
