//! Ties `router-core`'s element graph to `router-scheduling`'s threads and
//! `router-control`'s ControlSocket, the way a router's `main()` does
//! (spec.md §2 "Control flow").

pub mod config;

use std::sync::Arc;

use router_control::ControlSocket;
use router_core::Router;
use router_scheduling::{Master, MasterGuards, Task};

pub use config::{Config, ControlBind, SelectBackendArg};

/// Builds a [`Master`], binds one `Task` per element that
/// [`Router::wants_task`] reports, schedules those tasks, optionally opens
/// a ControlSocket, and starts the worker threads.
pub struct Runtime {
    pub master: Arc<Master>,
    pub router: Arc<Router>,
    /// One task per element that wants one, bound to the thread it was
    /// last scheduled on; kept so [`Runtime::hot_swap`] can unschedule them
    /// from the outgoing router before binding fresh tasks to the new one.
    tasks: Vec<Task>,
    guards: Option<MasterGuards>,
    _control: Option<Arc<ControlSocket>>,
}

fn bind_tasks(master: &Master, router: &Arc<Router>, num_threads: usize) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut next_thread = 0usize;
    for idx in 0..router.len() {
        if !router.wants_task(idx) {
            continue;
        }
        let thread_id = (next_thread % num_threads) as i32;
        next_thread += 1;
        let router_for_task = router.clone();
        let task = Task::new(format!("{}:run_task", router.name_of(idx)), thread_id, move || {
            router_for_task.run_task(idx)
        });
        task.mark_scheduled();
        master.thread(thread_id).request_schedule(&task);
        tasks.push(task);
    }
    tasks
}

impl Runtime {
    pub fn start(router: Arc<Router>, config: &Config) -> std::io::Result<Runtime> {
        let master = Master::new(config.threads, config.task_list_kind, config.select_backend)?;

        let tasks = bind_tasks(&master, &router, config.threads);

        let control = match &config.control_bind {
            Some(bind) => {
                let socket = Arc::new(ControlSocket::new(router.clone()));
                match bind {
                    ControlBind::Tcp(addr) => {
                        socket.serve_tcp(addr.as_str())?;
                    }
                    ControlBind::Unix(path) => {
                        socket.serve_unix(path)?;
                    }
                }
                Some(socket)
            }
            None => None,
        };

        master.unpause();
        let guards = master.clone().run();

        Ok(Runtime {
            master,
            router,
            tasks,
            guards: Some(guards),
            _control: control,
        })
    }

    /// Hot-swaps the running router for `new_router` (spec.md §4.C "Hot
    /// swap"): blocks until every worker has acknowledged it is outside a
    /// task callback, copies element state across via `take_state_from`,
    /// tears down the outgoing router, and rebinds tasks to the new one
    /// before resuming.
    pub fn hot_swap(&mut self, new_router: Arc<Router>) {
        self.master.block_all();

        new_router.take_state_from(&self.router);
        for task in &self.tasks {
            self.master.thread(task.home_thread_id()).request_unschedule(task);
        }
        self.router.kill();

        self.tasks = bind_tasks(&self.master, &new_router, self.master.num_threads());
        self.router = new_router;

        self.master.unblock_all();
    }

    /// Requests every worker thread to stop, tears down the router, and
    /// joins the threads.
    pub fn shutdown(mut self) {
        self.master.block_all();
        self.router.kill();
        self.master.unblock_all();

        self.master.request_stop();
        if let Some(guards) = self.guards.take() {
            guards.join();
        }
    }
}
