//! Process-wide configuration: thread count, select backend, bind address,
//! loaded from CLI flags (`clap`) and/or environment (spec.md §6 names
//! `ROUTER_BACKTRACES`/`ROUTER_SELECT_BACKEND`).

use clap::ValueEnum;

use router_scheduling::{Backend, TaskListKind};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SelectBackendArg {
    Poll,
    Select,
    Kqueue,
}

impl From<SelectBackendArg> for Backend {
    fn from(arg: SelectBackendArg) -> Backend {
        match arg {
            SelectBackendArg::Poll => Backend::Poll,
            SelectBackendArg::Select => Backend::Select,
            SelectBackendArg::Kqueue => Backend::Kqueue,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControlBind {
    Tcp(String),
    Unix(std::path::PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub threads: usize,
    pub task_list_kind: TaskListKind,
    pub select_backend: Backend,
    pub control_bind: Option<ControlBind>,
    pub backtraces: bool,
}

impl Config {
    pub fn new(threads: usize) -> Config {
        Config {
            threads: threads.max(1),
            task_list_kind: TaskListKind::Heap,
            select_backend: select_backend_from_env(),
            control_bind: None,
            backtraces: std::env::var("ROUTER_BACKTRACES").as_deref() == Ok("1"),
        }
    }
}

/// Honors `ROUTER_SELECT_BACKEND=kqueue|poll|select`, falling back to the
/// platform default.
fn select_backend_from_env() -> Backend {
    match std::env::var("ROUTER_SELECT_BACKEND") {
        Ok(v) => Backend::from_env_override(&v).unwrap_or_else(Backend::default_for_platform),
        Err(_) => Backend::default_for_platform(),
    }
}
