//! `router`: builds a small demonstration graph and runs it.
//!
//! Parsing a textual router configuration is explicitly out of scope
//! (spec.md §1); this binary exists to exercise the full stack end to end,
//! wiring together a fixed `Source -> Counter -> Queue -> Discard` chain.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use router_core::{Connection, Element, ElementSpec, Router, VecErrorSink};
use router_elements::{Counter, Discard, Queue, Source};
use router_scheduling::Backend;

#[derive(Debug, Parser)]
#[command(name = "router", version, about = "Modular packet-router core demo")]
struct Args {
    /// Number of worker threads.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Bind the ControlSocket to a TCP address, e.g. 127.0.0.1:7777.
    #[arg(long)]
    control_tcp: Option<String>,

    /// Bind the ControlSocket to a Unix-domain socket path.
    #[arg(long)]
    control_unix: Option<PathBuf>,

    /// How many packets the demo Source emits before stopping (omit for
    /// unlimited).
    #[arg(long)]
    limit: Option<u64>,

    /// Override the file-descriptor select backend (defaults to the
    /// platform's best available, or ROUTER_SELECT_BACKEND if set).
    #[arg(long)]
    select_backend: Option<router::SelectBackendArg>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut source = Source::default();
    let mut errh = VecErrorSink::new();
    let limit_args: Vec<String> = match args.limit {
        Some(n) => vec!["64".to_string(), n.to_string()],
        None => vec![],
    };
    source.configure(&limit_args, &mut errh).expect("source configure");

    let specs = vec![
        ElementSpec::new("src", Box::new(source), vec![]),
        ElementSpec::new("counter", Box::new(Counter::default()), vec![]),
        ElementSpec::new("q", Box::new(Queue::default()), vec![]),
        ElementSpec::new("sink", Box::new(Discard::default()), vec![]),
    ];
    let connections = vec![
        Connection::new(0, 0, 1, 0),
        Connection::new(1, 0, 2, 0),
        Connection::new(2, 0, 3, 0),
    ];
    let router = Router::build(specs, connections, &mut errh).map_err(|err| {
        for diag in err.diagnostics() {
            tracing::error!(%diag);
        }
        err
    })?;
    let router = Arc::new(router);

    let mut config = router::Config::new(args.threads);
    config.backtraces = std::env::var("ROUTER_BACKTRACES").as_deref() == Ok("1");
    if let Some(backend) = args.select_backend {
        config.select_backend = Backend::from(backend);
    }
    config.control_bind = match (args.control_tcp, args.control_unix) {
        (Some(addr), _) => Some(router::ControlBind::Tcp(addr)),
        (None, Some(path)) => Some(router::ControlBind::Unix(path)),
        (None, None) => None,
    };

    let runtime = router::Runtime::start(router.clone(), &config)?;

    // Run until the demo source has emitted its configured limit, or
    // forever if unbounded (Ctrl-C to stop).
    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        if let Some(count) = router.read_handler(0, "active") {
            if count.trim() == "false" {
                break;
            }
        }
    }

    runtime.shutdown();
    Ok(())
}
