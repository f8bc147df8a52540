//! Integration tests exercising the full stack: element graph bring-up,
//! push/pull chains through a `Queue`/`Shaper`, hot swap, cross-thread task
//! scheduling, and the ControlSocket wire protocol. Each test below names
//! the scenario it covers.

use std::sync::Arc;

use router::{Config, Runtime};
use router_control::protocol::{self, Command};
use router_core::{Connection, Element, ElementSpec, Router, VecErrorSink};
use router_elements::{Counter, Discard, Queue, Shaper, Source};
use router_scheduling::{Backend, Master, Task, TaskListKind};

fn build_source_counter_discard(limit: u64) -> Arc<Router> {
    let mut source = Source::default();
    let mut errh = VecErrorSink::new();
    source.configure(&["64".to_string(), limit.to_string()], &mut errh).unwrap();

    let specs = vec![
        ElementSpec::new("src", Box::new(source), vec![]),
        ElementSpec::new("counter", Box::new(Counter::default()), vec![]),
        ElementSpec::new("sink", Box::new(Discard::default()), vec![]),
    ];
    let connections = vec![Connection::new(0, 0, 1, 0), Connection::new(1, 0, 2, 0)];
    Arc::new(Router::build(specs, connections, &mut errh).unwrap())
}

/// A two-element push chain: a `Source`'s `run_task` pushes packets through
/// a `Counter` into a `Discard`, and the handler tree reflects the tally.
#[test]
fn push_chain_source_counter_discard() {
    let router = build_source_counter_discard(5);

    let mut iterations = 0;
    while router.run_task(0) {
        iterations += 1;
        assert!(iterations <= 10, "source task did not stop itself");
    }

    assert_eq!(router.read_handler(1, "count"), Some("5\n".to_string()));
    assert_eq!(router.read_handler(2, "count"), Some("5\n".to_string()));
}

/// A pull chain through a `Shaper`: with no rate configured, every pull
/// passes straight through to a `Queue` upstream of it.
#[test]
fn pull_chain_through_unshaped_shaper() {
    let mut queue = Queue::default();
    let mut errh = VecErrorSink::new();
    queue.configure(&[], &mut errh).unwrap();
    let mut shaper = Shaper::default();
    shaper.configure(&["0".to_string()], &mut errh).unwrap();

    let specs = vec![
        ElementSpec::new("q", Box::new(queue), vec![]),
        ElementSpec::new("shaper", Box::new(shaper), vec![]),
    ];
    // q (push-in, pull-out) -> shaper (pull-through); the test itself pulls
    // on the shaper's output port, standing in for a downstream sink.
    let connections = vec![Connection::new(0, 0, 1, 0)];
    let router = Arc::new(Router::build(specs, connections, &mut errh).unwrap());
    let view = router.view();

    // Push directly into the queue (nothing upstream of it in this test
    // feeds its input port, so `push_downstream` isn't the right call here
    // — that would address whatever *consumes* element 0's output).
    router.with_element_mut(0, |el| el.push(0, 0, router_packet::Packet::make(0, Some(b"one"), 3, 0), &view));
    router.with_element_mut(0, |el| el.push(0, 0, router_packet::Packet::make(0, Some(b"two"), 3, 0), &view));

    // Pull directly on the shaper itself (not via `pull_upstream`, which
    // would address whatever feeds *its* input port rather than the
    // shaper's own output) to exercise its pull-through logic.
    let first = router.with_element_mut(1, |el| el.pull(1, 0, &view));
    assert!(first.is_some());
    let second = router.with_element_mut(1, |el| el.pull(1, 0, &view));
    assert!(second.is_some());
    assert!(router.with_element_mut(1, |el| el.pull(1, 0, &view)).is_none());
}

/// Hot swap: a second `Router` built with fresh `Counter` elements picks up
/// the running tallies from the first via `take_state_from`.
#[test]
fn hot_swap_carries_counter_state_across_routers() {
    let router_a = build_source_counter_discard(3);
    let mut iterations = 0;
    while router_a.run_task(0) {
        iterations += 1;
        assert!(iterations <= 10);
    }
    assert_eq!(router_a.read_handler(1, "count"), Some("3\n".to_string()));

    let mut errh = VecErrorSink::new();
    let mut fresh_source = Source::default();
    fresh_source.configure(&["64".to_string(), "0".to_string()], &mut errh).unwrap();
    let specs_b = vec![
        ElementSpec::new("src", Box::new(fresh_source), vec![]),
        ElementSpec::new("counter", Box::new(Counter::default()), vec![]),
        ElementSpec::new("sink", Box::new(Discard::default()), vec![]),
    ];
    let connections = vec![Connection::new(0, 0, 1, 0), Connection::new(1, 0, 2, 0)];
    let router_b = Router::build(specs_b, connections, &mut errh).unwrap();
    assert_eq!(router_b.read_handler(1, "count"), Some("0\n".to_string()));

    router_b.take_state_from(&router_a);
    assert_eq!(router_b.read_handler(1, "count"), Some("3\n".to_string()));
}

/// Hot swap driven through `Runtime::hot_swap`, which is what actually
/// wires the swap protocol through `Master::block_all`/`unblock_all`
/// instead of calling `take_state_from` directly.
#[test]
fn runtime_hot_swap_coordinates_through_master_block_all() {
    let router_a = build_source_counter_discard(3);
    let config = Config::new(1);
    let mut runtime = Runtime::start(router_a.clone(), &config).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while router_a.read_handler(1, "count") != Some("3\n".to_string()) {
        assert!(std::time::Instant::now() < deadline, "source task did not finish in time");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let mut errh = VecErrorSink::new();
    let mut fresh_source = Source::default();
    fresh_source.configure(&["64".to_string(), "0".to_string()], &mut errh).unwrap();
    let specs_b = vec![
        ElementSpec::new("src", Box::new(fresh_source), vec![]),
        ElementSpec::new("counter", Box::new(Counter::default()), vec![]),
        ElementSpec::new("sink", Box::new(Discard::default()), vec![]),
    ];
    let connections = vec![Connection::new(0, 0, 1, 0), Connection::new(1, 0, 2, 0)];
    let router_b = Arc::new(Router::build(specs_b, connections, &mut errh).unwrap());

    runtime.hot_swap(router_b.clone());

    assert_eq!(router_b.read_handler(1, "count"), Some("3\n".to_string()));
    assert_eq!(runtime.router.read_handler(1, "count"), Some("3\n".to_string()));

    runtime.shutdown();
}

/// ControlSocket wire protocol: the banner text and a READ command against
/// a running router's handler tree, driven directly through `protocol`
/// rather than an actual TCP connection (socket.rs covers that transport).
#[test]
fn control_protocol_banner_and_read_command() {
    let router = build_source_counter_discard(2);
    let mut iterations = 0;
    while router.run_task(0) {
        iterations += 1;
        assert!(iterations <= 10);
    }
    let table = router_control::HandlerTable::build(&router);

    assert!(protocol::banner().starts_with("Click::ControlSocket/1."));

    let cmd = protocol::parse_command("READ counter.count");
    assert!(matches!(cmd, Command::Read { .. }));
    let response = String::from_utf8(protocol::execute(&cmd, &router, &table)).unwrap();
    assert!(response.contains("2\n"), "response was: {response}");
}

/// Cross-thread task move: a `Source`'s task is created bound to thread 0,
/// then handed to thread 1 via `Master::quiesce` + re-schedule, and still
/// runs to completion there.
#[test]
fn task_moves_across_threads_and_still_runs() {
    let router = build_source_counter_discard(4);
    let master = Master::new(2, TaskListKind::Heap, Backend::Poll).unwrap();
    master.unpause();

    let router_for_task = router.clone();
    let task = Task::new("src:run_task", 0, move || router_for_task.run_task(0));
    task.mark_scheduled();
    master.thread(0).request_schedule(&task);

    master.quiesce(&task);
    task.set_home_thread_id(1);
    task.mark_scheduled();
    master.thread(1).request_schedule(&task);

    let now = router_packet::Timestamp::ZERO;
    let mut quanta = 0;
    loop {
        let keep_going = master.thread(1).drive_once(now, || {});
        quanta += 1;
        assert!(quanta <= 20, "task did not finish on its new thread");
        if router.read_handler(1, "count") == Some("4\n".to_string()) {
            break;
        }
        if !keep_going {
            break;
        }
    }
    assert_eq!(router.read_handler(1, "count"), Some("4\n".to_string()));
}
