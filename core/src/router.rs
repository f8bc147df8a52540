//! Router: the element graph (spec.md §3 "Router", §4.C).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use router_packet::Packet;

use crate::connection::Connection;
use crate::element::{CleanupStage, Element, HandlerRegistrar};
use crate::error::{ErrorSink, RouterError, VecErrorSink};
use crate::flow::{self, PortRef};
use crate::port::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Inactive,
    Preparing,
    Active,
    Background,
    Dead,
}

/// One element as supplied to [`Router::build`]: its dotted name, the
/// already-constructed trait object, and its configuration arguments.
/// Class-string-to-factory lookup is deliberately absent here — that is
/// the excluded configuration-language parser's job (spec.md §1).
pub struct ElementSpec {
    pub name: String,
    pub element: Box<dyn Element>,
    pub args: Vec<String>,
}

impl ElementSpec {
    pub fn new(name: impl Into<String>, element: Box<dyn Element>, args: Vec<String>) -> ElementSpec {
        ElementSpec {
            name: name.into(),
            element,
            args,
        }
    }
}

pub struct Router {
    elements: Vec<Mutex<Box<dyn Element>>>,
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
    connections: Vec<Connection>,
    port_flows: HashMap<PortRef, Flow>,
    push_map: HashMap<(usize, usize), Connection>,
    pull_map: HashMap<(usize, usize), Connection>,
    runcount: AtomicI64,
    state: Mutex<RouterState>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("names", &self.names)
            .field("connections", &self.connections)
            .field("runcount", &self.runcount)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Runs the full bring-up pipeline: port-count derivation, flow-
    /// direction solving, phase-ordered `configure`, then `initialize`.
    /// Any configuration error aborts before `initialize` runs at all, with
    /// every configure-phase diagnostic collected first (spec.md §7
    /// "surface full list of errors before abort").
    pub fn build(
        mut specs: Vec<ElementSpec>,
        connections: Vec<Connection>,
        errh: &mut VecErrorSink,
    ) -> Result<Router, RouterError> {
        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, n) in names.iter().enumerate() {
            name_to_index.insert(n.clone(), i);
        }

        let mut input_counts = vec![0usize; specs.len()];
        let mut output_counts = vec![0usize; specs.len()];
        for c in &connections {
            input_counts[c.to_elem] = input_counts[c.to_elem].max(c.to_port + 1);
            output_counts[c.from_elem] = output_counts[c.from_elem].max(c.from_port + 1);
        }
        for (i, spec) in specs.iter().enumerate() {
            let port_spec = spec.element.port_spec();
            let n_in = input_counts[i].max(port_spec.inputs.minimum() as usize);
            let n_out = output_counts[i].max(port_spec.outputs.minimum() as usize);
            if !port_spec.inputs.accepts(n_in as u32) {
                return Err(RouterError::PortCountMismatch {
                    element: spec.name.clone(),
                    detail: format!("{n_in} inputs used, spec requires {}", port_spec.inputs),
                });
            }
            if !port_spec.outputs.accepts(n_out as u32) {
                return Err(RouterError::PortCountMismatch {
                    element: spec.name.clone(),
                    detail: format!("{n_out} outputs used, spec requires {}", port_spec.outputs),
                });
            }
            input_counts[i] = n_in;
            output_counts[i] = n_out;
        }

        let mut port_flows = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            let processing = spec.element.processing();
            for p in 0..input_counts[i] {
                port_flows.insert(PortRef { elem: i, is_output: false, port: p }, processing.input_flow(p));
            }
            for p in 0..output_counts[i] {
                port_flows.insert(PortRef { elem: i, is_output: true, port: p }, processing.output_flow(p));
            }
        }
        let resolved = flow::resolve(&port_flows, &connections).map_err(RouterError::FlowDirection)?;

        let mut order: Vec<usize> = (0..specs.len()).collect();
        order.sort_by_key(|&i| (specs[i].element.configure_phase(), i));

        let mut any_error = false;
        for &i in &order {
            let landmark = crate::element::landmark_for(&names[i]);
            let args = specs[i].args.clone();
            if specs[i].element.configure(&args, errh).is_err() {
                any_error = true;
                errh.error(&landmark, &format!("{} failed to configure", names[i]));
            }
        }
        if any_error || errh.has_errors() {
            return Err(RouterError::Configuration(errh.diagnostics().to_vec()));
        }

        let mut initialized: Vec<usize> = Vec::with_capacity(order.len());
        let mut init_failed = false;
        for &i in &order {
            let landmark = crate::element::landmark_for(&names[i]);
            if specs[i].element.initialize(errh).is_err() {
                errh.error(&landmark, &format!("{} failed to initialize", names[i]));
                init_failed = true;
                break;
            }
            initialized.push(i);
        }
        if init_failed {
            for &i in initialized.iter().rev() {
                specs[i].element.cleanup(CleanupStage::Initialized);
            }
            for &i in &order {
                if !initialized.contains(&i) {
                    specs[i].element.cleanup(CleanupStage::Configured);
                }
            }
            return Err(RouterError::Initialization(errh.diagnostics().to_vec()));
        }

        let mut push_map = HashMap::new();
        let mut pull_map = HashMap::new();
        for c in &connections {
            push_map.insert((c.from_elem, c.from_port), *c);
            pull_map.insert((c.to_elem, c.to_port), *c);
        }

        let elements = specs.into_iter().map(|s| Mutex::new(s.element)).collect();

        Ok(Router {
            elements,
            names,
            name_to_index,
            connections,
            port_flows: resolved,
            push_map,
            pull_map,
            runcount: AtomicI64::new(1),
            state: Mutex::new(RouterState::Active),
        })
    }

    pub fn state(&self) -> RouterState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, s: RouterState) {
        *self.state.lock().unwrap() = s;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn name_of(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn port_flow(&self, port: PortRef) -> Option<Flow> {
        self.port_flows.get(&port).copied()
    }

    pub fn adjust_runcount(&self, delta: i64) -> i64 {
        self.runcount.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn runcount(&self) -> i64 {
        self.runcount.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> RouterView<'_> {
        RouterView { router: self }
    }

    /// Registers every element's handlers, prefixing each name with the
    /// element's dotted name.
    pub fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        for (i, element) in self.elements.iter().enumerate() {
            let mut scoped = ScopedRegistrar { inner: reg, prefix: &self.names[i] };
            element.lock().unwrap().add_handlers(&mut scoped);
        }
    }

    /// Runs `f` with exclusive access to element `idx`, by dotted name.
    pub fn with_element_mut<R>(&self, idx: usize, f: impl FnOnce(&mut dyn Element) -> R) -> R {
        let mut guard = self.elements[idx].lock().unwrap();
        f(guard.as_mut())
    }

    pub fn read_handler(&self, elem: usize, handler: &str) -> Option<String> {
        self.elements[elem].lock().unwrap().read_handler(handler)
    }

    pub fn write_handler(&self, elem: usize, handler: &str, value: &str) -> Result<(), String> {
        self.elements[elem].lock().unwrap().write_handler(handler, value)
    }

    pub fn wants_task(&self, elem: usize) -> bool {
        self.elements[elem].lock().unwrap().wants_task()
    }

    /// Runs element `elem`'s task quantum through a fresh [`RouterView`].
    /// The caller (a scheduling `Task` callback) owns deciding whether the
    /// returned bool means "reschedule".
    pub fn run_task(&self, elem: usize) -> bool {
        let view = self.view();
        self.elements[elem].lock().unwrap().run_task(elem, &view)
    }

    /// Transfers state into `self`'s elements from `old`, matched by class
    /// name and dotted name (spec.md §4.C "Hot swap").
    pub fn take_state_from(&self, old: &Router) {
        for (i, name) in self.names.iter().enumerate() {
            let Some(&old_idx) = old.name_to_index.get(name) else { continue };
            let mut new_el = self.elements[i].lock().unwrap();
            let mut old_el = old.elements[old_idx].lock().unwrap();
            if new_el.class_name() == old_el.class_name() {
                new_el.take_state(old_el.as_mut());
            }
        }
    }

    pub fn kill(&self) {
        self.set_state(RouterState::Dead);
        self.runcount.store(0, Ordering::SeqCst);
        for el in &self.elements {
            el.lock().unwrap().cleanup(CleanupStage::Initialized);
        }
    }

    fn find_downstream(&self, from_elem: usize, from_port: usize) -> Option<Connection> {
        self.push_map.get(&(from_elem, from_port)).copied()
    }

    fn find_upstream(&self, to_elem: usize, to_port: usize) -> Option<Connection> {
        self.pull_map.get(&(to_elem, to_port)).copied()
    }
}

struct ScopedRegistrar<'a> {
    inner: &'a mut dyn HandlerRegistrar,
    prefix: &'a str,
}

impl<'a> HandlerRegistrar for ScopedRegistrar<'a> {
    fn add_read_handler(&mut self, name: &str, calm: bool) {
        self.inner.add_read_handler(&format!("{}.{}", self.prefix, name), calm);
    }

    fn add_write_handler(&mut self, name: &str) {
        self.inner.add_write_handler(&format!("{}.{}", self.prefix, name));
    }
}

/// A borrow of the router passed into `push`/`pull` calls so an element can
/// deliver a packet downstream or pull one from upstream without owning a
/// reference to the whole graph.
#[derive(Clone, Copy)]
pub struct RouterView<'a> {
    router: &'a Router,
}

impl<'a> RouterView<'a> {
    /// Delivers `pkt` to whatever is connected to `from_elem`'s output
    /// `from_port`. If nothing is connected, the packet is killed.
    pub fn push_downstream(&self, from_elem: usize, from_port: usize, pkt: Packet) {
        match self.router.find_downstream(from_elem, from_port) {
            Some(conn) => {
                let mut target = self.router.elements[conn.to_elem].lock().unwrap();
                target.push(conn.to_elem, conn.to_port, pkt, self);
            }
            None => pkt.kill(),
        }
    }

    /// Requests a packet from whatever is connected to `to_elem`'s input
    /// `to_port`.
    pub fn pull_upstream(&self, to_elem: usize, to_port: usize) -> Option<Packet> {
        let conn = self.router.find_upstream(to_elem, to_port)?;
        let mut source = self.router.elements[conn.from_elem].lock().unwrap();
        source.pull(conn.from_elem, conn.from_port, self)
    }

    pub fn element_name(&self, idx: usize) -> &str {
        self.router.name_of(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.router.index_of(name)
    }

    pub fn router(&self) -> &'a Router {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortSpec, Processing};
    use std::any::Any;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Source;

    impl Element for Source {
        fn class_name(&self) -> &str {
            "Source"
        }
        fn port_spec(&self) -> PortSpec {
            PortSpec::parse("0/1").unwrap()
        }
        fn processing(&self) -> Processing {
            Processing::parse("a/h").unwrap()
        }
        fn pull(&mut self, _self_index: usize, _port: usize, _router: &RouterView) -> Option<Packet> {
            None
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Discard {
        received: Arc<StdMutex<usize>>,
    }

    impl Element for Discard {
        fn class_name(&self) -> &str {
            "Discard"
        }
        fn port_spec(&self) -> PortSpec {
            PortSpec::parse("1/0").unwrap()
        }
        fn processing(&self) -> Processing {
            Processing::parse("h/a").unwrap()
        }
        fn push(&mut self, _self_index: usize, _port: usize, pkt: Packet, _router: &RouterView) {
            *self.received.lock().unwrap() += 1;
            pkt.kill();
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn builds_and_resolves_push_chain() {
        let received = Arc::new(StdMutex::new(0));
        let specs = vec![
            ElementSpec::new("src", Box::new(Source), vec![]),
            ElementSpec::new("dst", Box::new(Discard { received: received.clone() }), vec![]),
        ];
        let connections = vec![Connection::new(0, 0, 1, 0)];
        let mut errh = VecErrorSink::new();
        let router = Router::build(specs, connections, &mut errh).unwrap();
        assert_eq!(router.state(), RouterState::Active);
        let view = router.view();
        view.push_downstream(0, 0, Packet::make(0, Some(b"hi\n"), 3, 0));
        assert_eq!(*received.lock().unwrap(), 1);
    }

    #[test]
    fn port_count_mismatch_is_reported() {
        struct TooFewOutputs;
        impl Element for TooFewOutputs {
            fn class_name(&self) -> &str {
                "TooFewOutputs"
            }
            fn port_spec(&self) -> PortSpec {
                PortSpec::parse("0/1").unwrap()
            }
            fn processing(&self) -> Processing {
                Processing::parse("a/h").unwrap()
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        let specs = vec![
            ElementSpec::new("a", Box::new(TooFewOutputs), vec![]),
            ElementSpec::new("b", Box::new(TooFewOutputs), vec![]),
        ];
        // Two connections from element 0's output port 0 and 1, but its
        // spec only allows exactly 1 output.
        let connections = vec![Connection::new(0, 0, 1, 0), Connection::new(0, 1, 1, 0)];
        let mut errh = VecErrorSink::new();
        let err = Router::build(specs, connections, &mut errh).unwrap_err();
        assert!(matches!(err, RouterError::PortCountMismatch { .. }));
    }
}
