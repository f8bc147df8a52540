//! Element: the abstract unit of processing (spec.md §3, §4.B).
//!
//! Role-interface decomposition per spec.md §9 ("Multiple inheritance of
//! elements"): one concrete trait plus capability discovery through
//! `push`/`pull`/`simple_action`, each with a default that signals "not
//! supported" so an element only implements the role it needs instead of
//! inheriting from a deep virtual hierarchy.

use std::any::Any;

use router_packet::Packet;

use crate::error::{ErrorSink, Landmark};
use crate::port::{PortSpec, Processing};
use crate::router::RouterView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStage {
    /// `configure` ran but `initialize` did not (or failed).
    Configured,
    /// Both `configure` and `initialize` completed.
    Initialized,
}

/// One packet-processing vertex. `configure`/`initialize`/`cleanup` run on
/// the bring-up/teardown thread only; `push`/`pull`/`simple_action` run on
/// whichever thread's Task drives the surrounding chain and must not block
/// indefinitely (spec.md §9 "Coroutine-like behavior").
pub trait Element: Send {
    fn class_name(&self) -> &str;

    fn port_spec(&self) -> PortSpec;

    fn processing(&self) -> Processing;

    /// Lower values configure first; elements with equal phase configure in
    /// declaration order.
    fn configure_phase(&self) -> i32 {
        0
    }

    fn configure(&mut self, _args: &[String], _errh: &mut dyn ErrorSink) -> Result<(), ()> {
        Ok(())
    }

    fn initialize(&mut self, _errh: &mut dyn ErrorSink) -> Result<(), ()> {
        Ok(())
    }

    fn cleanup(&mut self, _stage: CleanupStage) {}

    /// Called when this element's input `port` is push-driven with `pkt`.
    /// `self_index` is this element's position in the router, needed to
    /// address `RouterView::push_downstream`. The default forwards through
    /// [`Element::simple_action`] to output port 0, which is all a plain
    /// one-in-one-out agnostic element needs to implement.
    fn push(&mut self, self_index: usize, _port: usize, pkt: Packet, router: &RouterView) {
        if let Some(out) = self.simple_action(pkt) {
            router.push_downstream(self_index, 0, out);
        }
    }

    /// Called when this element's output `port` is pulled by a downstream
    /// element. The default pulls on input port 0 and forwards through
    /// [`Element::simple_action`].
    fn pull(&mut self, self_index: usize, port: usize, router: &RouterView) -> Option<Packet> {
        let pkt = router.pull_upstream(self_index, port)?;
        self.simple_action(pkt)
    }

    /// Agnostic-port convenience: one packet in, at most one packet out.
    /// The framework calls this from `push`/`pull` default wiring when an
    /// element implements neither directly.
    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        Some(pkt)
    }

    /// Whether this element needs a Task bound to it at bring-up, e.g. an
    /// active source that generates packets on its own schedule rather
    /// than in response to a push/pull. The owning crate is responsible
    /// for creating and registering the Task; `router-core` only exposes
    /// this flag and [`Element::run_task`] as the hook it will call.
    fn wants_task(&self) -> bool {
        false
    }

    /// Runs one quantum of this element's task. Returns `true` to stay
    /// scheduled (there may be more work), `false` to unschedule.
    fn run_task(&mut self, _self_index: usize, _router: &RouterView) -> bool {
        false
    }

    /// Registers this element's handlers with the router's handler table.
    fn add_handlers(&self, _reg: &mut dyn HandlerRegistrar) {}

    /// Reads the named handler's current value, if this element has one by
    /// that name and it is readable.
    fn read_handler(&self, _name: &str) -> Option<String> {
        None
    }

    /// Writes `value` to the named handler. `Ok(())` on success; `Err`
    /// carries a message to report back over the protocol (spec.md §4.I
    /// maps this onto the 5xx codes).
    fn write_handler(&mut self, name: &str, _value: &str) -> Result<(), String> {
        Err(format!("no such write handler {name:?}"))
    }

    /// Transfers state from a prior incarnation of "the same" element
    /// across a hot swap, matched by class name (spec.md §4.C "Hot swap").
    fn take_state(&mut self, _old: &mut dyn Element) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Abstract handler-table sink so `router-core` does not depend on
/// `router-control`'s concrete `Handler` type; `router-control` implements
/// this trait over its own table.
pub trait HandlerRegistrar {
    fn add_read_handler(&mut self, name: &str, calm: bool);
    fn add_write_handler(&mut self, name: &str);
}

pub(crate) fn landmark_for(element_name: &str) -> Landmark {
    Landmark::new(element_name, 0)
}
