//! Null: passes packets through unchanged (one input, one output).

use std::any::Any;

use router_core::{Element, PortSpec, Processing};
use router_packet::Packet;

#[derive(Default)]
pub struct Null;

impl Element for Null {
    fn class_name(&self) -> &str {
        "Null"
    }

    fn port_spec(&self) -> PortSpec {
        PortSpec::parse("1/1").unwrap()
    }

    fn processing(&self) -> Processing {
        Processing::parse("a/a").unwrap()
    }

    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        Some(pkt)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
