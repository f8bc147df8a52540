//! Counter: a pass-through element that tallies packets and bytes seen.

use std::any::Any;

use router_core::{Element, HandlerRegistrar, PortSpec, Processing};
use router_packet::Packet;

#[derive(Default)]
pub struct Counter {
    packets: u64,
    bytes: u64,
}

impl Element for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn port_spec(&self) -> PortSpec {
        PortSpec::parse("1/1").unwrap()
    }

    fn processing(&self) -> Processing {
        Processing::parse("a/a").unwrap()
    }

    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        self.packets += 1;
        self.bytes += pkt.len() as u64;
        Some(pkt)
    }

    fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        reg.add_read_handler("count", true);
        reg.add_read_handler("byte_count", true);
        reg.add_write_handler("reset");
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.packets)),
            "byte_count" => Some(format!("{}\n", self.bytes)),
            _ => None,
        }
    }

    fn write_handler(&mut self, name: &str, _value: &str) -> Result<(), String> {
        if name == "reset" {
            self.packets = 0;
            self.bytes = 0;
            Ok(())
        } else {
            Err(format!("no such write handler {name:?}"))
        }
    }

    fn take_state(&mut self, old: &mut dyn Element) {
        if let Some(old) = old.as_any_mut().downcast_mut::<Counter>() {
            self.packets = old.packets;
            self.bytes = old.bytes;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_packets_and_bytes_and_resets() {
        let mut c = Counter::default();
        c.simple_action(Packet::make(0, None, 10, 0));
        c.simple_action(Packet::make(0, None, 20, 0));
        assert_eq!(c.read_handler("count"), Some("2\n".to_string()));
        assert_eq!(c.read_handler("byte_count"), Some("30\n".to_string()));
        c.write_handler("reset", "").unwrap();
        assert_eq!(c.read_handler("count"), Some("0\n".to_string()));
    }

    #[test]
    fn take_state_carries_tallies_from_the_old_element() {
        let mut old = Counter::default();
        old.simple_action(Packet::make(0, None, 10, 0));
        old.simple_action(Packet::make(0, None, 20, 0));

        let mut fresh = Counter::default();
        fresh.take_state(&mut old);
        assert_eq!(fresh.read_handler("count"), Some("2\n".to_string()));
        assert_eq!(fresh.read_handler("byte_count"), Some("30\n".to_string()));
    }
}
