//! Queue: bounded FIFO between a push input and a pull output, the
//! classic Click push-to-pull adapter.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Mutex;

use router_core::{Element, ErrorSink, HandlerRegistrar, PortSpec, Processing, RouterView};
use router_packet::Packet;

const DEFAULT_CAPACITY: usize = 1000;

pub struct Queue {
    packets: Mutex<VecDeque<Packet>>,
    capacity: usize,
    drops: Mutex<u64>,
}

impl Default for Queue {
    fn default() -> Queue {
        Queue {
            packets: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_CAPACITY,
            drops: Mutex::new(0),
        }
    }
}

impl Element for Queue {
    fn class_name(&self) -> &str {
        "Queue"
    }

    fn port_spec(&self) -> PortSpec {
        PortSpec::parse("1/1").unwrap()
    }

    fn processing(&self) -> Processing {
        Processing::parse("h/l").unwrap()
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Result<(), ()> {
        if let Some(cap) = args.first() {
            self.capacity = cap.parse().map_err(|_| {
                errh.error(&router_core::Landmark::unknown(), &format!("bad capacity {cap:?}"));
            })?;
        }
        Ok(())
    }

    fn push(&mut self, _self_index: usize, _port: usize, pkt: Packet, _router: &RouterView) {
        let mut q = self.packets.lock().unwrap();
        if q.len() >= self.capacity {
            *self.drops.lock().unwrap() += 1;
            pkt.kill();
            return;
        }
        q.push_back(pkt);
    }

    fn pull(&mut self, _self_index: usize, _port: usize, _router: &RouterView) -> Option<Packet> {
        self.packets.lock().unwrap().pop_front()
    }

    fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        reg.add_read_handler("length", true);
        reg.add_read_handler("capacity", false);
        reg.add_read_handler("drops", true);
        reg.add_write_handler("capacity");
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "length" => Some(format!("{}\n", self.packets.lock().unwrap().len())),
            "capacity" => Some(format!("{}\n", self.capacity)),
            "drops" => Some(format!("{}\n", self.drops.lock().unwrap())),
            _ => None,
        }
    }

    fn write_handler(&mut self, name: &str, value: &str) -> Result<(), String> {
        if name != "capacity" {
            return Err(format!("no such write handler {name:?}"));
        }
        self.capacity = value.trim().parse().map_err(|_| format!("bad capacity {value:?}"))?;
        Ok(())
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
    use router_core::{Connection, ElementSpec, Router, VecErrorSink};

    struct Src;
    impl Element for Src {
        fn class_name(&self) -> &str {
            "Src"
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
    struct Snk;
    impl Element for Snk {
        fn class_name(&self) -> &str {
            "Snk"
        }
        fn port_spec(&self) -> PortSpec {
            PortSpec::parse("1/0").unwrap()
        }
        fn processing(&self) -> Processing {
            Processing::parse("l/a").unwrap()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn fifo_order_and_drops_past_capacity() {
        let specs = vec![
            ElementSpec::new("src", Box::new(Src), vec![]),
            ElementSpec::new("q", Box::new(Queue::default()), vec![]),
        ];
        let connections = vec![Connection::new(0, 0, 1, 0)];
        let mut errh = VecErrorSink::new();
        let router = Router::build(specs, connections, &mut errh).unwrap();
        router.write_handler(1, "capacity", "2").unwrap();
        let view = router.view();
        view.push_downstream(0, 0, Packet::make(0, Some(b"a"), 1, 0));
        view.push_downstream(0, 0, Packet::make(0, Some(b"b"), 1, 0));
        view.push_downstream(0, 0, Packet::make(0, Some(b"c"), 1, 0));
        assert_eq!(router.read_handler(1, "length"), Some("2\n".to_string()));
        assert_eq!(router.read_handler(1, "drops"), Some("1\n".to_string()));
        let first = router.with_element_mut(1, |el| el.pull(1, 0, &view)).unwrap();
        assert_eq!(first.data(), b"a");
        assert_eq!(router.read_handler(1, "length"), Some("1\n".to_string()));
    }

    #[test]
    fn queue_wired_push_to_pull_round_trips_through_the_router() {
        let specs = vec![
            ElementSpec::new("src", Box::new(Src), vec![]),
            ElementSpec::new("q", Box::new(Queue::default()), vec![]),
            ElementSpec::new("snk", Box::new(Snk), vec![]),
        ];
        let connections = vec![Connection::new(0, 0, 1, 0), Connection::new(1, 0, 2, 0)];
        let mut errh = VecErrorSink::new();
        let router = Router::build(specs, connections, &mut errh).unwrap();
        let view = router.view();
        view.push_downstream(0, 0, Packet::make(0, Some(b"hi"), 2, 0));
        assert_eq!(router.read_handler(1, "length"), Some("1\n".to_string()));
        let pulled = view.pull_upstream(2, 0).unwrap();
        assert_eq!(pulled.data(), b"hi");
        assert_eq!(router.read_handler(1, "length"), Some("0\n".to_string()));
    }
}
