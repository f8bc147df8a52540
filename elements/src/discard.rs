//! Discard: a push sink. Kills every packet it receives and counts them.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use router_core::{Element, ErrorSink, HandlerRegistrar, PortSpec, Processing, RouterView};
use router_packet::Packet;

#[derive(Default)]
pub struct Discard {
    count: AtomicU64,
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
        self.count.fetch_add(1, Ordering::Relaxed);
        pkt.kill();
    }

    fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        reg.add_read_handler("count", true);
        reg.add_write_handler("reset_counts");
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        (name == "count").then(|| format!("{}\n", self.count.load(Ordering::Relaxed)))
    }

    fn write_handler(&mut self, name: &str, _value: &str) -> Result<(), String> {
        if name == "reset_counts" {
            self.count.store(0, Ordering::Relaxed);
            Ok(())
        } else {
            Err(format!("no such write handler {name:?}"))
        }
    }

    fn configure(&mut self, _args: &[String], _errh: &mut dyn ErrorSink) -> Result<(), ()> {
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
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn counts_and_kills_every_pushed_packet() {
        let specs = vec![
            ElementSpec::new("src", Box::new(Source), vec![]),
            ElementSpec::new("sink", Box::new(Discard::default()), vec![]),
        ];
        let mut errh = VecErrorSink::new();
        let router = Router::build(specs, vec![Connection::new(0, 0, 1, 0)], &mut errh).unwrap();
        let view = router.view();
        for _ in 0..3 {
            view.push_downstream(0, 0, Packet::make(0, None, 4, 0));
        }
        assert_eq!(router.read_handler(1, "count"), Some("3\n".to_string()));
        router.write_handler(1, "reset_counts", "").unwrap();
        assert_eq!(router.read_handler(1, "count"), Some("0\n".to_string()));
    }
}
