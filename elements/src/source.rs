//! Source: an active element that generates packets on its own task rather
//! than in response to a push or pull (spec.md's Task "owner-element").
//!
//! Grounded generally on Click's infinite/rated packet sources: the
//! element does not know about threads or scheduling itself, it only
//! reports [`Element::wants_task`] and implements [`Element::run_task`];
//! the crate that owns `Thread`/`Task` (the `router` binary crate) is
//! responsible for actually binding a Task to it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use router_core::{Element, ErrorSink, HandlerRegistrar, PortSpec, Processing, RouterView};
use router_packet::Packet;

pub struct Source {
    payload_len: usize,
    limit: Option<u64>,
    emitted: AtomicU64,
    active: AtomicBool,
}

impl Default for Source {
    fn default() -> Source {
        Source {
            payload_len: 64,
            limit: None,
            emitted: AtomicU64::new(0),
            active: AtomicBool::new(true),
        }
    }
}

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

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Result<(), ()> {
        if let Some(len) = args.first() {
            self.payload_len = len.parse().map_err(|_| {
                errh.error(&router_core::Landmark::unknown(), &format!("bad packet length {len:?}"));
            })?;
        }
        if let Some(limit) = args.get(1) {
            self.limit = Some(limit.parse().map_err(|_| {
                errh.error(&router_core::Landmark::unknown(), &format!("bad limit {limit:?}"));
            })?);
        }
        Ok(())
    }

    fn wants_task(&self) -> bool {
        true
    }

    fn run_task(&mut self, self_index: usize, router: &RouterView) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return false;
        }
        let emitted = self.emitted.fetch_add(1, Ordering::Relaxed) + 1;
        router.push_downstream(self_index, 0, Packet::make(0, None, self.payload_len, 0));
        match self.limit {
            Some(limit) if emitted >= limit => false,
            _ => true,
        }
    }

    fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        reg.add_read_handler("count", true);
        reg.add_read_handler("active", false);
        reg.add_write_handler("active");
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(format!("{}\n", self.emitted.load(Ordering::Relaxed))),
            "active" => Some(format!("{}\n", self.active.load(Ordering::Relaxed))),
            _ => None,
        }
    }

    fn write_handler(&mut self, name: &str, value: &str) -> Result<(), String> {
        if name == "active" {
            let v = matches!(value.trim(), "1" | "true" | "yes");
            self.active.store(v, Ordering::Relaxed);
            Ok(())
        } else {
            Err(format!("no such write handler {name:?}"))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
