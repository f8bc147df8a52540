//! Shaper: a pull element that limits the rate of packets passing through
//! to a configured maximum packets/second (grounded on
//! `elements/standard/shaper.cc`'s gap-rate pull logic).

use std::any::Any;
use std::time::Duration;

use router_core::{Element, ErrorSink, HandlerRegistrar, Landmark, PortSpec, Processing, RouterView};
use router_packet::{Packet, Timestamp};

pub struct Shaper {
    rate: u64,
    interval: Duration,
    next_allowed: Timestamp,
}

impl Default for Shaper {
    fn default() -> Shaper {
        Shaper { rate: 0, interval: Duration::ZERO, next_allowed: Timestamp::ZERO }
    }
}

impl Shaper {
    fn set_rate(&mut self, rate: u64) {
        self.rate = rate;
        self.interval = if rate == 0 { Duration::ZERO } else { Duration::from_secs_f64(1.0 / rate as f64) };
    }
}

impl Element for Shaper {
    fn class_name(&self) -> &str {
        "Shaper"
    }

    fn port_spec(&self) -> PortSpec {
        PortSpec::parse("1/1").unwrap()
    }

    fn processing(&self) -> Processing {
        Processing::parse("l/l").unwrap()
    }

    fn configure(&mut self, args: &[String], errh: &mut dyn ErrorSink) -> Result<(), ()> {
        let rate_str = args.first().ok_or(()).map_err(|_| {
            errh.error(&Landmark::unknown(), "Shaper needs a RATE argument");
        })?;
        let rate: u64 = rate_str.parse().map_err(|_| {
            errh.error(&Landmark::unknown(), &format!("bad rate {rate_str:?}"));
        })?;
        self.set_rate(rate);
        Ok(())
    }

    fn pull(&mut self, self_index: usize, port: usize, router: &RouterView) -> Option<Packet> {
        if self.rate == 0 {
            return router.pull_upstream(self_index, port);
        }
        let now = Timestamp::now();
        if now < self.next_allowed {
            return None;
        }
        let pkt = router.pull_upstream(self_index, port)?;
        self.next_allowed = now + self.interval;
        Some(pkt)
    }

    fn add_handlers(&self, reg: &mut dyn HandlerRegistrar) {
        reg.add_read_handler("rate", false);
        reg.add_write_handler("rate");
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        (name == "rate").then(|| format!("{}\n", self.rate))
    }

    fn write_handler(&mut self, name: &str, value: &str) -> Result<(), String> {
        if name != "rate" {
            return Err(format!("no such write handler {name:?}"));
        }
        let rate: u64 = value.trim().parse().map_err(|_| format!("bad rate {value:?}"))?;
        self.set_rate(rate);
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

    #[test]
    fn zero_rate_means_unshaped() {
        let mut s = Shaper::default();
        assert_eq!(s.rate, 0);
        assert_eq!(s.interval, Duration::ZERO);
    }

    #[test]
    fn write_handler_updates_rate_and_interval() {
        let mut s = Shaper::default();
        s.write_handler("rate", "1000").unwrap();
        assert_eq!(s.rate, 1000);
        assert_eq!(s.interval, Duration::from_millis(1));
        assert_eq!(s.read_handler("rate"), Some("1000\n".to_string()));
    }
}
