//! Seconds-and-nanoseconds timestamp used throughout the router core.
//!
//! Handler text for timestamps accepts seconds with an optional fractional
//! part, or `<sec>.<nsec>`; see `router-control`'s `hvalue` module for the
//! parser.

use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time (or a duration), represented as whole seconds plus
/// nanoseconds, matching the `<sec>.<nsec>` handler wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Timestamp {
    sec: i64,
    nsec: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: u32) -> Timestamp {
        let mut t = Timestamp { sec, nsec: 0 };
        t.add_nsec(nsec as i64);
        t
    }

    pub fn from_duration(d: Duration) -> Timestamp {
        Timestamp::new(d.as_secs() as i64, d.subsec_nanos())
    }

    /// Wall-clock time, as a duration since the Unix epoch.
    pub fn now() -> Timestamp {
        let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Timestamp::from_duration(d)
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn nsec(&self) -> u32 {
        self.nsec
    }

    pub fn as_duration(&self) -> Duration {
        Duration::new(self.sec.max(0) as u64, self.nsec)
    }

    fn add_nsec(&mut self, nsec: i64) {
        let total = self.nsec as i64 + nsec;
        self.sec += total.div_euclid(1_000_000_000);
        self.nsec = total.rem_euclid(1_000_000_000) as u32;
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        let mut t = self;
        t.sec += rhs.as_secs() as i64;
        t.add_nsec(rhs.subsec_nanos() as i64);
        t
    }
}

impl Sub for Timestamp {
    type Output = Duration;
    fn sub(self, rhs: Timestamp) -> Duration {
        let delta_sec = self.sec - rhs.sec;
        let delta_nsec = self.nsec as i64 - rhs.nsec as i64;
        let total_nsec = delta_sec * 1_000_000_000 + delta_nsec;
        Duration::from_nanos(total_nsec.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_overflowing_nanoseconds() {
        let t = Timestamp::new(1, 1_500_000_000);
        assert_eq!(t.sec(), 2);
        assert_eq!(t.nsec(), 500_000_000);
    }

    #[test]
    fn add_duration_carries() {
        let t = Timestamp::new(0, 900_000_000) + Duration::from_millis(200);
        assert_eq!(t.sec(), 1);
        assert_eq!(t.nsec(), 100_000_000);
    }

    #[test]
    fn subtraction_yields_duration() {
        let a = Timestamp::new(5, 0);
        let b = Timestamp::new(3, 500_000_000);
        assert_eq!(a - b, Duration::new(1, 500_000_000));
    }
}
