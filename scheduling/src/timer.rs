//! Per-thread timer heap (spec.md §3 "Timer", §4.F "TimerSet").
//!
//! Single-thread ownership: only the bound thread modifies the heap.
//! Timers with equal expiration fire in the order they were last
//! scheduled (stable on ties), which is why every timer also carries a
//! monotonically increasing sequence number used as the heap tie-break.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use router_packet::Timestamp;

struct TimerInner {
    name: String,
    callback: Mutex<Box<dyn FnMut() + Send>>,
    state: Mutex<TimerState>,
}

struct TimerState {
    expiration: Timestamp,
    seq: u64,
    heap_index: Option<usize>,
    home_thread_id: i32,
}

/// A handle to a scheduled (or not-yet-scheduled) timer.
#[derive(Clone)]
pub struct Timer(Arc<TimerInner>);

impl Timer {
    pub fn new<F: FnMut() + Send + 'static>(name: impl Into<String>, thread_id: i32, callback: F) -> Timer {
        Timer(Arc::new(TimerInner {
            name: name.into(),
            callback: Mutex::new(Box::new(callback)),
            state: Mutex::new(TimerState {
                expiration: Timestamp::ZERO,
                seq: 0,
                heap_index: None,
                home_thread_id: thread_id,
            }),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn same(&self, other: &Timer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_scheduled(&self) -> bool {
        self.0.state.lock().unwrap().heap_index.is_some()
    }

    pub fn expiration(&self) -> Timestamp {
        self.0.state.lock().unwrap().expiration
    }

    fn fire(&self) {
        (self.0.callback.lock().unwrap())();
    }
}

/// A per-thread min-heap of `(expiration, seq, Timer)`, keyed for
/// expiration-then-insertion-order comparison.
pub struct TimerSet {
    heap: Vec<Timer>,
    next_seq: u64,
    epoch: AtomicU64,
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSet {
    pub fn new() -> Self {
        TimerSet {
            heap: Vec::new(),
            next_seq: 0,
            epoch: AtomicU64::new(0),
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let sa = self.heap[a].0.state.lock().unwrap();
        let sb = self.heap[b].0.state.lock().unwrap();
        (sa.expiration, sa.seq) < (sb.expiration, sb.seq)
    }

    fn set_index(&mut self, pos: usize) {
        self.heap[pos].0.state.lock().unwrap().heap_index = Some(pos);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.set_index(a);
        self.set_index(b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut smallest = i;
            if l < self.heap.len() && self.less(l, smallest) {
                smallest = l;
            }
            if r < self.heap.len() && self.less(r, smallest) {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn remove_at(&mut self, pos: usize) {
        let last = self.heap.len() - 1;
        if pos != last {
            self.swap(pos, last);
            self.heap.pop();
            if pos < self.heap.len() {
                self.sift_down(pos);
                self.sift_up(pos);
            }
        } else {
            self.heap.pop();
        }
    }

    /// Schedules `timer` to fire at absolute time `at`. O(log n).
    pub fn schedule_at(&mut self, timer: &Timer, at: Timestamp) {
        self.unschedule(timer);
        {
            let mut s = timer.0.state.lock().unwrap();
            s.expiration = at;
            s.seq = self.next_seq;
        }
        self.next_seq += 1;
        let pos = self.heap.len();
        self.heap.push(timer.clone());
        self.set_index(pos);
        self.sift_up(pos);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Schedules `timer` to fire `delay` from `now`.
    pub fn schedule_after(&mut self, timer: &Timer, now: Timestamp, delay: Duration) {
        self.schedule_at(timer, now + delay);
    }

    /// Cancels `timer` if scheduled. Idempotent. O(log n).
    pub fn unschedule(&mut self, timer: &Timer) {
        let pos = timer.0.state.lock().unwrap().heap_index;
        if let Some(pos) = pos {
            if pos < self.heap.len() && self.heap[pos].same(timer) {
                timer.0.state.lock().unwrap().heap_index = None;
                self.remove_at(pos);
                self.epoch.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Fires all timers whose expiration is `<= now`, in expiration order
    /// (stable on ties). A callback may reschedule its own timer, which
    /// causes a fresh heap insertion that this call will not re-fire.
    pub fn fire_expired(&mut self, now: Timestamp) -> usize {
        let mut fired = 0;
        loop {
            let due = match self.heap.first() {
                Some(t) if t.expiration() <= now => t.clone(),
                _ => break,
            };
            due.0.state.lock().unwrap().heap_index = None;
            self.remove_at(0);
            due.fire();
            fired += 1;
        }
        if fired > 0 {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        fired
    }

    /// Time until the earliest scheduled timer, or `None` if empty.
    pub fn next_delay(&self, now: Timestamp) -> Option<Duration> {
        self.heap.first().map(|t| {
            let exp = t.expiration();
            if exp <= now {
                Duration::ZERO
            } else {
                exp - now
            }
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Bumps and returns the fence epoch; used so `Master::pause` can wait
    /// until this thread has observed a configuration change.
    pub fn fence(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fires_in_expiration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut set = TimerSet::new();
        for (name, t) in [("a", 30), ("b", 10), ("c", 20)] {
            let order = order.clone();
            let name = name.to_string();
            let timer = Timer::new(name.clone(), 0, move || order.lock().unwrap().push(name.clone()));
            set.schedule_at(&timer, Timestamp::new(t, 0));
        }
        set.fire_expired(Timestamp::new(100, 0));
        assert_eq!(*order.lock().unwrap(), vec!["b", "c", "a"]);
    }

    #[test]
    fn equal_expiration_fires_in_schedule_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut set = TimerSet::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            let name = name.to_string();
            let timer = Timer::new(name.clone(), 0, move || order.lock().unwrap().push(name.clone()));
            set.schedule_at(&timer, Timestamp::new(10, 0));
        }
        set.fire_expired(Timestamp::new(10, 0));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unschedule_is_idempotent() {
        let mut set = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let timer = Timer::new("t", 0, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        set.schedule_at(&timer, Timestamp::new(5, 0));
        set.unschedule(&timer);
        set.unschedule(&timer);
        set.fire_expired(Timestamp::new(100, 0));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_can_reschedule_without_double_firing() {
        let mut set = TimerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let timer = Timer::new("t", 0, move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        set.schedule_at(&timer, Timestamp::new(1, 0));
        let fired = set.fire_expired(Timestamp::new(1, 0));
        assert_eq!(fired, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_scheduled());
    }
}
