//! The shared, ref-counted packet buffer (spec.md §3, §4.A).

use std::sync::Arc;

use crate::anno::PacketAnno;
use crate::storage::{ExternalPtr, Storage};
use crate::Timestamp;

/// Which header offset is being read or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Mac,
    Network,
    Transport,
}

struct PacketInner {
    storage: Storage,
    /// Offset of the current packet data within `storage`.
    data_start: usize,
    data_len: usize,
    mac_offset: Option<usize>,
    network_offset: Option<usize>,
    transport_offset: Option<usize>,
    timestamp: Timestamp,
    anno: PacketAnno,
}

/// A shared, logically-immutable packet buffer. Clone is cheap (bumps a
/// reference count); call [`Packet::uniqueify`] to get exclusive, mutable
/// access, copying the backing storage only if it is actually shared.
#[derive(Clone)]
pub struct Packet(Arc<PacketInner>);

impl Packet {
    /// Allocates a new owned packet with `headroom` bytes before the data
    /// and `tailroom` bytes after it. If `data` is provided it is copied
    /// into place; otherwise the data region is zeroed.
    pub fn make(headroom: usize, data: Option<&[u8]>, length: usize, tailroom: usize) -> Packet {
        let total = headroom + length + tailroom;
        let mut buf = vec![0u8; total];
        if let Some(d) = data {
            buf[headroom..headroom + length].copy_from_slice(&d[..length.min(d.len())]);
        }
        Packet(Arc::new(PacketInner {
            storage: Storage::Owned(buf),
            data_start: headroom,
            data_len: length,
            mac_offset: None,
            network_offset: None,
            transport_offset: None,
            timestamp: Timestamp::ZERO,
            anno: PacketAnno::default(),
        }))
    }

    /// Wraps an externally-managed buffer (e.g. a DPDK mbuf or an mmap'd
    /// capture page). `destructor` is invoked exactly once, on whatever
    /// thread drops the last reference to this packet, with the original
    /// `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes for `len` bytes for as long
    /// as any clone of the returned `Packet` is alive, and must not be
    /// accessed by anything else during that time.
    pub unsafe fn from_external(
        ptr: *mut u8,
        len: usize,
        destructor: Box<dyn FnOnce(*mut u8) + Send>,
    ) -> Packet {
        Packet(Arc::new(PacketInner {
            storage: Storage::External {
                ptr: ExternalPtr(ptr),
                len,
                destructor: Some(destructor),
            },
            data_start: 0,
            data_len: len,
            mac_offset: None,
            network_offset: None,
            transport_offset: None,
            timestamp: Timestamp::ZERO,
            anno: PacketAnno::default(),
        }))
    }

    /// The current packet data.
    pub fn data(&self) -> &[u8] {
        let inner = &self.0;
        &inner.storage.as_slice()[inner.data_start..inner.data_start + inner.data_len]
    }

    pub fn len(&self) -> usize {
        self.0.data_len
    }

    pub fn is_empty(&self) -> bool {
        self.0.data_len == 0
    }

    pub fn headroom(&self) -> usize {
        self.0.data_start
    }

    pub fn tailroom(&self) -> usize {
        self.0.storage.capacity() - self.0.data_start - self.0.data_len
    }

    pub fn timestamp(&self) -> Timestamp {
        self.0.timestamp
    }

    pub fn set_timestamp(&mut self, t: Timestamp) {
        self.make_unique().timestamp = t;
    }

    pub fn anno(&self) -> &PacketAnno {
        &self.0.anno
    }

    pub fn anno_mut(&mut self) -> &mut PacketAnno {
        &mut self.make_unique().anno
    }

    pub fn header_offset(&self, kind: HeaderKind) -> Option<usize> {
        match kind {
            HeaderKind::Mac => self.0.mac_offset,
            HeaderKind::Network => self.0.network_offset,
            HeaderKind::Transport => self.0.transport_offset,
        }
    }

    pub fn set_header_offset(&mut self, kind: HeaderKind, offset: Option<usize>) {
        let inner = self.make_unique();
        match kind {
            HeaderKind::Mac => inner.mac_offset = offset,
            HeaderKind::Network => inner.network_offset = offset,
            HeaderKind::Transport => inner.transport_offset = offset,
        }
    }

    /// Returns a packet with a uniquely-owned, writable copy of the
    /// storage. If this packet is the sole reference already, no copy is
    /// made (copy-on-write).
    pub fn uniqueify(mut self) -> Packet {
        let _ = self.make_unique();
        self
    }

    fn make_unique(&mut self) -> &mut PacketInner {
        if Arc::get_mut(&mut self.0).is_none() {
            let cloned = PacketInner {
                storage: Storage::Owned(self.0.storage.as_slice().to_vec()),
                data_start: self.0.data_start,
                data_len: self.0.data_len,
                mac_offset: self.0.mac_offset,
                network_offset: self.0.network_offset,
                transport_offset: self.0.transport_offset,
                timestamp: self.0.timestamp,
                anno: self.0.anno.clone(),
            };
            self.0 = Arc::new(cloned);
        }
        Arc::get_mut(&mut self.0).expect("just uniqued")
    }

    /// Grows the data region by `n` bytes at the front (into headroom),
    /// reallocating owned storage if there isn't enough headroom.
    pub fn push(mut self, n: usize) -> Packet {
        {
            let inner = self.make_unique();
            if inner.data_start < n {
                let old_start = inner.data_start;
                let old_len = inner.data_len;
                let tailroom = inner.storage.capacity() - old_start - old_len;
                let new_start = n + 64; // leave slack headroom like Click's default grow
                let needed = new_start + old_len + tailroom;
                inner.storage.grow_owned(needed, old_start, old_len, new_start);
                inner.data_start = new_start;
            }
            inner.data_start -= n;
            inner.data_len += n;
        }
        self
    }

    /// Shrinks the data region by `n` bytes from the front (the opposite of
    /// [`Packet::push`]).
    pub fn pull(mut self, n: usize) -> Packet {
        let inner = self.make_unique();
        let n = n.min(inner.data_len);
        inner.data_start += n;
        inner.data_len -= n;
        self
    }

    /// Grows the data region by `n` bytes at the back (into tailroom),
    /// reallocating owned storage if there isn't enough tailroom.
    pub fn put(mut self, n: usize) -> Packet {
        {
            let inner = self.make_unique();
            let tailroom = inner.storage.capacity() - inner.data_start - inner.data_len;
            if tailroom < n {
                let old_start = inner.data_start;
                let old_len = inner.data_len;
                let needed = old_start + old_len + n + 64;
                inner.storage.grow_owned(needed, old_start, old_len, old_start);
            }
            inner.data_len += n;
        }
        self
    }

    /// Shrinks the data region by `n` bytes from the back.
    pub fn take(mut self, n: usize) -> Packet {
        let inner = self.make_unique();
        let n = n.min(inner.data_len);
        inner.data_len -= n;
        self
    }

    /// Drops this reference to the packet. Identical to `drop(self)`;
    /// spelled out because spec.md names `kill()` as an explicit operation.
    pub fn kill(self) {
        drop(self)
    }

    /// The number of live references sharing this packet's storage.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let inner = self.make_unique();
        let start = inner.data_start;
        let len = inner.data_len;
        &mut inner.storage.as_mut_slice()[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    #[test]
    fn clone_shares_storage_uniqueify_copies() {
        let p = Packet::make(16, Some(b"hello"), 5, 16);
        let clone = p.clone();
        assert_eq!(p.refcount(), 2);
        let unique = clone.uniqueify();
        assert_eq!(unique.data(), b"hello");
        // original packet p is untouched and still shared with nothing now
        // that unique has its own storage.
        assert_eq!(p.refcount(), 1);
    }

    #[test]
    fn push_pull_put_take_round_trip() {
        let p = Packet::make(32, Some(b"payload"), 7, 32);
        let p = p.push(4);
        assert_eq!(p.len(), 11);
        let p = p.pull(4);
        assert_eq!(p.data(), b"payload");
        let p = p.put(3);
        assert_eq!(p.len(), 10);
        let p = p.take(3);
        assert_eq!(p.data(), b"payload");
    }

    #[test]
    fn push_reallocates_when_headroom_exhausted() {
        let p = Packet::make(2, Some(b"ab"), 2, 2);
        let p = p.push(10);
        assert_eq!(p.len(), 12);
        assert_eq!(&p.data()[10..], b"ab");
    }

    #[test]
    fn annotation_round_trip_through_clone_and_uniqueify() {
        let mut p = Packet::make(0, None, 4, 0);
        p.anno_mut().aggregate = 99;
        let c = p.clone();
        assert_eq!(c.anno().aggregate, 99);
        let u = c.uniqueify();
        assert_eq!(u.anno().aggregate, 99);
    }

    #[test]
    fn external_destructor_fires_once_after_all_clones_dropped() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut backing = vec![9u8; 4];
        let ptr = backing.as_mut_ptr();
        let p = unsafe {
            Packet::from_external(
                ptr,
                4,
                Box::new(move |_p| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };
        let c1 = p.clone();
        let c2 = p.clone();
        drop(p);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(c1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(c2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(backing);
    }

    #[test]
    fn header_offsets_are_independent_slots() {
        let mut p = Packet::make(8, Some(b"eth+ip"), 6, 8);
        p.set_header_offset(HeaderKind::Mac, Some(0));
        p.set_header_offset(HeaderKind::Network, Some(14));
        assert_eq!(p.header_offset(HeaderKind::Mac), Some(0));
        assert_eq!(p.header_offset(HeaderKind::Network), Some(14));
        assert_eq!(p.header_offset(HeaderKind::Transport), None);
    }
}
