//! Backing storage for a packet's byte buffer.
//!
//! A packet either owns a growable `Vec<u8>` or wraps an externally-managed
//! region (a DPDK mbuf, a memory-mapped capture page) together with a
//! destructor callback that must run exactly once when the packet's last
//! reference is dropped, passed the original data pointer.

/// A raw pointer into externally-managed memory. `Send` is sound here
/// because the packet machinery treats the pointed-to region as exclusively
/// owned by whichever `Packet` currently references it; callers that hand a
/// pointer to `Packet::from_external` must uphold that.
pub struct ExternalPtr(pub *mut u8);
unsafe impl Send for ExternalPtr {}
unsafe impl Sync for ExternalPtr {}

pub(crate) enum Storage {
    Owned(Vec<u8>),
    External {
        ptr: ExternalPtr,
        len: usize,
        destructor: Option<Box<dyn FnOnce(*mut u8) + Send>>,
    },
}

/// `Sync` is sound for the same reason `ExternalPtr` is `Send` (see above):
/// the destructor only ever runs, once, from `Storage::drop`'s `&mut self`,
/// which by construction cannot race with any other access.
unsafe impl Sync for Storage {}

impl Storage {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => &v[..],
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.0, *len)
            },
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(v) => &mut v[..],
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.0, *len)
            },
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        match self {
            Storage::Owned(v) => v.capacity(),
            Storage::External { len, .. } => *len,
        }
    }

    /// Grows owned storage to have at least `needed` bytes of capacity,
    /// re-centering the existing `[old_start, old_start+old_len)` window at
    /// `new_start`. External storage cannot be grown; callers must
    /// `uniqueify` onto owned storage first.
    pub(crate) fn grow_owned(
        &mut self,
        needed: usize,
        old_start: usize,
        old_len: usize,
        new_start: usize,
    ) {
        match self {
            Storage::Owned(v) => {
                let mut fresh = vec![0u8; needed];
                fresh[new_start..new_start + old_len]
                    .copy_from_slice(&v[old_start..old_start + old_len]);
                *v = fresh;
            }
            Storage::External { .. } => {
                unreachable!("external storage cannot grow; uniqueify first")
            }
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::External { ptr, destructor, .. } = self {
            if let Some(d) = destructor.take() {
                d(ptr.0);
            }
        }
    }
}
