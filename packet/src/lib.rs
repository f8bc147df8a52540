//! Shared, ref-counted packet buffers (spec.md §3, §4.A).
//!
//! A [`Packet`] wraps a byte buffer with headroom/tailroom, a set of header
//! offsets, a timestamp, and the fixed [`PacketAnno`] annotation block.
//! Packets are logically immutable while shared; [`Packet::uniqueify`]
//! performs copy-on-write to hand back an exclusively-owned packet.

mod anno;
mod packet;
mod storage;
mod timestamp;

pub use anno::{PacketAnno, USER_ANNO_BYTES};
pub use packet::{HeaderKind, Packet};
pub use timestamp::Timestamp;
