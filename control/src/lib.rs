//! ControlSocket: the text-based remote-control protocol for inspecting and
//! driving a running router (spec.md §3 "ControlSocket", §4.I, §4.J).

pub mod handler;
pub mod hvalue;
pub mod namespace;
pub mod protocol;
pub mod socket;

pub use handler::{HandlerFlags, HandlerInfo, HandlerTable};
pub use namespace::{decode_inode, encode_inode, DirEntry, Entry, IndexedNamespace, InodeKind};
pub use protocol::{banner, parse_command, Code, Command};
pub use socket::ControlSocket;
