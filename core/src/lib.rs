//! Element/port/connection graph and router bring-up (spec.md §3, §4.B–§4.C).

pub mod connection;
pub mod element;
pub mod error;
pub mod flow;
pub mod port;
pub mod router;

pub use connection::Connection;
pub use element::{CleanupStage, Element, HandlerRegistrar};
pub use error::{Diagnostic, ErrorSink, Landmark, RouterError, Severity, VecErrorSink};
pub use port::{Flow, PortCount, PortSpec, Processing};
pub use router::{ElementSpec, Router, RouterState, RouterView};
