//! A minimal standard element library: enough to build and run the
//! end-to-end router scenarios (spec.md §8) and exercise every core and
//! scheduling module from real element code rather than mocks alone.

pub mod counter;
pub mod discard;
pub mod null;
pub mod queue;
pub mod shaper;
pub mod source;

pub use counter::Counter;
pub use discard::Discard;
pub use null::Null;
pub use queue::Queue;
pub use shaper::Shaper;
pub use source::Source;
