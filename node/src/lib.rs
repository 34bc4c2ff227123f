//! In-memory simulated peer nodes for the drover harness.
//!
//! The harness only ever talks to the [`NodeHandle`] trait; this crate
//! provides `SimNetwork`/`SimNode`, an in-process implementation that
//! routes key/value operations and content blocks between registered
//! peers without opening real sockets. Any other node implementation
//! satisfying `NodeHandle` can be plugged in instead.

pub mod error;
pub mod handle;
pub mod network;
pub mod node;

pub use error::NodeError;
pub use handle::NodeHandle;
pub use network::{NodeSpec, SimNetwork};
pub use node::SimNode;

#[cfg(test)]
mod tests;
