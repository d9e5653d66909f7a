//! Adapters Layer - in-process transports shipped with the engine.
//!
//! - [`channel`]: shared-mailbox wire with passer-state correlation and
//!   reply timeouts; requests and responses travel the same channel.
//! - [`direct`]: straight dispatch into the adjacent node's inbound path
//!   with an explicit one-shot reply channel.

pub mod channel;
pub mod direct;

pub use channel::{ChannelHub, ChannelNodeConfig, ChannelStrategy};
pub use direct::{DirectHub, DirectNodeConfig, DirectStrategy};
