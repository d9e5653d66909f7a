//! # Mesh Types Crate
//!
//! Wire-level contracts shared by every crate in the mesh-router workspace:
//! node and origin identifiers, the `Message` envelope that crosses every
//! transport, the structured `ErrorBlob` that carries failures across node
//! boundaries as data, and per-command options.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that appears on the wire is
//!   defined here and nowhere else.
//! - **Stable Wire Encoding**: all wire types serialize with camelCase field
//!   names (`localRouting`, `passerState`, `isResponse`, ...), so payloads
//!   survive any byte or text transport unchanged.
//! - **Errors As Data**: an [`ErrorBlob`] is a serializable value, distinct
//!   from a process-level fault; it crosses hops inside a response message.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error_blob;
pub mod message;
pub mod node;

// Re-export main types
pub use error_blob::{ErrorBlob, ErrorKind};
pub use message::{Blob, CommandOpts, GlobalRouting, LocalRouting, Message, ReplyTimeout};
pub use node::{NodeId, Origin};

/// Default reply timeout applied by transports that confirm receipt, in
/// milliseconds.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5000;
