//! Delivery-timing decorators.
//!
//! Both fronts wrap the same interface they decorate (interface
//! composition, never subclassing), so arbitrary combinations can be
//! layered:
//! - [`BufferedFront`] wraps a router and holds unmatched inbound commands
//!   from selected origins until a real handler registers.
//! - [`ReadyGateFront`] wraps one outbound sender and holds its traffic
//!   until the peer announces readiness.

pub mod buffered;
pub mod ready_gate;

pub use buffered::BufferedFront;
pub use ready_gate::{ReadyGateFront, SYSTEM_READY};
