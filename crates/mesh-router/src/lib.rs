//! # Mesh Router - Node-to-Node Message Routing
//!
//! The transport-agnostic routing and dispatch engine of the mesh: each
//! process hosts one [`MessageRouter`] ("self") that knows a static topology
//! of peers, forwards typed request/response messages across multiple hops,
//! enforces an origin-based trust boundary, and dispatches terminal messages
//! to registered command handlers.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - **Domain Layer:** pure routing logic (first-hop resolution, the command
//!   handler registry, error taxonomy) with no I/O
//! - **Ports Layer:** the driving [`CommandRouter`] API and the driven
//!   transport contracts ([`MessageSender`], [`MessageReceiver`],
//!   [`TransportStrategy`])
//! - **Service Layer:** [`MessageRouter`], wiring domain to ports
//! - **Fronts:** delivery-timing decorators composed over the same
//!   interfaces they decorate ([`BufferedFront`], [`ReadyGateFront`])
//! - **Adapters:** the in-process transports shipped with the engine
//!   (channel and direct)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mesh_router::{
//!     CommandPattern, CommandRouter, DirectHub, DirectStrategy, EdgeConfig,
//!     MessageRouter, NodeConfigs, Topology, handler_fn,
//! };
//!
//! let hub = DirectHub::new();
//! let topology = Topology::new(["app://ui", "app://core"])
//!     .with_edge("ui", "core", EdgeConfig::new(Arc::new(DirectStrategy), true));
//! // ... one router per node, then:
//! // core.add_command_handler(&["ui".into()], CommandPattern::named("ping"), handler_fn(...))
//! // ui.send_command(&"core".into(), "ping", args).await
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// =============================================================================
// FRONTS (delivery-timing decorators)
// =============================================================================

pub mod fronts;

// =============================================================================
// ADAPTERS (in-process transports)
// =============================================================================

pub mod adapters;

// =============================================================================
// RE-EXPORTS
// =============================================================================

// Configuration
pub use config::{EdgeConfig, EdgeMap, NodeConfigs, NodeTransportConfig, Topology, TransportDescriptor};

// Domain
pub use domain::{
    handler_fn, CommandError, CommandHandler, CommandHandlerRegistry, CommandPattern,
    ConstructionError, DispatchError, HandlerFault, HandlerLookup, HandlerResult, HandlerToken,
    ListenerError, RegistryError, RoutingTable,
};

// Ports
pub use ports::{CommandRouter, LinkContext, MessageReceiver, MessageSender, TransportStrategy};

// Service
pub use service::{HandlerFaultPolicy, MessageRouter, RouterHandle};

// Fronts
pub use fronts::{BufferedFront, ReadyGateFront, SYSTEM_READY};

// Adapters
pub use adapters::{
    ChannelHub, ChannelNodeConfig, ChannelStrategy, DirectHub, DirectNodeConfig, DirectStrategy,
};
