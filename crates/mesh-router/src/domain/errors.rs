//! Error taxonomy for the router core.
//!
//! Construction, dispatch, registry, and listener failures are local,
//! synchronous, and fatal to the single operation attempting them. Failures
//! that must cross node boundaries travel as [`mesh_types::ErrorBlob`]s
//! inside response messages instead; [`CommandError::Remote`] is how such a
//! blob surfaces to the original caller.

use mesh_types::{ErrorBlob, ErrorKind, NodeId, Origin};
use thiserror::Error;

use crate::config::TransportDescriptor;
use crate::domain::registry::CommandPattern;

/// Failures that abort router construction.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// Self's id is not among the supplied configs.
    #[error("node {node} does not exist in the topology; expecting one of {known:?}")]
    UnknownSelfNode { node: NodeId, known: Vec<NodeId> },

    /// A node adjacent to self has no config entry at all.
    #[error("missing config for {node}; configs are required for every node adjacent to {this}")]
    MissingAdjacentConfig { this: NodeId, node: NodeId },

    /// A node has configs, but none matching the edge's strategy.
    #[error("no {strategy} config found for {node} to satisfy its edge with {peer}")]
    MissingStrategyConfig {
        node: NodeId,
        strategy: TransportDescriptor,
        peer: NodeId,
    },

    /// A secure edge touches an endpoint whose origin is not whitelisted.
    #[error("[{this}] edge {from}->{to} is marked secure but {node} has non-whitelisted origin {origin}")]
    InsecureOrigin {
        this: NodeId,
        from: NodeId,
        to: NodeId,
        node: NodeId,
        origin: Origin,
    },

    /// No edges into or out of self; probably a mistyped node name.
    #[error("no edges into or out of {node}; did you mistype your node name?")]
    IsolatedNode { node: NodeId },

    /// A transport rejected the config variant it was handed.
    #[error("the {strategy} transport rejected the config for {node}")]
    ConfigRejected {
        node: NodeId,
        strategy: TransportDescriptor,
    },

    /// A ready-gated edge could not install its readiness handler.
    #[error("failed to install the readiness handler for {peer}: {source}")]
    ReadySignal {
        peer: NodeId,
        #[source]
        source: RegistryError,
    },
}

/// Failures that refuse one inbound dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An insecure adjacent node tried to relay someone else's traffic.
    /// Insecure nodes may only originate or terminate messages; it is
    /// possible a malicious actor is poking the system.
    #[error("refusing to handle message from insecure node {from}: insecure nodes can only initiate or terminate messages, not forward them")]
    InsecureRelay { node: NodeId, from: NodeId },

    /// No route toward the destination from this hop.
    #[error("no path to reach {destination} from {node}")]
    NoRoute { node: NodeId, destination: NodeId },

    /// The router behind a transport handle has been dropped.
    #[error("the router for {node} has been released")]
    RouterReleased { node: NodeId },
}

impl DispatchError {
    /// The blob kind a transport uses when converting this refusal into a
    /// synthesized error response.
    #[must_use]
    pub fn blob_kind(&self) -> ErrorKind {
        match self {
            Self::InsecureRelay { .. } | Self::NoRoute { .. } => ErrorKind::RoutingRefused,
            Self::RouterReleased { .. } => ErrorKind::DeliveryFailed,
        }
    }
}

/// Failures from handler registration and removal.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("only one handler per origin/command; {origin}/{command} is already registered")]
    DuplicateHandler { origin: NodeId, command: CommandPattern },

    #[error("no handler is registered for {origin}/{command}")]
    UnknownHandler { origin: NodeId, command: CommandPattern },

    #[error("a different handler is registered for {origin}/{command}")]
    TokenMismatch { origin: NodeId, command: CommandPattern },

    /// Wildcards are reserved for the buffering front itself.
    #[error("cannot register a wildcard command handler on top of a buffered front")]
    WildcardReserved,
}

/// Failures from listener lifecycle calls.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("double-registering listeners for {node}")]
    AlreadyRegistered { node: NodeId },
}

/// What `send_command` can fail with at the originating node.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Failed before any transport was invoked.
    #[error("no path to reach {destination} from {node}")]
    NoRoute { node: NodeId, destination: NodeId },

    /// The response carried an error blob; origin, destination, and command
    /// are embedded for diagnostics.
    #[error("[{origin}->{destination}] {{{command}}} {kind}")]
    Remote {
        origin: NodeId,
        destination: NodeId,
        command: String,
        kind: ErrorKind,
        blob: ErrorBlob,
    },
}

impl CommandError {
    /// The error blob delivered in the response, when there is one.
    #[must_use]
    pub fn blob(&self) -> Option<&ErrorBlob> {
        match self {
            Self::Remote { blob, .. } => Some(blob),
            Self::NoRoute { .. } => None,
        }
    }

    /// The blob kind, when the failure came from a response.
    #[must_use]
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(kind),
            Self::NoRoute { .. } => None,
        }
    }
}
