//! Router construction inputs: node transport configs and the static
//! topology.
//!
//! Each transport strategy names the config variant it requires at each
//! endpoint through a [`TransportDescriptor`]; matching is an explicit tag
//! comparison, never a runtime type check. Beyond that tag and the node's
//! [`Origin`], the router treats configs as opaque.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use mesh_types::{NodeId, Origin};

use crate::adapters::{ChannelNodeConfig, DirectNodeConfig};
use crate::ports::TransportStrategy;

/// Which transport a strategy or config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDescriptor {
    /// Shared-mailbox wire with passer-state correlation.
    Channel,
    /// Straight in-process dispatch with an explicit reply channel.
    Direct,
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => f.write_str("channel"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

/// One node's config for one transport, as a tagged variant.
#[derive(Clone)]
pub enum NodeTransportConfig {
    Channel(ChannelNodeConfig),
    Direct(DirectNodeConfig),
}

impl NodeTransportConfig {
    /// The transport this config belongs to.
    #[must_use]
    pub fn descriptor(&self) -> TransportDescriptor {
        match self {
            Self::Channel(_) => TransportDescriptor::Channel,
            Self::Direct(_) => TransportDescriptor::Direct,
        }
    }

    /// The identity credential this node exposes.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        match self {
            Self::Channel(config) => config.origin(),
            Self::Direct(config) => config.origin(),
        }
    }

    #[must_use]
    pub fn as_channel(&self) -> Option<&ChannelNodeConfig> {
        match self {
            Self::Channel(config) => Some(config),
            Self::Direct(_) => None,
        }
    }

    #[must_use]
    pub fn as_direct(&self) -> Option<&DirectNodeConfig> {
        match self {
            Self::Direct(config) => Some(config),
            Self::Channel(_) => None,
        }
    }
}

impl fmt::Debug for NodeTransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTransportConfig")
            .field("descriptor", &self.descriptor())
            .field("origin", self.origin())
            .finish()
    }
}

/// Mapping node id -> the configs that node exposes, one per transport it
/// participates in.
pub type NodeConfigs = HashMap<NodeId, Vec<NodeTransportConfig>>;

/// Directed edge configuration between an ordered pair of nodes.
#[derive(Clone)]
pub struct EdgeConfig {
    /// The transport that moves messages along this edge.
    pub strategy: Arc<dyn TransportStrategy>,
    /// Whether both endpoints' origins must be whitelisted. An edge that is
    /// not secure restricts the far node to originating or terminating
    /// traffic, never relaying.
    pub secure: bool,
    /// Whether outbound sends wait for the peer's readiness signal.
    pub wait_for_ready: bool,
}

impl EdgeConfig {
    pub fn new(strategy: Arc<dyn TransportStrategy>, secure: bool) -> Self {
        Self {
            strategy,
            secure,
            wait_for_ready: false,
        }
    }

    /// Gate outbound sends on the peer's `system:ready` signal.
    #[must_use]
    pub fn with_wait_for_ready(mut self) -> Self {
        self.wait_for_ready = true;
        self
    }
}

impl fmt::Debug for EdgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConfig")
            .field("strategy", &self.strategy.descriptor())
            .field("secure", &self.secure)
            .field("wait_for_ready", &self.wait_for_ready)
            .finish()
    }
}

/// The directed edge graph, ordered so traversal (and therefore routing
/// tie-breaks) is deterministic.
pub type EdgeMap = BTreeMap<NodeId, BTreeMap<NodeId, EdgeConfig>>;

/// The full static mesh: trusted origins plus the edge graph. Immutable for
/// the lifetime of every router built from it.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Origins allowed on secure edges.
    pub secure_origins: HashSet<Origin>,
    /// Directed edges, outer key is the sending node.
    pub edges: EdgeMap,
}

impl Topology {
    /// A topology trusting the given origins, with no edges yet.
    pub fn new<I, O>(secure_origins: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Origin>,
    {
        Self {
            secure_origins: secure_origins.into_iter().map(Into::into).collect(),
            edges: EdgeMap::new(),
        }
    }

    /// Add a directed edge.
    #[must_use]
    pub fn with_edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>, edge: EdgeConfig) -> Self {
        self.edges.entry(from.into()).or_default().insert(to.into(), edge);
        self
    }

    /// Every node mentioned by any edge, in id order.
    #[must_use]
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut nodes: HashSet<&NodeId> = HashSet::new();
        for (from, targets) in &self.edges {
            nodes.insert(from);
            nodes.extend(targets.keys());
        }
        let mut nodes: Vec<NodeId> = nodes.into_iter().cloned().collect();
        nodes.sort();
        nodes
    }
}
