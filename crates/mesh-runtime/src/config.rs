//! Mesh topology loading from TOML.
//!
//! # Config File Format
//!
//! ```toml
//! [topology]
//! secure-origins = ["app://ui", "app://core"]
//!
//! [[edges]]
//! from = "ui"
//! to = "core"
//! strategy = "channel"
//! secure = true
//!
//! [nodes.ui]
//! origin = "app://ui"
//!
//! [nodes.core]
//! origin = "app://core"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use mesh_router::{
    ChannelHub, ChannelNodeConfig, ChannelStrategy, EdgeConfig, NodeConfigs, NodeTransportConfig,
    Topology, TransportStrategy,
};
use mesh_types::NodeId;
use serde::Deserialize;

/// Root of the config file.
#[derive(Debug, Deserialize)]
pub struct MeshConfig {
    pub topology: TopologySection,
    #[serde(default)]
    pub edges: Vec<EdgeRow>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSection>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TopologySection {
    #[serde(default, rename = "secure-origins")]
    pub secure_origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EdgeRow {
    pub from: String,
    pub to: String,
    pub strategy: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "wait-for-ready")]
    pub wait_for_ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct NodeSection {
    pub origin: String,
}

impl MeshConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Build router construction inputs over one shared channel hub.
    pub fn build(&self, hub: &Arc<ChannelHub>) -> Result<(NodeConfigs, Topology)> {
        let mut topology = Topology::new(self.topology.secure_origins.iter().cloned());

        for edge in &self.edges {
            let strategy: Arc<dyn TransportStrategy> = match edge.strategy.as_str() {
                "channel" => Arc::new(ChannelStrategy),
                other => bail!(
                    "unknown transport strategy `{other}` on edge {} -> {}",
                    edge.from,
                    edge.to
                ),
            };
            let mut config = EdgeConfig::new(strategy, edge.secure);
            if edge.wait_for_ready {
                config = config.with_wait_for_ready();
            }
            topology = topology.with_edge(edge.from.as_str(), edge.to.as_str(), config);
        }

        let mut node_configs = NodeConfigs::new();
        for (id, node) in &self.nodes {
            node_configs.insert(
                NodeId::from(id.as_str()),
                vec![NodeTransportConfig::Channel(ChannelNodeConfig::new(
                    node.origin.as_str(),
                    hub.clone(),
                ))],
            );
        }

        Ok((node_configs, topology))
    }
}
