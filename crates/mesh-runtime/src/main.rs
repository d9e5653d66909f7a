//! # Mesh Runtime
//!
//! Demonstration runtime for the routing mesh: loads a topology from a TOML
//! file, builds one router per configured node over the channel transport,
//! releases any ready-gated edges, and drives a `system:ping` round to every
//! reachable destination.
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (filtered by `RUST_LOG`)
//! 2. Load and validate the mesh config
//! 3. Construct one router per node over a shared channel hub
//! 4. Register listeners and the demo ping handlers
//! 5. Fire `system:ready` for every wait-for-ready edge
//! 6. Ping every reachable destination from the first node

mod config;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mesh_router::{handler_fn, CommandPattern, CommandRouter, MessageRouter, SYSTEM_READY};
use mesh_types::{Blob, NodeId};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::MeshConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the tracing subscriber")?;

    let path = std::env::args().nth(1).unwrap_or_else(|| "mesh.toml".into());
    info!("Loading mesh config from {path}");
    let config = MeshConfig::load(Path::new(&path))?;

    let hub = mesh_router::ChannelHub::new();
    let (node_configs, topology) = config.build(&hub)?;

    // One router per configured node, all in this process for the demo.
    let mut routers: BTreeMap<NodeId, Arc<MessageRouter>> = BTreeMap::new();
    for node in node_configs.keys() {
        let router = MessageRouter::new(&node_configs, &topology, node.clone())
            .with_context(|| format!("failed to construct the router for {node}"))?;
        router.register_listeners()?;
        routers.insert(node.clone(), router);
    }
    info!(nodes = routers.len(), "mesh constructed");

    // Every node answers system:ping from every other node.
    for (node, router) in &routers {
        let others: Vec<NodeId> = routers.keys().filter(|id| *id != node).cloned().collect();
        if others.is_empty() {
            continue;
        }
        let id = node.clone();
        router.add_command_handler(
            &others,
            CommandPattern::named("system:ping"),
            handler_fn(move |args, _command, origin| {
                let id = id.clone();
                async move {
                    debug!(node = %id, origin = %origin, "answering ping");
                    let mut response = Blob::new();
                    response.insert("pong".into(), json!(id.as_str()));
                    response.insert("echo".into(), Value::Object(args));
                    Ok(Some(response))
                }
            }),
        )?;
    }

    // Release the ready gates: the gated peer announces itself.
    for (from, targets) in &topology.edges {
        for (to, edge) in targets {
            if !edge.wait_for_ready {
                continue;
            }
            let Some(peer) = routers.get(to) else { continue };
            info!(gated = %from, peer = %to, "signalling readiness");
            peer.send_command(from, SYSTEM_READY, Blob::new())
                .await
                .with_context(|| format!("{to} failed to signal readiness to {from}"))?;
        }
    }

    // Drive a ping from the first node to everything it can reach.
    if let Some((first, router)) = routers.iter().next() {
        for (destination, via) in router.routes().iter() {
            let mut args = Blob::new();
            args.insert("from".into(), json!(first.as_str()));
            let response = router
                .send_command(destination, "system:ping", args)
                .await
                .with_context(|| format!("ping from {first} to {destination} failed"))?;
            info!(from = %first, to = %destination, via = %via, %response, "ping answered");
        }
    }

    for router in routers.values() {
        router.unregister_listeners();
    }
    info!("mesh demo complete");
    Ok(())
}
