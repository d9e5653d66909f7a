//! Channel-transport wire behavior: shared mailboxes, correlation,
//! timeouts, and silent drops.

use std::collections::BTreeMap;
use std::sync::Arc;

use mesh_router::{
    ChannelHub, ChannelNodeConfig, ChannelStrategy, CommandPattern, CommandRouter, EdgeConfig,
    MessageRouter, NodeConfigs, NodeTransportConfig, Topology,
};
use mesh_types::{CommandOpts, ErrorKind, NodeId, ReplyTimeout};
use serde_json::{json, Value};

use crate::support::{args, origin_of, success_handler};

struct ChannelMesh {
    routers: BTreeMap<NodeId, Arc<MessageRouter>>,
    hub: Arc<ChannelHub>,
}

impl ChannelMesh {
    fn router(&self, id: &str) -> Arc<MessageRouter> {
        self.routers[&NodeId::from(id)].clone()
    }
}

/// Build a channel mesh over one shared hub; every edge secure, every
/// origin trusted, every router listening.
fn channel_mesh(edges: &[(&str, &str)]) -> ChannelMesh {
    let hub = ChannelHub::new();
    let strategy = Arc::new(ChannelStrategy);

    let mut nodes: Vec<&str> = edges.iter().flat_map(|(from, to)| [*from, *to]).collect();
    nodes.sort_unstable();
    nodes.dedup();

    let mut topology = Topology::new(nodes.iter().map(|id| origin_of(id)));
    for (from, to) in edges {
        topology = topology.with_edge(*from, *to, EdgeConfig::new(strategy.clone(), true));
    }

    let node_configs: NodeConfigs = nodes
        .iter()
        .map(|id| {
            (
                NodeId::from(*id),
                vec![NodeTransportConfig::Channel(ChannelNodeConfig::new(
                    origin_of(id),
                    hub.clone(),
                ))],
            )
        })
        .collect();

    let routers = node_configs
        .keys()
        .map(|node| {
            let router = MessageRouter::new(&node_configs, &topology, node.clone()).unwrap();
            router.register_listeners().unwrap();
            (node.clone(), router)
        })
        .collect();
    ChannelMesh { routers, hub }
}

#[tokio::test]
async fn test_channel_roundtrip() {
    let mesh = channel_mesh(&[("a", "b")]);
    mesh.router("b")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("ping"),
            success_handler("pong"),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("b"), "ping", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("pong"));
}

#[tokio::test]
async fn test_channel_multi_hop() {
    let mesh = channel_mesh(&[("a", "b"), ("b", "c")]);
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("ping"),
            success_handler("pong from c"),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "ping", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("pong from c"));
}

#[tokio::test]
async fn test_foreign_traffic_on_the_shared_mailbox_is_ignored() {
    let mesh = channel_mesh(&[("a", "b")]);
    mesh.router("b")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("ping"),
            success_handler("pong"),
        )
        .unwrap();

    // Garbage and unrelated chatter in both mailboxes.
    mesh.hub.post(&NodeId::from("a"), json!("static noise"));
    mesh.hub.post(&NodeId::from("b"), json!({ "unrelated": true }));
    mesh.hub.post(
        &NodeId::from("b"),
        json!({
            "command": "ping",
            "localRouting": { "from": "x", "to": "y" },
            "globalRouting": { "origin": "x", "destination": "y" },
            "args": {},
        }),
    );

    // The mesh shrugs it off and keeps working.
    let response = mesh
        .router("a")
        .send_command(&NodeId::from("b"), "ping", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("pong"));
}

#[tokio::test]
async fn test_unresponsive_peer_times_out() {
    let mesh = channel_mesh(&[("a", "b")]);
    // b never registers listeners, so a's request sits unanswered.
    mesh.router("b").unregister_listeners();

    let opts = CommandOpts {
        timeout: ReplyTimeout::Millis(40),
        ..CommandOpts::default()
    };
    let error = mesh
        .router("a")
        .send_command_with_opts(&NodeId::from("b"), "ping", args(json!({})), opts)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::ChannelTimeout));
}

#[tokio::test]
async fn test_fire_and_forget_settles_immediately() {
    let mesh = channel_mesh(&[("a", "b")]);
    // No handler at b; a fire-and-forget send does not care.

    let opts = CommandOpts {
        confirm_receipt: false,
        ..CommandOpts::default()
    };
    let response = mesh
        .router("a")
        .send_command_with_opts(&NodeId::from("b"), "notify", args(json!({})), opts)
        .await
        .unwrap();
    assert_eq!(response, Value::Null);
}

#[tokio::test]
async fn test_passer_state_stays_out_of_handler_args() {
    let mesh = channel_mesh(&[("a", "b")]);
    mesh.router("b")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("inspect"),
            mesh_router::handler_fn(|invocation_args, _command, _origin| async move {
                // Correlation state rides in the envelope, not in args.
                assert!(invocation_args.get("seq").is_some());
                assert_eq!(invocation_args.len(), 1);
                Ok(None)
            }),
        )
        .unwrap();

    mesh.router("a")
        .send_command(&NodeId::from("b"), "inspect", args(json!({ "seq": 1 })))
        .await
        .unwrap();
}
