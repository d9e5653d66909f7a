//! Trust-boundary enforcement and construction validation.

use mesh_router::{
    ChannelHub, ChannelNodeConfig, CommandPattern, CommandRouter, ConstructionError,
    MessageRouter, NodeTransportConfig,
};
use mesh_types::{ErrorKind, NodeId, Origin};
use serde_json::json;

use crate::support::{args, build_mesh, mesh_parts, success_handler};

/// a -> b -> c -> d with the b -> c edge insecure.
fn insecure_middle() -> crate::support::Mesh {
    build_mesh(&[("a", "b", true), ("b", "c", false), ("c", "d", true)])
}

#[tokio::test]
async fn test_insecure_node_cannot_relay() {
    let mesh = insecure_middle();
    // A handler exists at d, so a refusal cannot be mistaken for noHandler.
    mesh.router("d")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            success_handler("yup"),
        )
        .unwrap();

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("d"), "hello", args(json!({ "hello": "world" })))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(&ErrorKind::RoutingRefused));
    let message = error.blob().unwrap().message.clone().unwrap();
    assert!(message.contains("insecure node b"));
    assert!(message.contains("not forward them"));
}

#[tokio::test]
async fn test_insecure_node_can_terminate() {
    // Same insecure b -> c edge, but c is the destination: terminating is
    // allowed.
    let mesh = insecure_middle();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            success_handler("landed"),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("landed"));
}

#[tokio::test]
async fn test_insecure_node_can_originate() {
    // b itself is insecure toward c, but it may originate its own traffic.
    let mesh = insecure_middle();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("b")],
            CommandPattern::named("hello"),
            success_handler("welcome"),
        )
        .unwrap();

    let response = mesh
        .router("b")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("welcome"));
}

#[test]
fn test_secure_edge_with_untrusted_origin_fails_construction() {
    // b's origin is left out of the trusted set while a <-> b is secure.
    let (node_configs, topology, _hub) = mesh_parts(&[("a", "b", true)], &["a"]);

    let error = MessageRouter::new(&node_configs, &topology, "a").unwrap_err();
    match error {
        ConstructionError::InsecureOrigin { node, origin, .. } => {
            assert_eq!(node, NodeId::from("b"));
            assert_eq!(origin, Origin::from("app://b"));
        }
        other => panic!("expected InsecureOrigin, got {other:?}"),
    }

    // The receiving side refuses construction just the same.
    let error = MessageRouter::new(&node_configs, &topology, "b").unwrap_err();
    assert!(matches!(error, ConstructionError::InsecureOrigin { .. }));
}

#[test]
fn test_unknown_self_node_fails_construction() {
    let (node_configs, topology, _hub) = mesh_parts(&[("a", "b", true)], &["a", "b"]);
    let error = MessageRouter::new(&node_configs, &topology, "mistyped").unwrap_err();
    assert!(matches!(error, ConstructionError::UnknownSelfNode { .. }));
    assert!(error.to_string().contains("mistyped"));
}

#[test]
fn test_missing_adjacent_config_fails_construction() {
    let (mut node_configs, topology, _hub) = mesh_parts(&[("a", "b", true)], &["a", "b"]);
    node_configs.remove(&NodeId::from("b"));

    let error = MessageRouter::new(&node_configs, &topology, "a").unwrap_err();
    match error {
        ConstructionError::MissingAdjacentConfig { node, .. } => {
            assert_eq!(node, NodeId::from("b"));
        }
        other => panic!("expected MissingAdjacentConfig, got {other:?}"),
    }
}

#[test]
fn test_missing_strategy_variant_fails_construction() {
    let (mut node_configs, topology, _hub) = mesh_parts(&[("a", "b", true)], &["a", "b"]);
    // b exposes only a channel config, but the edge runs on direct.
    let channel_hub = ChannelHub::new();
    node_configs.insert(
        NodeId::from("b"),
        vec![NodeTransportConfig::Channel(ChannelNodeConfig::new(
            "app://b",
            channel_hub,
        ))],
    );

    let error = MessageRouter::new(&node_configs, &topology, "a").unwrap_err();
    match error {
        ConstructionError::MissingStrategyConfig { node, .. } => {
            assert_eq!(node, NodeId::from("b"));
        }
        other => panic!("expected MissingStrategyConfig, got {other:?}"),
    }
}

#[test]
fn test_isolated_node_fails_construction() {
    let (mut node_configs, topology, hub) = mesh_parts(&[("a", "b", true)], &["a", "b"]);
    node_configs.insert(
        NodeId::from("lonely"),
        vec![NodeTransportConfig::Direct(
            mesh_router::DirectNodeConfig::new("app://lonely", hub),
        )],
    );

    let error = MessageRouter::new(&node_configs, &topology, "lonely").unwrap_err();
    assert!(matches!(error, ConstructionError::IsolatedNode { .. }));
    assert!(error.to_string().contains("did you mistype"));
}
