//! The delivery-timing decorators, end to end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mesh_router::{
    handler_fn, BufferedFront, CommandHandler, CommandPattern, CommandRouter, DirectHub,
    DirectNodeConfig, DirectStrategy, EdgeConfig, MessageRouter, NodeConfigs,
    NodeTransportConfig, RegistryError, Topology, SYSTEM_READY,
};
use mesh_types::{ErrorKind, NodeId};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

use crate::support::{args, basic_chain, blob_failure_handler, origin_of};

/// Handler recording the `seq` argument of every invocation, in order.
fn recording_handler(seen: Arc<Mutex<Vec<i64>>>) -> CommandHandler {
    handler_fn(move |invocation_args, _command, _origin| {
        let seen = seen.clone();
        async move {
            let seq = invocation_args
                .get("seq")
                .and_then(Value::as_i64)
                .unwrap_or(-1);
            seen.lock().unwrap().push(seq);
            Ok(Some(args(json!({ "handled": seq }))))
        }
    })
}

#[tokio::test]
async fn test_buffered_front_replays_in_arrival_order() {
    let mesh = basic_chain();
    let front = BufferedFront::new(mesh.router("c"), &[NodeId::from("a")]).unwrap();

    let a = mesh.router("a");
    let mut pending = Vec::new();
    for seq in 1..=3 {
        let a = a.clone();
        pending.push(tokio::spawn(async move {
            a.send_command(&NodeId::from("c"), "hello", args(json!({ "seq": seq })))
                .await
        }));
    }

    // Let the commands arrive and park.
    sleep(Duration::from_millis(20)).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    front
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            recording_handler(seen.clone()),
        )
        .unwrap();

    for (expected, handle) in (1..=3).zip(pending) {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response["handled"], json!(expected));
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_buffered_front_replays_failures() {
    let mesh = basic_chain();
    let front = BufferedFront::new(mesh.router("c"), &[NodeId::from("a")]).unwrap();

    let a = mesh.router("a");
    let pending = tokio::spawn(async move {
        a.send_command(&NodeId::from("c"), "hello", args(json!({ "hello": "world" })))
            .await
    });

    sleep(Duration::from_millis(20)).await;
    front
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            blob_failure_handler("iDontLikeYou", "You smell"),
        )
        .unwrap();

    let error = pending.await.unwrap().unwrap_err();
    assert_eq!(error.to_string(), "[a->c] {hello} iDontLikeYou");
    assert_eq!(error.blob().unwrap().message.as_deref(), Some("You smell"));
}

#[tokio::test]
async fn test_buffered_front_ignores_other_origins() {
    let mesh = basic_chain();
    // Buffering is scoped to b; traffic from a falls through unbuffered.
    let _front = BufferedFront::new(mesh.router("c"), &[NodeId::from("b")]).unwrap();

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({ "hello": "world" })))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "[a->c] {hello} noHandler");
}

#[tokio::test]
async fn test_buffered_fronts_coexist_per_origin() {
    let mesh = basic_chain();
    let front_a = BufferedFront::new(mesh.router("c"), &[NodeId::from("a")]).unwrap();
    let front_b = BufferedFront::new(mesh.router("c"), &[NodeId::from("b")]).unwrap();

    let a = mesh.router("a");
    let from_a = tokio::spawn(async move {
        a.send_command(&NodeId::from("c"), "job", args(json!({ "seq": 1 })))
            .await
    });
    let b = mesh.router("b");
    let from_b = tokio::spawn(async move {
        b.send_command(&NodeId::from("c"), "job", args(json!({ "seq": 2 })))
            .await
    });
    sleep(Duration::from_millis(20)).await;

    // Registering a's handler settles a's call only.
    let seen = Arc::new(Mutex::new(Vec::new()));
    front_a
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("job"),
            recording_handler(seen.clone()),
        )
        .unwrap();
    from_a.await.unwrap().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1]);

    // b's call is still parked in the other front.
    let mut from_b = from_b;
    assert!(timeout(Duration::from_millis(50), &mut from_b).await.is_err());

    front_b
        .add_command_handler(
            &[NodeId::from("b")],
            CommandPattern::named("job"),
            recording_handler(seen.clone()),
        )
        .unwrap();
    from_b.await.unwrap().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_buffered_front_rejects_wildcard_registration() {
    let mesh = basic_chain();
    let front = BufferedFront::new(mesh.router("c"), &[NodeId::from("a")]).unwrap();

    let error = front
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::Wildcard,
            blob_failure_handler("nope", "nope"),
        )
        .unwrap_err();
    assert!(matches!(error, RegistryError::WildcardReserved));
}

/// a <-> b with the a -> b edge gated on b's readiness.
fn gated_pair() -> (Arc<MessageRouter>, Arc<MessageRouter>) {
    let hub = DirectHub::new();
    let strategy = Arc::new(DirectStrategy);
    let topology = Topology::new([origin_of("a"), origin_of("b")])
        .with_edge(
            "a",
            "b",
            EdgeConfig::new(strategy.clone(), true).with_wait_for_ready(),
        )
        .with_edge("b", "a", EdgeConfig::new(strategy, true));

    let node_configs: NodeConfigs = ["a", "b"]
        .into_iter()
        .map(|id| {
            (
                NodeId::from(id),
                vec![NodeTransportConfig::Direct(DirectNodeConfig::new(
                    origin_of(id),
                    hub.clone(),
                ))],
            )
        })
        .collect();

    let a = MessageRouter::new(&node_configs, &topology, "a").unwrap();
    a.register_listeners().unwrap();
    let b = MessageRouter::new(&node_configs, &topology, "b").unwrap();
    b.register_listeners().unwrap();
    (a, b)
}

#[tokio::test]
async fn test_ready_gate_queues_until_peer_signals() {
    let (a, b) = gated_pair();

    let seen = Arc::new(Mutex::new(Vec::new()));
    b.add_command_handler(
        &[NodeId::from("a")],
        CommandPattern::named("work"),
        recording_handler(seen.clone()),
    )
    .unwrap();

    let mut pending = Vec::new();
    for seq in 1..=2 {
        let a = a.clone();
        pending.push(tokio::spawn(async move {
            a.send_command(&NodeId::from("b"), "work", args(json!({ "seq": seq })))
                .await
        }));
    }

    // The gate holds everything while b has not announced itself.
    sleep(Duration::from_millis(20)).await;
    assert!(seen.lock().unwrap().is_empty());

    // b announces readiness; the queue flushes in order.
    b.send_command(&NodeId::from("a"), SYSTEM_READY, args(json!({})))
        .await
        .unwrap();

    for handle in pending {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

    // Sends after the transition go straight through.
    a.send_command(&NodeId::from("b"), "work", args(json!({ "seq": 3 })))
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_ready_signal_is_one_shot() {
    let (_a, b) = gated_pair();

    b.send_command(&NodeId::from("a"), SYSTEM_READY, args(json!({})))
        .await
        .unwrap();

    let error = b
        .send_command(&NodeId::from("a"), SYSTEM_READY, args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::AlreadyReady));
    assert_eq!(error.to_string(), "[b->a] {system:ready} alreadyReady");
}
