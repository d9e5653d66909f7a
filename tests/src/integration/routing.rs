//! Multi-hop command/response flows over the secure chain a -> b -> c.

use mesh_router::{handler_fn, CommandError, CommandPattern, CommandRouter, HandlerFault};
use mesh_types::{ErrorKind, NodeId};
use serde_json::{json, Value};

use crate::support::{
    args, basic_chain, blob_failure_handler, build_mesh, success_handler,
    unexpected_failure_handler,
};

#[tokio::test]
async fn test_basic_message_passing() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            success_handler("hello from C"),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({ "hello": "world" })))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("hello from C"));
}

#[tokio::test]
async fn test_basic_error() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            blob_failure_handler("iDontLikeYou", "You smell"),
        )
        .unwrap();

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({ "hello": "world" })))
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "[a->c] {hello} iDontLikeYou");
    match &error {
        CommandError::Remote { command, blob, .. } => {
            assert_eq!(command, "hello");
            assert_eq!(blob.message.as_deref(), Some("You smell"));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_destination_fails_before_any_transport_call() {
    let mesh = build_mesh(&[("a", "b", true)]);

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("zz"), "hello", args(json!({})))
        .await
        .unwrap_err();

    assert!(matches!(error, CommandError::NoRoute { .. }));
    assert_eq!(error.to_string(), "no path to reach zz from a");
    assert_eq!(mesh.hub.deliveries(), 0);
}

#[tokio::test]
async fn test_adjacent_send_without_intermediate() {
    let mesh = build_mesh(&[("a", "b", true)]);
    mesh.router("b")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            success_handler("hi"),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("b"), "hello", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["success"], json!("hi"));
}

#[tokio::test]
async fn test_void_handler_resolves_null() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("fire"),
            handler_fn(|_args, _command, _origin| async move { Ok(None) }),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "fire", args(json!({})))
        .await
        .unwrap();
    // A settled response always carries a value; void handlers yield null.
    assert_eq!(response, Value::Null);
}

#[tokio::test]
async fn test_no_handler_errors_are_distinct() {
    let mesh = basic_chain();

    // Nothing registered for origin a at all.
    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::NoHandler));
    let blob = error.blob().unwrap();
    assert_eq!(
        blob.message.as_deref(),
        Some("no handlers found for messages from a")
    );

    // Origin known, but a different command registered.
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("other"),
            success_handler("other"),
        )
        .unwrap();
    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::NoHandler));
    let blob = error.blob().unwrap();
    assert_eq!(
        blob.message.as_deref(),
        Some("no handler found for command hello from a")
    );
}

#[tokio::test]
async fn test_wildcard_handler_catches_unnamed_commands() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::Wildcard,
            handler_fn(|_args, command, _origin| async move {
                Ok(Some(crate::support::args(json!({ "caught": command }))))
            }),
        )
        .unwrap();

    let response = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "anything:goes", args(json!({})))
        .await
        .unwrap();
    assert_eq!(response["caught"], json!("anything:goes"));
}

#[tokio::test]
async fn test_handler_registration_rules() {
    let mesh = basic_chain();
    let c = mesh.router("c");
    let a = [NodeId::from("a")];

    let token = c
        .add_command_handler(&a, CommandPattern::named("hello"), success_handler("one"))
        .unwrap();

    // Only one handler per origin/command.
    assert!(c
        .add_command_handler(&a, CommandPattern::named("hello"), success_handler("two"))
        .is_err());

    // Removing something never registered fails.
    assert!(c
        .remove_command_handler(&a, CommandPattern::named("nothing"), token)
        .is_err());

    // Removing with a token from a different registration fails.
    let other = c
        .add_command_handler(&a, CommandPattern::named("other"), success_handler("other"))
        .unwrap();
    assert!(c
        .remove_command_handler(&a, CommandPattern::named("hello"), other)
        .is_err());

    // The matching token frees the pair for re-registration.
    c.remove_command_handler(&a, CommandPattern::named("hello"), token)
        .unwrap();
    c.add_command_handler(&a, CommandPattern::named("hello"), success_handler("three"))
        .unwrap();
}

#[tokio::test]
async fn test_unexpected_fault_becomes_generic_handler_error() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            unexpected_failure_handler("database exploded: password was hunter2"),
        )
        .unwrap();

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), Some(&ErrorKind::HandlerError));
    let blob = error.blob().unwrap();
    assert_eq!(
        blob.message.as_deref(),
        Some("an unexpected error was thrown during handling")
    );
    // The fault detail stays on the handling node; nothing internal crosses
    // the trust boundary.
    assert!(blob.details.is_empty());
    assert!(!error.to_string().contains("hunter2"));
}

#[tokio::test]
async fn test_empty_fault_becomes_unknown_error() {
    let mesh = basic_chain();
    mesh.router("c")
        .add_command_handler(
            &[NodeId::from("a")],
            CommandPattern::named("hello"),
            handler_fn(|_args, _command, _origin| async move { Err(HandlerFault::Empty) }),
        )
        .unwrap();

    let error = mesh
        .router("a")
        .send_command(&NodeId::from("c"), "hello", args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::UnknownError));
    assert_eq!(
        error.blob().unwrap().message.as_deref(),
        Some("the handler rejected without a message")
    );
}
