//! # Driven Ports (Transport SPI)
//!
//! These are the interfaces a transport implementation must satisfy for one
//! directed adjacency. The router consumes a [`MessageSender`] per outgoing
//! edge and a [`MessageReceiver`] per incoming edge; a
//! [`TransportStrategy`] builds both from the matched endpoint configs.
//!
//! # Timing Contract
//!
//! [`MessageSender::send_message`] must put the message on the wire
//! *synchronously at the call* and return a future that settles exactly once
//! with the response — or with a synthesized error message on transport
//! failure. Dispatch-before-suspend is what makes queue flushes (ready gate,
//! buffered replay) preserve arrival order regardless of task scheduling.

use futures::future::BoxFuture;
use mesh_types::{ErrorBlob, Message, NodeId};
use serde_json::Value;
use tracing::debug;

use crate::config::{NodeTransportConfig, TransportDescriptor};
use crate::domain::{ConstructionError, DispatchError};
use crate::service::RouterHandle;

/// The response leg of one send: settles exactly once.
pub type ResponseFuture = BoxFuture<'static, Message>;

/// Outbound half of one directed adjacency.
pub trait MessageSender: Send + Sync {
    /// Dispatch `message` toward the adjacent node. The dispatch itself
    /// happens before this returns; the future resolves with the response
    /// (or a synthesized error message).
    ///
    /// When the message opted out of receipt confirmation, the future
    /// settles immediately with a synthesized receipt.
    fn send_message(&self, message: Message) -> ResponseFuture;

    /// Activate whatever inbound channel this sender uses for responses.
    fn register_listener(&self);

    /// Deactivate it again. Idempotent per call.
    fn unregister_listener(&self);
}

/// Inbound half of one directed adjacency.
pub trait MessageReceiver: Send + Sync {
    /// Start listening for inbound payloads. While active, every payload is
    /// validated (shape and adjacent pair) before reaching the router's
    /// dispatch entry point; anything else is silently dropped.
    fn register_listener(&self);

    /// Stop listening. Idempotent per call.
    fn unregister_listener(&self);
}

/// Everything a strategy needs to build one half of an adjacency: the edge's
/// endpoint names, their matched configs, and a handle back to the hosting
/// router for inbound dispatch.
#[derive(Clone)]
pub struct LinkContext {
    /// The sending endpoint of the edge.
    pub sender: NodeId,
    /// The sending endpoint's config, matched by descriptor.
    pub sender_config: NodeTransportConfig,
    /// The receiving endpoint of the edge.
    pub receiver: NodeId,
    /// The receiving endpoint's config, matched by descriptor.
    pub receiver_config: NodeTransportConfig,
    /// The router this half is attached to.
    pub router: RouterHandle,
}

/// Factory for one transport: builds the sender and receiver halves of an
/// adjacency from matched endpoint configs.
pub trait TransportStrategy: Send + Sync {
    /// The config variant this strategy requires at each endpoint.
    fn descriptor(&self) -> TransportDescriptor;

    /// Build the outbound half. `link.sender` is the hosting router's node.
    fn new_sender(&self, link: LinkContext) -> Result<std::sync::Arc<dyn MessageSender>, ConstructionError>;

    /// Build the inbound half. `link.receiver` is the hosting router's node.
    fn new_receiver(&self, link: LinkContext) -> Result<std::sync::Arc<dyn MessageReceiver>, ConstructionError>;
}

/// Validate a raw inbound payload for one adjacency.
///
/// Returns the decoded message only when the payload has message shape and
/// addresses exactly the expected adjacent pair. Everything else is dropped
/// with a debug event, not an error: other traffic may legitimately share
/// the same physical channel.
#[must_use]
pub fn validate_inbound(payload: &Value, expected_from: &NodeId, expected_to: &NodeId) -> Option<Message> {
    let Some(message) = Message::from_wire(payload.clone()) else {
        debug!(from = %expected_from, to = %expected_to, "skipping payload: invalid message format");
        return None;
    };
    if &message.local_routing.to != expected_to {
        debug!(from = %expected_from, to = %expected_to, "skipping payload: different recipient");
        return None;
    }
    if &message.local_routing.from != expected_from {
        debug!(from = %expected_from, to = %expected_to, "skipping payload: different sender");
        return None;
    }
    Some(message)
}

/// Convert a refused inbound dispatch into the synthesized error response a
/// receiver sends back over its reply channel.
#[must_use]
pub fn refusal_response(message: Message, refusal: &DispatchError) -> Message {
    let blob = ErrorBlob::for_message(&message, refusal.blob_kind(), refusal.to_string());
    message.into_error_response(blob)
}
