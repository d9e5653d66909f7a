//! Channel transport: a shared-mailbox wire.
//!
//! Serialized payloads are posted to per-node mailboxes on a
//! [`ChannelHub`]; requests and responses travel the same mailbox, so every
//! listener validates shape and adjacent pair and silently drops the rest.
//! Senders correlate responses through `passerState` — a per-sender unique
//! key mapped to a monotonically increasing request id — and convert
//! silence into a `channelTimeout` error response after the configured
//! window (5000 ms unless overridden or disabled per message).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use mesh_types::{ErrorBlob, ErrorKind, Message, NodeId, Origin, DEFAULT_REPLY_TIMEOUT_MS};
use mesh_types::ReplyTimeout;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::config::TransportDescriptor;
use crate::domain::ConstructionError;
use crate::ports::{
    refusal_response, validate_inbound, LinkContext, MessageReceiver, MessageSender,
    ResponseFuture, TransportStrategy,
};
use crate::service::RouterHandle;

type PayloadListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Shared mailbox fabric for every channel edge in one process.
///
/// `post` fans a payload out to every listener attached to the target node,
/// synchronously; listeners decide for themselves what is theirs.
#[derive(Default)]
pub struct ChannelHub {
    listeners: RwLock<HashMap<NodeId, Vec<(u64, PayloadListener)>>>,
    next_listener: AtomicU64,
    posted: AtomicU64,
}

impl ChannelHub {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total payloads posted, for tests and stats.
    #[must_use]
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Put a payload in `to`'s mailbox. Payloads for nodes nobody listens
    /// on are dropped, exactly like any other unclaimed traffic.
    pub fn post(&self, to: &NodeId, payload: Value) {
        self.posted.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<PayloadListener> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners
                .get(to)
                .map(|for_node| for_node.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };
        for listener in snapshot {
            listener(&payload);
        }
    }

    fn attach(&self, node: &NodeId, listener: PayloadListener) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(node.clone())
            .or_default()
            .push((id, listener));
        id
    }

    fn detach(&self, node: &NodeId, id: u64) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if let Some(for_node) = listeners.get_mut(node) {
            for_node.retain(|(listener_id, _)| *listener_id != id);
        }
    }
}

/// One node's config for the channel transport.
#[derive(Clone)]
pub struct ChannelNodeConfig {
    origin: Origin,
    hub: Arc<ChannelHub>,
}

impl ChannelNodeConfig {
    pub fn new(origin: impl Into<Origin>, hub: Arc<ChannelHub>) -> Self {
        Self {
            origin: origin.into(),
            hub,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }
}

struct PendingReply {
    reply: oneshot::Sender<Message>,
    request: Message,
}

struct SenderShared {
    node: NodeId,
    peer: NodeId,
    /// Where outbound payloads go: the peer's side of the wire.
    post_hub: Arc<ChannelHub>,
    /// Where responses come back: our own side of the wire.
    listen_hub: Arc<ChannelHub>,
    /// Unique passer-state key for this sender's correlation ids.
    correlation_key: String,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingReply>>,
    listener: Mutex<Option<u64>>,
}

struct ChannelSender {
    shared: Arc<SenderShared>,
}

/// Pull a raw correlation id out of a payload that failed full validation.
fn raw_correlation_id(payload: &Value, key: &str) -> Option<u64> {
    payload
        .get("globalRouting")?
        .get("passerState")?
        .get(key)?
        .as_u64()
}

impl MessageSender for ChannelSender {
    fn send_message(&self, mut message: Message) -> ResponseFuture {
        let shared = self.shared.clone();
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        message
            .global_routing
            .passer_state
            .insert(shared.correlation_key.clone(), json!(id));

        let confirm = message.opts.confirm_receipt;
        let window = match message.opts.timeout {
            ReplyTimeout::Default => Some(DEFAULT_REPLY_TIMEOUT_MS),
            ReplyTimeout::Disabled => None,
            ReplyTimeout::Millis(ms) => Some(ms),
        };

        let request = message.clone();
        let waiting = if confirm {
            let (reply, waiting) = oneshot::channel();
            shared.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(
                id,
                PendingReply {
                    reply,
                    request: request.clone(),
                },
            );
            Some(waiting)
        } else {
            None
        };

        match serde_json::to_value(&message) {
            Ok(payload) => shared.post_hub.post(&shared.peer, payload),
            Err(_) => {
                shared.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                let failed = request.synthesize_error(ErrorBlob::for_message(
                    &request,
                    ErrorKind::DeliveryFailed,
                    "failed to serialize the message for the wire",
                ));
                return Box::pin(async move { failed });
            }
        }

        let Some(waiting) = waiting else {
            let receipt = request.synthesize_receipt();
            return Box::pin(async move { receipt });
        };

        Box::pin(async move {
            let settled = match window {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), waiting).await {
                    Ok(settled) => settled,
                    Err(_) => {
                        // Could still race a response in; the late reply is
                        // dropped on the floor, same as any post-timeout one.
                        shared.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                        return request.synthesize_error(ErrorBlob::for_message(
                            &request,
                            ErrorKind::ChannelTimeout,
                            format!(
                                "timed out waiting on a response from {}",
                                request.local_routing.to
                            ),
                        ));
                    }
                },
                None => waiting.await,
            };
            settled.unwrap_or_else(|_| {
                request.synthesize_error(ErrorBlob::for_message(
                    &request,
                    ErrorKind::DeliveryFailed,
                    "the reply channel closed without a response",
                ))
            })
        })
    }

    fn register_listener(&self) {
        let mut slot = self.shared.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let shared = self.shared.clone();
        let listener: PayloadListener = Arc::new(move |payload| {
            match validate_inbound(payload, &shared.peer, &shared.node) {
                Some(message) => {
                    // The receiver half may share this mailbox; requests are
                    // its business.
                    if !message.is_response {
                        return;
                    }
                    let Some(id) = message
                        .global_routing
                        .passer_state
                        .get(&shared.correlation_key)
                        .and_then(Value::as_u64)
                    else {
                        return;
                    };
                    // Could have already timed out.
                    let entry = shared.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                    if let Some(entry) = entry {
                        let _ = entry.reply.send(message);
                    }
                }
                None => {
                    // A reply carrying our correlation id but failing
                    // validation settles its request as invalidResponse
                    // instead of leaving it to the timeout. The key is
                    // unique to this sender, so a raw id match is ours.
                    let Some(id) = raw_correlation_id(payload, &shared.correlation_key) else {
                        return;
                    };
                    let entry = shared.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                    if let Some(entry) = entry {
                        let synthesized = entry.request.synthesize_error(ErrorBlob::for_message(
                            &entry.request,
                            ErrorKind::InvalidResponse,
                            "response from the channel was not a valid message",
                        ));
                        let _ = entry.reply.send(synthesized);
                    }
                }
            }
        });
        *slot = Some(self.shared.listen_hub.attach(&self.shared.node, listener));
    }

    fn unregister_listener(&self) {
        let mut slot = self.shared.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = slot.take() {
            self.shared.listen_hub.detach(&self.shared.node, id);
        }
    }
}

struct ReceiverShared {
    node: NodeId,
    peer: NodeId,
    /// Where we listen: our own side of the wire.
    listen_hub: Arc<ChannelHub>,
    /// Where responses go back out: the peer's side of the wire.
    post_hub: Arc<ChannelHub>,
    router: RouterHandle,
    listener: Mutex<Option<u64>>,
}

struct ChannelReceiver {
    shared: Arc<ReceiverShared>,
}

impl MessageReceiver for ChannelReceiver {
    fn register_listener(&self) {
        let mut slot = self.shared.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let shared = self.shared.clone();
        let listener: PayloadListener = Arc::new(move |payload| {
            let Some(message) = validate_inbound(payload, &shared.peer, &shared.node) else {
                return;
            };
            // The sender half may share this mailbox; responses are its
            // business.
            if message.is_response {
                return;
            }

            let shared = shared.clone();
            tokio::spawn(async move {
                let response = match shared.router.dispatch(message.clone()).await {
                    Ok(response) => response,
                    Err(refusal) => refusal_response(message, &refusal),
                };
                match serde_json::to_value(&response) {
                    Ok(payload) => shared.post_hub.post(&shared.peer, payload),
                    Err(_) => debug!(
                        node = %shared.node,
                        peer = %shared.peer,
                        "dropping unserializable response"
                    ),
                }
            });
        });
        *slot = Some(self.shared.listen_hub.attach(&self.shared.node, listener));
    }

    fn unregister_listener(&self) {
        let mut slot = self.shared.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = slot.take() {
            self.shared.listen_hub.detach(&self.shared.node, id);
        }
    }
}

/// Strategy descriptor for the channel transport.
pub struct ChannelStrategy;

impl TransportStrategy for ChannelStrategy {
    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::Channel
    }

    fn new_sender(&self, link: LinkContext) -> Result<Arc<dyn MessageSender>, ConstructionError> {
        let own = link
            .sender_config
            .as_channel()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.sender.clone(),
                strategy: TransportDescriptor::Channel,
            })?;
        let adjacent = link
            .receiver_config
            .as_channel()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.receiver.clone(),
                strategy: TransportDescriptor::Channel,
            })?;
        Ok(Arc::new(ChannelSender {
            shared: Arc::new(SenderShared {
                node: link.sender,
                peer: link.receiver,
                post_hub: adjacent.hub().clone(),
                listen_hub: own.hub().clone(),
                correlation_key: Uuid::new_v4().to_string(),
                next_id: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        }))
    }

    fn new_receiver(&self, link: LinkContext) -> Result<Arc<dyn MessageReceiver>, ConstructionError> {
        let own = link
            .receiver_config
            .as_channel()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.receiver.clone(),
                strategy: TransportDescriptor::Channel,
            })?;
        let adjacent = link
            .sender_config
            .as_channel()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.sender.clone(),
                strategy: TransportDescriptor::Channel,
            })?;
        Ok(Arc::new(ChannelReceiver {
            shared: Arc::new(ReceiverShared {
                node: link.receiver,
                peer: link.sender,
                listen_hub: own.hub().clone(),
                post_hub: adjacent.hub().clone(),
                router: link.router,
                listener: Mutex::new(None),
            }),
        }))
    }
}
