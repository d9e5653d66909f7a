//! Direct in-process transport.
//!
//! The simplest transport that satisfies the port contract: a shared
//! [`DirectHub`] maps node ids to registered inbound listeners, and a send
//! invokes the matching listener with an explicit one-shot reply slot. No
//! correlation state, no timeout — silence only happens when the reply slot
//! is dropped, which is itself converted into a synthesized error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use mesh_types::{ErrorBlob, ErrorKind, Message, NodeId, Origin};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::TransportDescriptor;
use crate::ports::{
    refusal_response, LinkContext, MessageReceiver, MessageSender, ResponseFuture,
    TransportStrategy,
};
use crate::domain::ConstructionError;

/// The reply slot for one delivery; the first matching listener takes it.
type SharedReply = Arc<Mutex<Option<oneshot::Sender<Message>>>>;

type InboundListener = Arc<dyn Fn(&Message, &SharedReply) + Send + Sync>;

/// Shared delivery fabric for every direct edge in one process.
#[derive(Default)]
pub struct DirectHub {
    listeners: RwLock<HashMap<NodeId, Vec<(u64, InboundListener)>>>,
    next_listener: AtomicU64,
    deliveries: AtomicU64,
}

impl DirectHub {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total messages handed to listeners, for tests and stats.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    fn attach(&self, node: &NodeId, listener: InboundListener) -> u64 {
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

    /// Deliver to every listener registered for `to`. Returns whether any
    /// listener existed at all.
    fn deliver(&self, to: &NodeId, message: &Message, reply: &SharedReply) -> bool {
        let snapshot: Vec<InboundListener> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            match listeners.get(to) {
                Some(for_node) if !for_node.is_empty() => {
                    for_node.iter().map(|(_, l)| l.clone()).collect()
                }
                _ => return false,
            }
        };
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        for listener in snapshot {
            listener(message, reply);
        }
        true
    }
}

/// One node's config for the direct transport.
#[derive(Clone)]
pub struct DirectNodeConfig {
    origin: Origin,
    hub: Arc<DirectHub>,
}

impl DirectNodeConfig {
    pub fn new(origin: impl Into<Origin>, hub: Arc<DirectHub>) -> Self {
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
    pub fn hub(&self) -> &Arc<DirectHub> {
        &self.hub
    }
}

struct DirectSender {
    node: NodeId,
    peer: NodeId,
    hub: Arc<DirectHub>,
}

impl MessageSender for DirectSender {
    fn send_message(&self, message: Message) -> ResponseFuture {
        let confirm = message.opts.confirm_receipt;
        let (tx, rx) = oneshot::channel();
        let reply: SharedReply = Arc::new(Mutex::new(Some(tx)));

        let delivered = self.hub.deliver(&self.peer, &message, &reply);

        if !confirm {
            let receipt = message.synthesize_receipt();
            return Box::pin(async move { receipt });
        }
        if !delivered {
            debug!(node = %self.node, peer = %self.peer, "no listener registered for peer");
            let failed = message.synthesize_error(ErrorBlob::for_message(
                &message,
                ErrorKind::DeliveryFailed,
                format!("no listener registered for {}", self.peer),
            ));
            return Box::pin(async move { failed });
        }

        Box::pin(async move {
            rx.await.unwrap_or_else(|_| {
                message.synthesize_error(ErrorBlob::for_message(
                    &message,
                    ErrorKind::DeliveryFailed,
                    "the reply slot was dropped without a response",
                ))
            })
        })
    }

    fn register_listener(&self) {
        // Replies come back over the per-send slot; nothing to activate.
    }

    fn unregister_listener(&self) {}
}

struct DirectReceiver {
    node: NodeId,
    peer: NodeId,
    hub: Arc<DirectHub>,
    router: crate::service::RouterHandle,
    listener: Mutex<Option<u64>>,
}

impl MessageReceiver for DirectReceiver {
    fn register_listener(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let node = self.node.clone();
        let peer = self.peer.clone();
        let router = self.router.clone();
        let listener: InboundListener = Arc::new(move |message, reply| {
            if message.local_routing.to != node || message.local_routing.from != peer {
                debug!(from = %peer, to = %node, "skipping delivery: different adjacent pair");
                return;
            }
            // First matching listener claims the reply slot.
            let Some(tx) = reply.lock().unwrap_or_else(|e| e.into_inner()).take() else {
                return;
            };
            let router = router.clone();
            let message = message.clone();
            tokio::spawn(async move {
                let response = match router.dispatch(message.clone()).await {
                    Ok(response) => response,
                    Err(refusal) => refusal_response(message, &refusal),
                };
                let _ = tx.send(response);
            });
        });

        *slot = Some(self.hub.attach(&self.node, listener));
    }

    fn unregister_listener(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = slot.take() {
            self.hub.detach(&self.node, id);
        }
    }
}

/// Strategy descriptor for the direct transport.
pub struct DirectStrategy;

impl TransportStrategy for DirectStrategy {
    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::Direct
    }

    fn new_sender(&self, link: LinkContext) -> Result<Arc<dyn MessageSender>, ConstructionError> {
        let config = link
            .sender_config
            .as_direct()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.sender.clone(),
                strategy: TransportDescriptor::Direct,
            })?;
        Ok(Arc::new(DirectSender {
            node: link.sender,
            peer: link.receiver,
            hub: config.hub().clone(),
        }))
    }

    fn new_receiver(&self, link: LinkContext) -> Result<Arc<dyn MessageReceiver>, ConstructionError> {
        let config = link
            .receiver_config
            .as_direct()
            .ok_or(ConstructionError::ConfigRejected {
                node: link.receiver.clone(),
                strategy: TransportDescriptor::Direct,
            })?;
        Ok(Arc::new(DirectReceiver {
            node: link.receiver,
            peer: link.sender,
            hub: config.hub().clone(),
            router: link.router,
            listener: Mutex::new(None),
        }))
    }
}
