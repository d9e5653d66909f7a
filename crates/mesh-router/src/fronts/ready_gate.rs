//! Ready gating for one outbound edge.
//!
//! Some peers come up later than the nodes talking to them. A
//! [`ReadyGateFront`] wraps the edge's sender and queues every outbound
//! message until the peer sends the internal `system:ready` command once;
//! the queue is then flushed in arrival order. Readiness is a one-time
//! transition: a second signal is rejected with an `alreadyReady` blob.

use std::sync::{Arc, Mutex};

use mesh_types::{ErrorBlob, ErrorKind, Message, NodeId};
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{handler_fn, CommandHandler, HandlerFault, HandlerResult};
use crate::ports::{MessageSender, ResponseFuture};

/// The internal readiness command a gated peer sends when it is up.
pub const SYSTEM_READY: &str = "system:ready";

struct QueuedSend {
    message: Message,
    reply: oneshot::Sender<Message>,
}

#[derive(Default)]
struct GateState {
    ready: bool,
    queue: Vec<QueuedSend>,
}

/// Sender decorator holding outbound traffic until the peer is ready.
pub struct ReadyGateFront {
    node: NodeId,
    peer: NodeId,
    inner: Arc<dyn MessageSender>,
    state: Mutex<GateState>,
}

impl ReadyGateFront {
    /// Wrap `inner`, the sender toward `peer`, on the router for `node`.
    pub fn new(node: NodeId, peer: NodeId, inner: Arc<dyn MessageSender>) -> Arc<Self> {
        Arc::new(Self {
            node,
            peer,
            inner,
            state: Mutex::new(GateState::default()),
        })
    }

    /// The one-shot `system:ready` handler to register for the gated peer.
    pub fn ready_handler(self: &Arc<Self>) -> CommandHandler {
        let gate = Arc::downgrade(self);
        handler_fn(move |_args, _command, _origin| {
            let gate = gate.clone();
            async move {
                match gate.upgrade() {
                    Some(gate) => gate.mark_ready(),
                    None => Err(HandlerFault::Empty),
                }
            }
        })
    }

    /// Flip to ready and flush the queue in arrival order.
    ///
    /// Dispatch order is fixed here, under the gate lock, so queued
    /// messages hit the wire strictly before anything sent after the
    /// transition; only the response forwarding is deferred to tasks.
    fn mark_ready(&self) -> HandlerResult {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.ready {
            return Err(HandlerFault::Blob(ErrorBlob::new(
                ErrorKind::AlreadyReady,
                format!("{} already signalled readiness to {}", self.peer, self.node),
            )));
        }
        state.ready = true;

        let queued = std::mem::take(&mut state.queue);
        debug!(
            node = %self.node,
            peer = %self.peer,
            flushed = queued.len(),
            "peer ready, flushing queued messages"
        );
        for QueuedSend { message, reply } in queued {
            let response = self.inner.send_message(message);
            tokio::spawn(async move {
                let _ = reply.send(response.await);
            });
        }
        Ok(None)
    }
}

impl MessageSender for ReadyGateFront {
    fn send_message(&self, message: Message) -> ResponseFuture {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.ready {
            return self.inner.send_message(message);
        }

        debug!(
            node = %self.node,
            peer = %self.peer,
            command = %message.command,
            destination = %message.global_routing.destination,
            "queueing message until adjacent node is ready"
        );
        let (reply, pending) = oneshot::channel();
        let unflushed = message.clone();
        state.queue.push(QueuedSend { message, reply });
        Box::pin(async move {
            pending.await.unwrap_or_else(|_| {
                unflushed.synthesize_error(ErrorBlob::for_message(
                    &unflushed,
                    ErrorKind::DeliveryFailed,
                    "ready gate dropped before the peer became ready",
                ))
            })
        })
    }

    fn register_listener(&self) {
        self.inner.register_listener();
    }

    fn unregister_listener(&self) {
        self.inner.unregister_listener();
    }
}
