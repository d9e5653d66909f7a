//! Buffering for not-yet-registered handlers.
//!
//! Application code often wires its handlers after traffic has already
//! started flowing (a page still booting, a worker mid-restart). A
//! [`BufferedFront`] wraps a router, installs itself as the wildcard
//! handler for the buffered origins, and parks every unmatched inbound
//! command. When the real handler for a pair finally registers, the parked
//! invocations are replayed against it in arrival order and settled with
//! its actual outcomes. Pairs that never register stay parked forever —
//! an accepted limitation of the scheme.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mesh_types::{Blob, CommandOpts, NodeId};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{
    handler_fn, CommandError, CommandHandler, CommandPattern, HandlerFault, HandlerResult,
    HandlerToken, ListenerError, RegistryError,
};
use crate::ports::CommandRouter;

struct PendingInvocation {
    args: Blob,
    reply: oneshot::Sender<HandlerResult>,
}

#[derive(Default)]
struct BufferState {
    // (origin, command) -> parked invocations, oldest first
    pending: Mutex<HashMap<(NodeId, String), Vec<PendingInvocation>>>,
}

/// Router decorator that parks unmatched inbound commands from selected
/// origins until a concrete handler registers.
pub struct BufferedFront {
    inner: Arc<dyn CommandRouter>,
    state: Arc<BufferState>,
}

impl BufferedFront {
    /// Wrap `inner` and start buffering every command from the listed
    /// origins.
    ///
    /// Fails if any buffered origin already has a wildcard handler.
    pub fn new(
        inner: Arc<dyn CommandRouter>,
        buffered_origins: &[NodeId],
    ) -> Result<Arc<Self>, RegistryError> {
        let state = Arc::new(BufferState::default());
        for origin in buffered_origins {
            inner.add_command_handler(
                std::slice::from_ref(origin),
                CommandPattern::Wildcard,
                Self::park_handler(state.clone()),
            )?;
        }
        Ok(Arc::new(Self { inner, state }))
    }

    /// The wildcard handler: park the invocation and leave it unsettled.
    fn park_handler(state: Arc<BufferState>) -> CommandHandler {
        handler_fn(move |args, command, origin| {
            let (reply, parked) = oneshot::channel();
            debug!(
                origin = %origin,
                command = %command,
                "buffering command until a handler registers"
            );
            state
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry((origin, command))
                .or_default()
                .push(PendingInvocation { args, reply });
            async move {
                // Settled by the replay when a real handler shows up; an
                // error here means the buffer itself went away.
                parked.await.unwrap_or(Err(HandlerFault::Empty))
            }
        })
    }
}

#[async_trait]
impl CommandRouter for BufferedFront {
    async fn send_command_with_opts(
        &self,
        destination: &NodeId,
        command: &str,
        args: Blob,
        opts: CommandOpts,
    ) -> Result<Value, CommandError> {
        self.inner
            .send_command_with_opts(destination, command, args, opts)
            .await
    }

    fn add_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        handler: CommandHandler,
    ) -> Result<HandlerToken, RegistryError> {
        if command.is_wildcard() {
            return Err(RegistryError::WildcardReserved);
        }

        let token = self.inner.add_command_handler(origins, command.clone(), handler.clone())?;

        let CommandPattern::Named(name) = command else {
            // is_wildcard() was checked above.
            return Ok(token);
        };
        for origin in origins {
            let parked = self
                .state
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&(origin.clone(), name.clone()));
            let Some(parked) = parked else { continue };

            debug!(
                origin = %origin,
                command = %name,
                replayed = parked.len(),
                "handler registered, replaying buffered commands"
            );
            // Invocation order is fixed here; only settlement is deferred.
            for PendingInvocation { args, reply } in parked {
                let outcome = (*handler)(args, name.clone(), origin.clone());
                tokio::spawn(async move {
                    let _ = reply.send(outcome.await);
                });
            }
        }
        Ok(token)
    }

    fn remove_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        token: HandlerToken,
    ) -> Result<(), RegistryError> {
        self.inner.remove_command_handler(origins, command, token)
    }

    fn register_listeners(&self) -> Result<(), ListenerError> {
        self.inner.register_listeners()
    }

    fn unregister_listeners(&self) {
        self.inner.unregister_listeners()
    }
}
