//! # Driving Port (Inbound API)
//!
//! [`CommandRouter`] is the application-facing surface of a node: sending
//! commands, managing handlers, and the listener lifecycle. The concrete
//! router implements it, and the delivery-timing fronts wrap it by
//! composition, so arbitrary decorator stacks expose the same interface.

use async_trait::async_trait;
use mesh_types::{Blob, CommandOpts, NodeId};
use serde_json::Value;

use crate::domain::{
    CommandError, CommandHandler, CommandPattern, HandlerToken, ListenerError, RegistryError,
};

/// The per-node command API.
#[async_trait]
pub trait CommandRouter: Send + Sync {
    /// Send `command` to `destination` with explicit options and await the
    /// response.
    ///
    /// Fails with [`CommandError::NoRoute`] before any transport is invoked
    /// when the destination is unreachable; otherwise settles from the
    /// eventual response message.
    async fn send_command_with_opts(
        &self,
        destination: &NodeId,
        command: &str,
        args: Blob,
        opts: CommandOpts,
    ) -> Result<Value, CommandError>;

    /// [`send_command_with_opts`](Self::send_command_with_opts) with default
    /// options.
    async fn send_command(
        &self,
        destination: &NodeId,
        command: &str,
        args: Blob,
    ) -> Result<Value, CommandError> {
        self.send_command_with_opts(destination, command, args, CommandOpts::default())
            .await
    }

    /// Register `handler` for `command` from every origin node listed.
    ///
    /// Returns the token required to unregister. Fails if any (origin,
    /// command) pair already has a handler; nothing is registered in that
    /// case.
    fn add_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        handler: CommandHandler,
    ) -> Result<HandlerToken, RegistryError>;

    /// Remove the registration previously created with `token`.
    fn remove_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        token: HandlerToken,
    ) -> Result<(), RegistryError>;

    /// Activate every adjacent transport's receive path. Fails on
    /// double-registration without an intervening unregister.
    fn register_listeners(&self) -> Result<(), ListenerError>;

    /// Deactivate every adjacent transport's receive path. Idempotent.
    fn unregister_listeners(&self);
}
