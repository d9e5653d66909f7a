//! The command handler registry.
//!
//! Handlers are keyed by (origin node, command pattern); one handler per
//! pair, enforced at registration. Registration hands back an opaque
//! [`HandlerToken`] which is required to unregister — callers must hold on
//! to the token for the handler they registered.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use mesh_types::{Blob, ErrorBlob, NodeId};
use uuid::Uuid;

use crate::domain::errors::RegistryError;

/// What a registration matches: one named command, or every command from the
/// origin that has no named handler.
///
/// Modelled as a sum type rather than a reserved command string, so no
/// application command name can collide with the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandPattern {
    /// Fallback for any command without a named registration. Reserved for
    /// buffering fronts in practice.
    Wildcard,
    /// Exactly one command name.
    Named(String),
}

impl CommandPattern {
    /// A pattern matching exactly `command`.
    pub fn named(command: impl Into<String>) -> Self {
        Self::Named(command.into())
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl fmt::Display for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Named(command) => f.write_str(command),
        }
    }
}

/// Opaque proof of a registration, compared by equality on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(Uuid);

impl HandlerToken {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

/// How a handler failed.
#[derive(Debug)]
pub enum HandlerFault {
    /// A well-formed error blob; attached to the error response verbatim.
    Blob(ErrorBlob),
    /// An unrecognized error. Wrapped into a generic `handlerError` response
    /// and, policy permitting, escalated to the host's fault reporting.
    Unexpected(anyhow::Error),
    /// A rejection with no value at all.
    Empty,
}

impl From<ErrorBlob> for HandlerFault {
    fn from(blob: ErrorBlob) -> Self {
        Self::Blob(blob)
    }
}

impl From<anyhow::Error> for HandlerFault {
    fn from(error: anyhow::Error) -> Self {
        Self::Unexpected(error)
    }
}

/// What a handler settles with: an optional response blob, or a fault.
pub type HandlerResult = Result<Option<Blob>, HandlerFault>;

/// The future a handler returns.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// A registered command handler, invoked with `(args, command, origin)`.
pub type CommandHandler = Arc<dyn Fn(Blob, String, NodeId) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`].
pub fn handler_fn<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(Blob, String, NodeId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |args, command, origin| f(args, command, origin).boxed())
}

/// Outcome of a handler lookup at dispatch time.
///
/// The two miss cases are distinct on purpose: they produce different
/// `noHandler` descriptions back to the caller.
pub enum HandlerLookup {
    /// Nothing at all is registered for the originating node.
    NoOrigin,
    /// The origin is known but neither this command nor the wildcard is
    /// registered.
    NoCommand,
    /// A handler (named, or the origin's wildcard fallback).
    Found(CommandHandler),
}

struct Registration {
    token: HandlerToken,
    handler: CommandHandler,
}

/// Mapping (origin node, command pattern) -> handler, one per pair.
///
/// The only registry mutations happen through [`add`](Self::add) and
/// [`remove`](Self::remove); both are atomic across the listed origins (all
/// pairs validated before any is touched).
#[derive(Default)]
pub struct CommandHandlerRegistry {
    handlers: Mutex<HashMap<NodeId, HashMap<CommandPattern, Registration>>>,
}

impl CommandHandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every origin listed.
    ///
    /// Fails with [`RegistryError::DuplicateHandler`] if any pair already has
    /// a handler; in that case nothing is registered.
    pub fn add(
        &self,
        origins: &[NodeId],
        command: &CommandPattern,
        handler: CommandHandler,
    ) -> Result<HandlerToken, RegistryError> {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());

        for origin in origins {
            if handlers
                .get(origin)
                .is_some_and(|by_command| by_command.contains_key(command))
            {
                return Err(RegistryError::DuplicateHandler {
                    origin: origin.clone(),
                    command: command.clone(),
                });
            }
        }

        let token = HandlerToken::fresh();
        for origin in origins {
            handlers.entry(origin.clone()).or_default().insert(
                command.clone(),
                Registration {
                    token,
                    handler: handler.clone(),
                },
            );
        }
        Ok(token)
    }

    /// Remove the registration for every origin listed.
    ///
    /// Fails if any pair has no handler, or if the registered token differs
    /// from `token`; in either case nothing is removed.
    pub fn remove(
        &self,
        origins: &[NodeId],
        command: &CommandPattern,
        token: HandlerToken,
    ) -> Result<(), RegistryError> {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());

        for origin in origins {
            match handlers.get(origin).and_then(|by_command| by_command.get(command)) {
                None => {
                    return Err(RegistryError::UnknownHandler {
                        origin: origin.clone(),
                        command: command.clone(),
                    });
                }
                Some(registration) if registration.token != token => {
                    return Err(RegistryError::TokenMismatch {
                        origin: origin.clone(),
                        command: command.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        for origin in origins {
            if let Some(by_command) = handlers.get_mut(origin) {
                by_command.remove(command);
                if by_command.is_empty() {
                    handlers.remove(origin);
                }
            }
        }
        Ok(())
    }

    /// Look up the handler for a command from `origin`, falling back to the
    /// origin's wildcard registration.
    pub fn lookup(&self, origin: &NodeId, command: &str) -> HandlerLookup {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(by_command) = handlers.get(origin) else {
            return HandlerLookup::NoOrigin;
        };
        let named = CommandPattern::named(command);
        match by_command.get(&named).or_else(|| by_command.get(&CommandPattern::Wildcard)) {
            Some(registration) => HandlerLookup::Found(registration.handler.clone()),
            None => HandlerLookup::NoCommand,
        }
    }
}
