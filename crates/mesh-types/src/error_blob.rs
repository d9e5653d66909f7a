//! Structured, serializable errors.
//!
//! An [`ErrorBlob`] travels inside a response message; it is how a failure
//! crosses node boundaries as data rather than as a process fault.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::{Blob, LocalRouting, Message};

/// The well-known error kinds plus an open extension for transport-defined
/// ones.
///
/// The closed variants are produced by the router core; transports and gates
/// add their own through the listed transport kinds or [`ErrorKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No handler registered for the originating node, or for this command.
    NoHandler,
    /// A handler did not produce an asynchronous result. Kept for wire
    /// compatibility; the typed registry cannot produce it locally.
    InvalidHandler,
    /// A handler faulted with an unrecognized error.
    HandlerError,
    /// A handler rejected without a value.
    UnknownError,
    /// An inbound dispatch was refused (trust violation or no route).
    RoutingRefused,
    /// A confirming transport gave up waiting for a reply.
    ChannelTimeout,
    /// A correlated reply arrived but was not a valid message.
    InvalidResponse,
    /// A transport could not put the message on the wire at all.
    DeliveryFailed,
    /// The readiness signal fired more than once.
    AlreadyReady,
    /// Any other kind, preserved verbatim.
    Other(String),
}

impl ErrorKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoHandler => "noHandler",
            Self::InvalidHandler => "invalidHandler",
            Self::HandlerError => "handlerError",
            Self::UnknownError => "unknownError",
            Self::RoutingRefused => "routingRefused",
            Self::ChannelTimeout => "channelTimeout",
            Self::InvalidResponse => "invalidResponse",
            Self::DeliveryFailed => "deliveryFailed",
            Self::AlreadyReady => "alreadyReady",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorKind {
    fn from(name: &str) -> Self {
        match name {
            "noHandler" => Self::NoHandler,
            "invalidHandler" => Self::InvalidHandler,
            "handlerError" => Self::HandlerError,
            "unknownError" => Self::UnknownError,
            "routingRefused" => Self::RoutingRefused,
            "channelTimeout" => Self::ChannelTimeout,
            "invalidResponse" => Self::InvalidResponse,
            "deliveryFailed" => Self::DeliveryFailed,
            "alreadyReady" => Self::AlreadyReady,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// A structured, serializable error carried by a response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBlob {
    /// Snapshot of the hop addressing at the point the error was raised.
    /// Copied, because `localRouting` is rewritten as the response travels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_routing: Option<LocalRouting>,
    /// What went wrong, as a wire-stable tag.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured context for diagnostics.
    #[serde(default, skip_serializing_if = "Blob::is_empty")]
    pub details: Blob,
}

impl ErrorBlob {
    /// A bare blob with no routing snapshot.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            local_routing: None,
            kind,
            message: Some(message.into()),
            details: Blob::new(),
        }
    }

    /// A blob raised while handling `original`, with its hop addressing
    /// captured.
    pub fn for_message(original: &Message, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            local_routing: Some(original.local_routing.clone()),
            kind,
            message: Some(message.into()),
            details: Blob::new(),
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Blob) -> Self {
        self.details = details;
        self
    }
}
