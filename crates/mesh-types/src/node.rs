//! Node and origin identifiers.
//!
//! A [`NodeId`] names one addressable endpoint in the mesh. An [`Origin`] is
//! the opaque identity credential a node's transport config exposes; it is
//! used solely for the secure-trust check, never for routing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of one node in the mesh.
///
/// Node ids are plain strings supplied by the topology; the router never
/// interprets them beyond equality and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identity credential of a node, e.g. `app://core`.
///
/// Origins are compared against the topology's trusted set when an edge is
/// flagged secure; their internal structure is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Create an origin from any string-like value.
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(origin: &str) -> Self {
        Self(origin.to_owned())
    }
}

impl From<String> for Origin {
    fn from(origin: String) -> Self {
        Self(origin)
    }
}
