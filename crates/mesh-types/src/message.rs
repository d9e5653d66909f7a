//! The `Message` envelope.
//!
//! Every payload that crosses a transport is one of these. `localRouting`
//! always names the adjacent pair for the current hop and is rewritten at
//! every hop; `globalRouting` is immutable end to end except for
//! `passerState`, a scratch map transports may use for hop-local correlation
//! without it leaking into application-visible fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_blob::ErrorBlob;
use crate::node::NodeId;

/// A string-keyed JSON object map: command arguments, error details,
/// passer state.
pub type Blob = serde_json::Map<String, Value>;

/// The adjacent pair a message is currently travelling between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRouting {
    /// The node that put the message on this hop.
    pub from: NodeId,
    /// The node expected to pick the message up.
    pub to: NodeId,
}

impl LocalRouting {
    /// The reverse direction of this hop, used when sending a response back.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// End-to-end routing data, fixed at the originating node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRouting {
    /// The node that originated the command.
    pub origin: NodeId,
    /// The node the command is ultimately addressed to.
    pub destination: NodeId,
    /// Mutable per-message scratch space for transports (request
    /// correlation and the like). Never read by application code.
    #[serde(default)]
    pub passer_state: Blob,
}

/// How long a confirming transport waits for a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyTimeout {
    /// The transport's own default window.
    #[default]
    Default,
    /// Wait forever; silence is never converted into an error.
    Disabled,
    /// An explicit window in milliseconds.
    Millis(u64),
}

impl ReplyTimeout {
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Wire form: an absent field means [`ReplyTimeout::Default`], an explicit
/// `null` means [`ReplyTimeout::Disabled`], a number is milliseconds.
mod reply_timeout_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ReplyTimeout;

    pub fn serialize<S: Serializer>(value: &ReplyTimeout, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            // `Default` is skipped by the field attribute; treat it as null
            // if it ever reaches here so round-trips stay lossless enough.
            ReplyTimeout::Default | ReplyTimeout::Disabled => serializer.serialize_none(),
            ReplyTimeout::Millis(ms) => serializer.serialize_u64(*ms),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ReplyTimeout, D::Error> {
        Ok(match Option::<u64>::deserialize(deserializer)? {
            Some(ms) => ReplyTimeout::Millis(ms),
            None => ReplyTimeout::Disabled,
        })
    }
}

fn confirm_receipt_default() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Per-command options understood by transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOpts {
    /// Transport-specific routing hint; opaque to the router core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    /// Reply-timeout window for confirming transports.
    #[serde(
        default,
        skip_serializing_if = "ReplyTimeout::is_default",
        with = "reply_timeout_serde"
    )]
    pub timeout: ReplyTimeout,
    /// Whether to wait for a reply at all. Defaults to true; when false the
    /// transport settles immediately with a synthesized receipt.
    #[serde(default = "confirm_receipt_default", skip_serializing_if = "is_true")]
    pub confirm_receipt: bool,
}

impl Default for CommandOpts {
    fn default() -> Self {
        Self {
            tab_id: None,
            timeout: ReplyTimeout::Default,
            confirm_receipt: true,
        }
    }
}

impl CommandOpts {
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// The envelope for every request and response crossing the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The command name this message invokes (or responds to).
    pub command: String,
    /// Current-hop addressing; rewritten at every hop.
    pub local_routing: LocalRouting,
    /// End-to-end addressing; fixed at the origin.
    pub global_routing: GlobalRouting,
    /// Command arguments.
    #[serde(default)]
    pub args: Blob,
    /// Per-command options.
    #[serde(default, skip_serializing_if = "CommandOpts::is_default")]
    pub opts: CommandOpts,
    /// Set on the return leg.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_response: bool,
    /// The handler's value; exactly one of `response`/`error` is set once a
    /// handler has settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// The failure that terminated handling, as data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBlob>,
}

impl Message {
    /// Build a fresh outbound command at its originating node.
    pub fn new_command(
        origin: NodeId,
        first_hop: NodeId,
        destination: NodeId,
        command: impl Into<String>,
        args: Blob,
        opts: CommandOpts,
    ) -> Self {
        Self {
            command: command.into(),
            local_routing: LocalRouting {
                from: origin.clone(),
                to: first_hop,
            },
            global_routing: GlobalRouting {
                origin,
                destination,
                passer_state: Blob::new(),
            },
            args,
            opts,
            is_response: false,
            response: None,
            error: None,
        }
    }

    /// Whether a raw payload looks like a message at all.
    ///
    /// Receivers ignore anything that fails this check: other traffic may
    /// legitimately share the same physical channel.
    #[must_use]
    pub fn has_wire_shape(payload: &Value) -> bool {
        let Some(object) = payload.as_object() else {
            return false;
        };
        // Close enough.
        object.contains_key("command")
            && object.contains_key("localRouting")
            && object.contains_key("globalRouting")
            && object.contains_key("args")
    }

    /// Decode a raw payload, returning `None` for anything that is not a
    /// well-formed message.
    #[must_use]
    pub fn from_wire(payload: Value) -> Option<Self> {
        if !Self::has_wire_shape(&payload) {
            return None;
        }
        serde_json::from_value(payload).ok()
    }

    /// Turn this request into its success response, flipping the hop
    /// addressing to travel back. A handler that resolved with nothing
    /// yields a null `response`, never an absent one.
    #[must_use]
    pub fn into_response(mut self, value: Option<Value>) -> Self {
        self.local_routing = self.local_routing.flipped();
        self.is_response = true;
        self.response = Some(value.unwrap_or(Value::Null));
        self.error = None;
        self
    }

    /// Turn this request into an error response, flipping the hop
    /// addressing to travel back.
    #[must_use]
    pub fn into_error_response(mut self, error: ErrorBlob) -> Self {
        self.local_routing = self.local_routing.flipped();
        self.is_response = true;
        self.response = None;
        self.error = Some(error);
        self
    }

    /// A transport-synthesized error for this request, delivered straight to
    /// the local caller (hop addressing left untouched).
    #[must_use]
    pub fn synthesize_error(&self, error: ErrorBlob) -> Self {
        let mut synthesized = self.clone();
        synthesized.is_response = true;
        synthesized.response = None;
        synthesized.error = Some(error);
        synthesized
    }

    /// A transport-synthesized receipt for a request sent without receipt
    /// confirmation.
    #[must_use]
    pub fn synthesize_receipt(&self) -> Self {
        let mut synthesized = self.clone();
        synthesized.is_response = true;
        synthesized.response = Some(Value::Null);
        synthesized.error = None;
        synthesized
    }

    /// Rewrite the current-hop addressing for the next hop.
    #[must_use]
    pub fn forwarded(mut self, from: NodeId, to: NodeId) -> Self {
        self.local_routing = LocalRouting { from, to };
        self
    }

    /// Replace the current-hop addressing wholesale (used when relaying a
    /// downstream response back toward the origin).
    #[must_use]
    pub fn with_local_routing(mut self, local_routing: LocalRouting) -> Self {
        self.local_routing = local_routing;
        self
    }

    /// Whether this message settles the request it answers: a settled
    /// response carries exactly one of `response`/`error`.
    #[must_use]
    pub fn is_settled_response(&self) -> bool {
        self.is_response && (self.response.is_some() ^ self.error.is_some())
    }
}
