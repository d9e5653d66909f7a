//! # Message Router Service
//!
//! [`MessageRouter`] wires the domain layer (routing table, handler
//! registry) to the transport ports. One instance per process represents
//! "self" in the mesh.
//!
//! ## Construction
//!
//! All validation happens up front: self must exist among the configs, every
//! adjacent node needs a config variant matching its edge's strategy, secure
//! edges require whitelisted origins at both endpoints, and an isolated node
//! is rejected outright. The routing table, transport instances, and
//! security flags derived here are immutable afterwards; only the handler
//! registry (and decorator queues) mutate during normal operation.
//!
//! ## Inbound protocol
//!
//! A delivered message is either refused (trust violation, no route),
//! handled locally (destination reached), or forwarded to the next hop with
//! the eventual response relayed back. Each message is processed to the
//! dispatch decision synchronously; suspension only happens at the transport
//! boundary or while awaiting a handler.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use mesh_types::{Blob, CommandOpts, ErrorBlob, ErrorKind, Message, NodeId};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::{EdgeConfig, NodeConfigs, NodeTransportConfig, Topology};
use crate::domain::{
    resolve_first_hops, CommandError, CommandHandler, CommandHandlerRegistry, CommandPattern,
    ConstructionError, DispatchError, HandlerFault, HandlerLookup, HandlerToken, ListenerError,
    RegistryError, RoutingTable,
};
use crate::fronts::{ReadyGateFront, SYSTEM_READY};
use crate::ports::{CommandRouter, LinkContext, MessageReceiver, MessageSender};

/// What to do with a handler fault that is not a well-formed error blob.
///
/// Either way the caller receives a generic `handlerError` response; the
/// policy controls whether the original fault is *also* escalated to the
/// host's fault reporting. Keeping both channels is deliberate: handler
/// faults must never be silently swallowed. The blob sent over the wire
/// carries only the generic description — fault detail stays in the local
/// escalation event, so nothing internal crosses the trust boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerFaultPolicy {
    /// Emit an error-level event with the full fault, in addition to the
    /// error response.
    #[default]
    Escalate,
    /// Only convert the fault into an error response.
    ResponseOnly,
}

/// A weak handle to a router, held by transport halves for inbound dispatch.
///
/// Weak on purpose: transports must not keep a dropped router alive, and a
/// dispatch against a released router is refused rather than ignored.
#[derive(Clone)]
pub struct RouterHandle {
    node: NodeId,
    inner: Weak<MessageRouter>,
}

impl RouterHandle {
    fn new(router: &Arc<MessageRouter>) -> Self {
        Self {
            node: router.node.clone(),
            inner: Arc::downgrade(router),
        }
    }

    /// The node this handle dispatches into.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Hand an inbound message to the router's dispatch protocol.
    pub async fn dispatch(&self, message: Message) -> Result<Message, DispatchError> {
        match self.inner.upgrade() {
            Some(router) => router.route_message(message).await,
            None => Err(DispatchError::RouterReleased {
                node: self.node.clone(),
            }),
        }
    }
}

/// The per-node routing and dispatch engine.
pub struct MessageRouter {
    node: NodeId,
    routes: RoutingTable,
    /// Adjacent nodes whose edge into self is not secure. They may only
    /// originate or terminate traffic, never relay.
    insecure_receivers: HashSet<NodeId>,
    registry: CommandHandlerRegistry,
    senders: OnceLock<HashMap<NodeId, Arc<dyn MessageSender>>>,
    receivers: OnceLock<HashMap<NodeId, Arc<dyn MessageReceiver>>>,
    registered: AtomicBool,
    fault_policy: HandlerFaultPolicy,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("node", &self.node)
            .field("routes", &self.routes)
            .field("insecure_receivers", &self.insecure_receivers)
            .field("registry", &"CommandHandlerRegistry")
            .field("senders_initialized", &self.senders.get().is_some())
            .field("receivers_initialized", &self.receivers.get().is_some())
            .field("registered", &self.registered)
            .field("fault_policy", &self.fault_policy)
            .finish()
    }
}

impl MessageRouter {
    /// Build the router for `node` with the default fault policy.
    pub fn new(
        node_configs: &NodeConfigs,
        topology: &Topology,
        node: impl Into<NodeId>,
    ) -> Result<Arc<Self>, ConstructionError> {
        Self::with_fault_policy(node_configs, topology, node, HandlerFaultPolicy::default())
    }

    /// Build the router for `node` with an explicit fault policy.
    pub fn with_fault_policy(
        node_configs: &NodeConfigs,
        topology: &Topology,
        node: impl Into<NodeId>,
        fault_policy: HandlerFaultPolicy,
    ) -> Result<Arc<Self>, ConstructionError> {
        let node = node.into();
        if !node_configs.contains_key(&node) {
            let mut known: Vec<NodeId> = node_configs.keys().cloned().collect();
            known.sort();
            return Err(ConstructionError::UnknownSelfNode { node, known });
        }

        let routes = resolve_first_hops(&topology.edges, &node);

        let mut insecure_receivers = HashSet::new();
        for (from, targets) in &topology.edges {
            if let Some(edge) = targets.get(&node) {
                if !edge.secure {
                    insecure_receivers.insert(from.clone());
                }
            }
        }

        let router = Arc::new(Self {
            node: node.clone(),
            routes,
            insecure_receivers,
            registry: CommandHandlerRegistry::new(),
            senders: OnceLock::new(),
            receivers: OnceLock::new(),
            registered: AtomicBool::new(false),
            fault_policy,
        });

        let handle = RouterHandle::new(&router);
        let senders = router.resolve_senders(node_configs, topology, &handle)?;
        let receivers = router.resolve_receivers(node_configs, topology, &handle)?;
        if senders.is_empty() && receivers.is_empty() {
            return Err(ConstructionError::IsolatedNode { node });
        }

        let _ = router.senders.set(senders);
        let _ = router.receivers.set(receivers);
        Ok(router)
    }

    /// The node this router represents.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The resolved first-hop table.
    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    fn resolve_senders(
        &self,
        node_configs: &NodeConfigs,
        topology: &Topology,
        handle: &RouterHandle,
    ) -> Result<HashMap<NodeId, Arc<dyn MessageSender>>, ConstructionError> {
        let mut senders: HashMap<NodeId, Arc<dyn MessageSender>> = HashMap::new();
        let Some(adjacent) = topology.edges.get(&self.node) else {
            return Ok(senders);
        };

        for (peer, edge) in adjacent {
            if !node_configs.contains_key(peer) {
                return Err(ConstructionError::MissingAdjacentConfig {
                    this: self.node.clone(),
                    node: peer.clone(),
                });
            }

            let link = self.link_context(node_configs, topology, edge, &self.node, peer, handle)?;
            let mut sender = edge.strategy.new_sender(link)?;

            if edge.wait_for_ready {
                let gate = ReadyGateFront::new(self.node.clone(), peer.clone(), sender);
                self.registry
                    .add(
                        std::slice::from_ref(peer),
                        &CommandPattern::named(SYSTEM_READY),
                        gate.ready_handler(),
                    )
                    .map_err(|source| ConstructionError::ReadySignal {
                        peer: peer.clone(),
                        source,
                    })?;
                sender = gate;
            }

            senders.insert(peer.clone(), sender);
        }
        Ok(senders)
    }

    fn resolve_receivers(
        &self,
        node_configs: &NodeConfigs,
        topology: &Topology,
        handle: &RouterHandle,
    ) -> Result<HashMap<NodeId, Arc<dyn MessageReceiver>>, ConstructionError> {
        let mut receivers: HashMap<NodeId, Arc<dyn MessageReceiver>> = HashMap::new();

        for (from, targets) in &topology.edges {
            if from == &self.node {
                continue;
            }
            let Some(edge) = targets.get(&self.node) else {
                continue;
            };
            if !node_configs.contains_key(from) {
                return Err(ConstructionError::MissingAdjacentConfig {
                    this: self.node.clone(),
                    node: from.clone(),
                });
            }

            let link = self.link_context(node_configs, topology, edge, from, &self.node, handle)?;
            receivers.insert(from.clone(), edge.strategy.new_receiver(link)?);
        }
        Ok(receivers)
    }

    /// Match both endpoints' configs against the edge's strategy descriptor
    /// and enforce origin trust for secure edges.
    fn link_context(
        &self,
        node_configs: &NodeConfigs,
        topology: &Topology,
        edge: &EdgeConfig,
        sender: &NodeId,
        receiver: &NodeId,
        handle: &RouterHandle,
    ) -> Result<LinkContext, ConstructionError> {
        let descriptor = edge.strategy.descriptor();
        let find = |node: &NodeId, peer: &NodeId| -> Result<NodeTransportConfig, ConstructionError> {
            node_configs
                .get(node)
                .and_then(|configs| configs.iter().find(|c| c.descriptor() == descriptor))
                .cloned()
                .ok_or_else(|| ConstructionError::MissingStrategyConfig {
                    node: node.clone(),
                    strategy: descriptor,
                    peer: peer.clone(),
                })
        };
        let sender_config = find(sender, receiver)?;
        let receiver_config = find(receiver, sender)?;

        if edge.secure {
            for (node, origin) in [
                (sender, sender_config.origin()),
                (receiver, receiver_config.origin()),
            ] {
                if !topology.secure_origins.contains(origin) {
                    return Err(ConstructionError::InsecureOrigin {
                        this: self.node.clone(),
                        from: sender.clone(),
                        to: receiver.clone(),
                        node: node.clone(),
                        origin: origin.clone(),
                    });
                }
            }
        }

        Ok(LinkContext {
            sender: sender.clone(),
            sender_config,
            receiver: receiver.clone(),
            receiver_config,
            router: handle.clone(),
        })
    }

    fn sender_for(&self, peer: &NodeId) -> Option<Arc<dyn MessageSender>> {
        self.senders.get().and_then(|senders| senders.get(peer)).cloned()
    }

    /// The inbound dispatch protocol: refuse, handle locally, or forward.
    pub async fn route_message(&self, message: Message) -> Result<Message, DispatchError> {
        let origin = &message.global_routing.origin;
        let destination = &message.global_routing.destination;

        if self.insecure_receivers.contains(&message.local_routing.from)
            && !(origin == &message.local_routing.from || destination == &message.local_routing.to)
        {
            return Err(DispatchError::InsecureRelay {
                node: self.node.clone(),
                from: message.local_routing.from.clone(),
            });
        }

        if destination == &self.node {
            Ok(self.dispatch_local(message).await)
        } else {
            self.forward(message).await
        }
    }

    async fn dispatch_local(&self, message: Message) -> Message {
        let origin = message.global_routing.origin.clone();

        let handler = match self.registry.lookup(&origin, &message.command) {
            HandlerLookup::NoOrigin => {
                let blob = ErrorBlob::for_message(
                    &message,
                    ErrorKind::NoHandler,
                    format!("no handlers found for messages from {origin}"),
                );
                return message.into_error_response(blob);
            }
            HandlerLookup::NoCommand => {
                let blob = ErrorBlob::for_message(
                    &message,
                    ErrorKind::NoHandler,
                    format!(
                        "no handler found for command {} from {origin}",
                        message.command
                    ),
                );
                return message.into_error_response(blob);
            }
            HandlerLookup::Found(handler) => handler,
        };

        debug!(
            node = %self.node,
            command = %message.command,
            origin = %origin,
            via = %message.local_routing.from,
            "handling command addressed to this node"
        );

        let outcome =
            (*handler)(message.args.clone(), message.command.clone(), origin.clone()).await;
        match outcome {
            Ok(response) => message.into_response(response.map(Value::Object)),
            Err(HandlerFault::Blob(blob)) => message.into_error_response(blob),
            Err(HandlerFault::Unexpected(fault)) => {
                if self.fault_policy == HandlerFaultPolicy::Escalate {
                    // The second delivery channel: faults must reach the
                    // host's fault reporting, not just the remote caller.
                    error!(
                        node = %self.node,
                        command = %message.command,
                        origin = %origin,
                        fault = ?fault,
                        "command handler failed with an unexpected error"
                    );
                }
                let blob = ErrorBlob::for_message(
                    &message,
                    ErrorKind::HandlerError,
                    "an unexpected error was thrown during handling",
                );
                message.into_error_response(blob)
            }
            Err(HandlerFault::Empty) => {
                let blob = ErrorBlob::for_message(
                    &message,
                    ErrorKind::UnknownError,
                    "the handler rejected without a message",
                );
                message.into_error_response(blob)
            }
        }
    }

    async fn forward(&self, message: Message) -> Result<Message, DispatchError> {
        let destination = message.global_routing.destination.clone();
        let step = self
            .routes
            .first_hop(&destination)
            .cloned()
            .ok_or_else(|| DispatchError::NoRoute {
                node: self.node.clone(),
                destination: destination.clone(),
            })?;
        let sender = self.sender_for(&step).ok_or_else(|| DispatchError::NoRoute {
            node: self.node.clone(),
            destination: destination.clone(),
        })?;

        debug!(
            node = %self.node,
            command = %message.command,
            origin = %message.global_routing.origin,
            destination = %destination,
            next = %step,
            "forwarding command to next hop"
        );

        // The reply leg of the hop we received this on; the downstream
        // response is re-addressed onto it before relaying back.
        let reply_routing = message.local_routing.flipped();
        let forwarded = message.forwarded(self.node.clone(), step);
        let response = sender.send_message(forwarded).await;
        Ok(response.with_local_routing(reply_routing))
    }

    fn settle(&self, response: Message) -> Result<Value, CommandError> {
        match response.error {
            Some(blob) => {
                debug!(
                    node = %self.node,
                    command = %response.command,
                    kind = %blob.kind,
                    "command settled with an error"
                );
                Err(CommandError::Remote {
                    origin: response.global_routing.origin,
                    destination: response.global_routing.destination,
                    command: response.command,
                    kind: blob.kind.clone(),
                    blob,
                })
            }
            None => Ok(response.response.unwrap_or(Value::Null)),
        }
    }
}

#[async_trait]
impl CommandRouter for MessageRouter {
    async fn send_command_with_opts(
        &self,
        destination: &NodeId,
        command: &str,
        args: Blob,
        opts: CommandOpts,
    ) -> Result<Value, CommandError> {
        let step = self
            .routes
            .first_hop(destination)
            .cloned()
            .ok_or_else(|| CommandError::NoRoute {
                node: self.node.clone(),
                destination: destination.clone(),
            })?;
        let sender = self.sender_for(&step).ok_or_else(|| CommandError::NoRoute {
            node: self.node.clone(),
            destination: destination.clone(),
        })?;

        if &step == destination {
            debug!(node = %self.node, command, destination = %destination, "sending command directly");
        } else {
            debug!(node = %self.node, command, destination = %destination, via = %step, "sending command via first hop");
        }

        let message = Message::new_command(
            self.node.clone(),
            step,
            destination.clone(),
            command,
            args,
            opts,
        );
        let response = sender.send_message(message).await;
        self.settle(response)
    }

    fn add_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        handler: CommandHandler,
    ) -> Result<HandlerToken, RegistryError> {
        self.registry.add(origins, &command, handler)
    }

    fn remove_command_handler(
        &self,
        origins: &[NodeId],
        command: CommandPattern,
        token: HandlerToken,
    ) -> Result<(), RegistryError> {
        self.registry.remove(origins, &command, token)
    }

    fn register_listeners(&self) -> Result<(), ListenerError> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRegistered {
                node: self.node.clone(),
            });
        }
        if let Some(senders) = self.senders.get() {
            for sender in senders.values() {
                sender.register_listener();
            }
        }
        if let Some(receivers) = self.receivers.get() {
            for receiver in receivers.values() {
                receiver.register_listener();
            }
        }
        Ok(())
    }

    fn unregister_listeners(&self) {
        self.registered.store(false, Ordering::SeqCst);
        if let Some(senders) = self.senders.get() {
            for sender in senders.values() {
                sender.unregister_listener();
            }
        }
        if let Some(receivers) = self.receivers.get() {
            for receiver in receivers.values() {
                receiver.unregister_listener();
            }
        }
    }
}
