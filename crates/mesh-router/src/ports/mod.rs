//! Ports Layer - the router's driving API and the driven transport SPI.

pub mod inbound;
pub mod transport;

pub use inbound::CommandRouter;
pub use transport::{
    refusal_response, validate_inbound, LinkContext, MessageReceiver, MessageSender,
    ResponseFuture, TransportStrategy,
};
