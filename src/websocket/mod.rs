//! WebSocket relay core.
//!
//! Upgraded connections are kept in a [`ConnectionRegistry`]. Each one gets an
//! [`InboundReader`] that stamps incoming JSON and queues it on the
//! distribution channel; a single [`Broadcaster`] drains the channel and
//! writes every message to all registered connections.

mod broadcaster;
mod channel;
mod connection;
mod message;
mod reader;
mod registry;
mod server;

pub use broadcaster::Broadcaster;
pub use channel::{distribution_channel, DistributionCloser, DistributionReceiver, DistributionSender};
pub use connection::{Connection, ConnectionId, FrameSink, SessionSink};
pub use message::{format_received_at, sender_host, RelayMessage, RECEIVED_AT_FIELD, SENDER_ADDRESS_FIELD};
pub use reader::{ExitReason, InboundReader};
pub use registry::ConnectionRegistry;
pub use server::{websocket_route, WebSocketServer};

#[cfg(test)]
pub(crate) use connection::testing;
