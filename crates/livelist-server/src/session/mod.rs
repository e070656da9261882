//! Transport sessions: one graphql-transport-ws conversation per socket.
//!
//! A [`TransportSession`] owns the protocol state of one connection. It reads
//! decoded [`Inbound`] events and writes [`Outbound`] frames to a queue that
//! the socket writer drains, so the same session logic runs over a real
//! WebSocket or over in-memory channels in tests.

mod connection;
mod manager;
mod subscription;

pub use connection::{SessionConfig, SessionPhase, TransportSession};
pub use manager::{ConnectionInfo, ConnectionManager, ConnectionSummary};
pub use subscription::SubscriptionTable;

use livelist_proto::{Close, ServerMessage};

/// Event read from the client side of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A text frame.
    Text(String),
    /// The client closed the connection.
    Close,
}

/// Frame queued for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A protocol message.
    Message(ServerMessage),
    /// Close the socket with a code and reason. Nothing follows it.
    Close(Close),
}
