//! livelist wire protocol.
//!
//! This crate defines the messages exchanged between subscription clients and
//! the livelist server, following the `graphql-transport-ws` subprotocol.
//! Messages are JSON documents carried in WebSocket text frames.
//!
//! # Modules
//!
//! - [`message`] - Client and server message types
//! - [`handshake`] - Subprotocol negotiation and `connection_init` checks
//! - [`close`] - Close codes for protocol violations
//! - [`framing`] - Text frame encoding with a size cap
//! - [`error`] - Protocol error types
//!
//! ```
//! use livelist_proto::{framing, ClientMessage};
//!
//! let text = r#"{"type":"subscribe","id":"1","payload":{"query":"subscription { todos { id } }"}}"#;
//! let message = framing::decode(text).unwrap();
//! assert!(matches!(message, ClientMessage::Subscribe { .. }));
//! ```

pub mod close;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod message;

pub use error::Error;

pub use close::{Close, CloseCode};
pub use message::{
    error_codes, ClientMessage, ExecutionResult, GraphQLError, Location, PathSegment,
    ServerMessage, SubscribePayload,
};

/// WebSocket subprotocol spoken by the server.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";
