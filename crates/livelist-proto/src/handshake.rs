//! Connection handshake: subprotocol negotiation and `connection_init`.

use serde_json::Value;

use crate::{CloseCode, ServerMessage};

/// Pick the subprotocol to accept from a `Sec-WebSocket-Protocol` header value.
///
/// The header may list several comma-separated protocols; only
/// [`crate::SUBPROTOCOL`] is accepted.
pub fn negotiate_subprotocol(offered: &str) -> Option<&'static str> {
    offered
        .split(',')
        .map(str::trim)
        .any(|p| p == crate::SUBPROTOCOL)
        .then_some(crate::SUBPROTOCOL)
}

/// Check a `connection_init` payload.
///
/// A missing payload and `null` are accepted. Anything else must be a JSON
/// object.
pub fn validate_init_payload(payload: Option<&Value>) -> Result<(), CloseCode> {
    match payload {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(CloseCode::BadRequest),
    }
}

/// Build the `connection_ack` sent after a valid `connection_init`.
pub fn acknowledge(payload: Option<Value>) -> ServerMessage {
    ServerMessage::ack(payload)
}
