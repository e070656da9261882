//! Text framing for WebSocket messages.
//!
//! Each frame is one JSON document sent as a WebSocket text message. Frames
//! larger than the configured limit are rejected before parsing.

use crate::{ClientMessage, Error, ServerMessage};

/// Default maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Encode a server message as a JSON text frame.
pub fn encode(message: &ServerMessage) -> Result<String, Error> {
    serde_json::to_string(message).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a client text frame, enforcing the default size limit.
pub fn decode(text: &str) -> Result<ClientMessage, Error> {
    decode_with_limit(text, MAX_MESSAGE_SIZE)
}

/// Decode a client text frame, enforcing `max` bytes.
pub fn decode_with_limit(text: &str, max: usize) -> Result<ClientMessage, Error> {
    check_size(text.len(), max)?;
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))?;
    message.validate()?;
    Ok(message)
}

/// Reject payloads above `max` bytes.
pub fn check_size(size: usize, max: usize) -> Result<(), Error> {
    if size > max {
        return Err(Error::MessageTooLarge { size, max });
    }
    Ok(())
}

/// Decode a server text frame. Used by clients and tests.
pub fn decode_server(text: &str) -> Result<ServerMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Encode a client message. Used by clients and tests.
pub fn encode_client(message: &ClientMessage) -> Result<String, Error> {
    serde_json::to_string(message).map_err(|e| Error::Serialization(e.to_string()))
}
