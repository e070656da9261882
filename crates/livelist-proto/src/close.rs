//! WebSocket close codes used by the subprotocol.

use std::fmt;

/// Reason a server closes a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// Malformed or unexpected message.
    BadRequest,
    /// Operation sent before the connection was acknowledged.
    Unauthorized,
    /// The client did not offer the expected subprotocol.
    SubprotocolNotAcceptable,
    /// No `connection_init` within the wait timeout.
    ConnectionInitialisationTimeout,
    /// An operation id was reused while still active.
    SubscriberAlreadyExists,
    /// A second `connection_init` was received.
    TooManyInitialisationRequests,
    /// Unexpected server failure.
    InternalServerError,
}

impl CloseCode {
    /// Numeric code sent in the close frame.
    pub fn code(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::BadRequest => 4400,
            CloseCode::Unauthorized => 4401,
            CloseCode::SubprotocolNotAcceptable => 4406,
            CloseCode::ConnectionInitialisationTimeout => 4408,
            CloseCode::SubscriberAlreadyExists => 4409,
            CloseCode::TooManyInitialisationRequests => 4429,
            CloseCode::InternalServerError => 4500,
        }
    }

    /// Default reason text for the close frame.
    pub fn reason(&self) -> &'static str {
        match self {
            CloseCode::Normal => "Normal Closure",
            CloseCode::BadRequest => "Bad Request",
            CloseCode::Unauthorized => "Unauthorized",
            CloseCode::SubprotocolNotAcceptable => "Subprotocol not acceptable",
            CloseCode::ConnectionInitialisationTimeout => "Connection initialisation timeout",
            CloseCode::SubscriberAlreadyExists => "Subscriber already exists",
            CloseCode::TooManyInitialisationRequests => "Too many initialisation requests",
            CloseCode::InternalServerError => "Internal server error",
        }
    }

    /// Look up a code by its numeric value.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(CloseCode::Normal),
            4400 => Some(CloseCode::BadRequest),
            4401 => Some(CloseCode::Unauthorized),
            4406 => Some(CloseCode::SubprotocolNotAcceptable),
            4408 => Some(CloseCode::ConnectionInitialisationTimeout),
            4409 => Some(CloseCode::SubscriberAlreadyExists),
            4429 => Some(CloseCode::TooManyInitialisationRequests),
            4500 => Some(CloseCode::InternalServerError),
            _ => None,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A close frame: code plus reason text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    pub code: CloseCode,
    pub reason: String,
}

impl Close {
    /// Close with the code's default reason.
    pub fn new(code: CloseCode) -> Self {
        Self {
            code,
            reason: code.reason().to_string(),
        }
    }

    /// Close with a custom reason.
    pub fn with_reason(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close for a reused operation id.
    pub fn subscriber_exists(id: &str) -> Self {
        Self::with_reason(
            CloseCode::SubscriberAlreadyExists,
            format!("Subscriber for {} already exists", id),
        )
    }
}

impl From<CloseCode> for Close {
    fn from(code: CloseCode) -> Self {
        Close::new(code)
    }
}
