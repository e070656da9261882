//! Client and server message types.
//!
//! Every message is a JSON object tagged by its `"type"` field, following the
//! `graphql-transport-ws` subprotocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// A message sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Connection handshake. Must be the first message on a connection.
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Liveness probe. Answered with a pong carrying the same payload.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Answer to a server ping.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Start an operation under a client-chosen id.
    Subscribe { id: String, payload: SubscribePayload },
    /// Stop the operation with the given id.
    Complete { id: String },
}

impl ClientMessage {
    /// Create a `connection_init` message without a payload.
    pub fn connection_init() -> Self {
        ClientMessage::ConnectionInit { payload: None }
    }

    /// Create a `subscribe` message for a query document.
    pub fn subscribe(id: impl Into<String>, query: impl Into<String>) -> Self {
        ClientMessage::Subscribe {
            id: id.into(),
            payload: SubscribePayload::new(query),
        }
    }

    /// Create a `complete` message.
    pub fn complete(id: impl Into<String>) -> Self {
        ClientMessage::Complete { id: id.into() }
    }

    /// Check the structural rules serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ClientMessage::Subscribe { id, payload } => {
                if id.is_empty() {
                    return Err(Error::InvalidMessage(
                        "subscribe message requires a non-empty id".to_string(),
                    ));
                }
                if payload.query.is_empty() {
                    return Err(Error::InvalidMessage(
                        "subscribe payload requires a query".to_string(),
                    ));
                }
                Ok(())
            }
            ClientMessage::Complete { id } if id.is_empty() => Err(Error::InvalidMessage(
                "complete message requires a non-empty id".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::ConnectionInit { .. } => "connection_init",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Pong { .. } => "pong",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Complete { .. } => "complete",
        }
    }
}

/// The operation carried by a `subscribe` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Operation document source.
    pub query: String,
    /// Which operation of the document to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variable values keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Free-form extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl SubscribePayload {
    /// Create a payload for a query document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
            extensions: None,
        }
    }

    /// Select an operation by name.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set the variable values.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// A message sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Liveness probe.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Answer to a client ping.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// One result of an operation.
    Next { id: String, payload: ExecutionResult },
    /// Terminal failure of an operation.
    Error { id: String, payload: Vec<GraphQLError> },
    /// The operation finished; no more messages follow for this id.
    Complete { id: String },
}

impl ServerMessage {
    /// Create a `connection_ack` message.
    pub fn ack(payload: Option<Value>) -> Self {
        ServerMessage::ConnectionAck { payload }
    }

    /// Create a `pong` message echoing a ping payload.
    pub fn pong(payload: Option<Value>) -> Self {
        ServerMessage::Pong { payload }
    }

    /// Create a `next` message.
    pub fn next(id: impl Into<String>, payload: ExecutionResult) -> Self {
        ServerMessage::Next {
            id: id.into(),
            payload,
        }
    }

    /// Create an `error` message.
    pub fn error(id: impl Into<String>, errors: Vec<GraphQLError>) -> Self {
        ServerMessage::Error {
            id: id.into(),
            payload: errors,
        }
    }

    /// Create a `complete` message.
    pub fn complete(id: impl Into<String>) -> Self {
        ServerMessage::Complete { id: id.into() }
    }

    /// The operation id this message belongs to, if any.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Next { id, .. }
            | ServerMessage::Error { id, .. }
            | ServerMessage::Complete { id } => Some(id),
            _ => None,
        }
    }
}

/// Result of executing an operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result data, `None` when execution did not start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Field errors raised while executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl ExecutionResult {
    /// A successful result.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// A result carrying only errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Attach an error to the result.
    pub fn with_error(mut self, error: GraphQLError) -> Self {
        self.errors.get_or_insert_with(Vec::new).push(error);
        self
    }

    /// Check whether the result carries errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// An error as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human readable description.
    pub message: String,
    /// Source positions the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Machine readable details (e.g. an error code).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    /// Add a source location (1-based line and column).
    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.locations
            .get_or_insert_with(Vec::new)
            .push(Location { line, column });
        self
    }

    /// Set the response path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Set the `code` extension.
    pub fn with_code(mut self, code: &str) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".to_string(), Value::String(code.to_string()));
        self
    }

    /// The `code` extension, if set.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A 1-based position in an operation document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One step of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(field: &str) -> Self {
        PathSegment::Field(field.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Error codes placed in `extensions.code`.
pub mod error_codes {
    /// The document failed to parse.
    pub const GRAPHQL_PARSE_FAILED: &str = "GRAPHQL_PARSE_FAILED";
    /// The document does not match the schema.
    pub const GRAPHQL_VALIDATION_FAILED: &str = "GRAPHQL_VALIDATION_FAILED";
    /// A variable value is missing or of the wrong type.
    pub const BAD_USER_INPUT: &str = "BAD_USER_INPUT";
    /// The requested item does not exist.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Resolution failed on the server.
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "subscribe",
            "id": "1",
            "payload": {
                "query": "subscription { todos { id } }",
                "operationName": "TodosSub",
                "variables": { "a": 1 }
            }
        }))
        .unwrap();

        match msg {
            ClientMessage::Subscribe { id, payload } => {
                assert_eq!(id, "1");
                assert_eq!(payload.operation_name.as_deref(), Some("TodosSub"));
                assert_eq!(payload.variables.unwrap()["a"], json!(1));
            }
            other => panic!("expected Subscribe, got {:?}", other),
        }

        let init: ClientMessage =
            serde_json::from_value(json!({ "type": "connection_init" })).unwrap();
        assert_eq!(init, ClientMessage::connection_init());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "start", "id": "1" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        assert!(ClientMessage::subscribe("", "{ getTodos { id } }")
            .validate()
            .is_err());
        assert!(ClientMessage::subscribe("a", "").validate().is_err());
        assert!(ClientMessage::complete("").validate().is_err());
        assert!(ClientMessage::subscribe("a", "{ getTodos { id } }")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::next("7", ExecutionResult::data(json!({ "todos": [] })));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "type": "next", "id": "7", "payload": { "data": { "todos": [] } } })
        );

        let ack = serde_json::to_value(ServerMessage::ack(None)).unwrap();
        assert_eq!(ack, json!({ "type": "connection_ack" }));
    }

    #[test]
    fn test_error_message_shape() {
        let err = GraphQLError::new("Todo not found")
            .with_location(1, 12)
            .with_path(vec!["setDone".into()])
            .with_code(error_codes::NOT_FOUND);
        assert_eq!(err.code(), Some(error_codes::NOT_FOUND));

        let value = serde_json::to_value(ServerMessage::error("3", vec![err])).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"][0]["message"], "Todo not found");
        assert_eq!(value["payload"][0]["locations"][0], json!({ "line": 1, "column": 12 }));
        assert_eq!(value["payload"][0]["path"], json!(["setDone"]));
    }

    #[test]
    fn test_operation_id() {
        assert_eq!(ServerMessage::complete("x").operation_id(), Some("x"));
        assert_eq!(ServerMessage::pong(None).operation_id(), None);
    }
}
