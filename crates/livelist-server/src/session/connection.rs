//! graphql-transport-ws protocol state machine.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use livelist_proto::{
    framing, handshake, ClientMessage, Close, CloseCode, ServerMessage, SubscribePayload,
};
use tokio::sync::mpsc;

use super::manager::ConnectionInfo;
use super::subscription::SubscriptionTable;
use super::{Inbound, Outbound};
use crate::config::ServerConfig;
use crate::schema::Schema;

/// Per-connection protocol limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for `connection_init`.
    pub connection_init_timeout: Duration,
    /// Maximum text frame size in bytes, for client frames and for
    /// subscription events.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_init_timeout: Duration::from_secs(3),
            max_message_size: framing::MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            connection_init_timeout: config.connection_init_timeout,
            max_message_size: config.max_message_size,
        }
    }
}

/// Handshake state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for `connection_init`.
    AwaitingInit,
    /// `connection_ack` sent; operations are accepted.
    Ready,
    /// The connection is closing.
    Closed,
}

/// Server side of one graphql-transport-ws connection.
pub struct TransportSession {
    info: Arc<ConnectionInfo>,
    schema: Arc<Schema>,
    config: SessionConfig,
    phase: SessionPhase,
    subscriptions: SubscriptionTable,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportSession {
    /// Create a session writing frames to `outbound`.
    pub fn new(
        info: Arc<ConnectionInfo>,
        schema: Arc<Schema>,
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            subscriptions: SubscriptionTable::new(Arc::clone(&info))
                .with_max_message_size(config.max_message_size),
            info,
            schema,
            config,
            phase: SessionPhase::AwaitingInit,
            outbound,
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Current handshake state.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Active subscriptions.
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Complete subscription `id` from the server side.
    ///
    /// The client receives `complete` for `id` and nothing after it. Returns
    /// `false` if `id` was not active.
    pub fn complete(&self, id: &str) -> bool {
        self.subscriptions.terminate(id)
    }

    /// Handle one text frame.
    ///
    /// An `Err` means the connection must be closed with the returned code.
    pub fn handle_text(&mut self, text: &str) -> Result<(), Close> {
        let message = framing::decode_with_limit(text, self.config.max_message_size)
            .map_err(|err| {
                tracing::debug!(session_id = %self.info.id, error = %err, "rejecting frame");
                Close::with_reason(err.close_code(), err.to_string())
            })?;
        self.handle_message(message)
    }

    /// Handle one decoded client message.
    pub fn handle_message(&mut self, message: ClientMessage) -> Result<(), Close> {
        tracing::trace!(session_id = %self.info.id, kind = message.kind(), "client message");

        match message {
            ClientMessage::ConnectionInit { payload } => {
                if self.phase != SessionPhase::AwaitingInit {
                    return Err(CloseCode::TooManyInitialisationRequests.into());
                }
                handshake::validate_init_payload(payload.as_ref()).map_err(Close::from)?;
                self.phase = SessionPhase::Ready;
                self.send(handshake::acknowledge(None));
                tracing::debug!(session_id = %self.info.id, "connection acknowledged");
                Ok(())
            }
            ClientMessage::Ping { payload } => {
                self.send(ServerMessage::pong(payload));
                Ok(())
            }
            ClientMessage::Pong { .. } => Ok(()),
            ClientMessage::Subscribe { id, payload } => self.subscribe(id, payload),
            ClientMessage::Complete { id } => {
                if !self.subscriptions.cancel(&id) {
                    tracing::trace!(session_id = %self.info.id, operation_id = %id, "complete for inactive id");
                }
                Ok(())
            }
        }
    }

    fn subscribe(&mut self, id: String, payload: SubscribePayload) -> Result<(), Close> {
        if self.phase != SessionPhase::Ready {
            return Err(CloseCode::Unauthorized.into());
        }
        if self.subscriptions.contains(&id) {
            return Err(Close::subscriber_exists(&id));
        }

        let operation = match self.schema.prepare(&payload) {
            Ok(operation) => operation,
            Err(errors) => {
                tracing::debug!(
                    session_id = %self.info.id,
                    operation_id = %id,
                    errors = errors.len(),
                    "operation rejected"
                );
                self.send(ServerMessage::error(id, errors));
                return Ok(());
            }
        };

        if !operation.is_subscription() {
            let result = self.schema.execute(&operation);
            self.send(ServerMessage::next(id.as_str(), result));
            self.send(ServerMessage::complete(id));
            return Ok(());
        }

        match self.schema.subscribe(&operation) {
            Ok(stream) => {
                self.subscriptions.start(
                    id,
                    stream,
                    Arc::clone(&self.schema),
                    Arc::new(operation),
                    self.outbound.clone(),
                );
            }
            Err(err) => {
                tracing::warn!(session_id = %self.info.id, operation_id = %id, error = %err, "subscription failed to start");
                self.send(ServerMessage::error(id, vec![err]));
            }
        }
        Ok(())
    }

    /// Drive the session until the client leaves or a protocol error closes it.
    ///
    /// Every subscription is cancelled before this returns.
    pub async fn run<S>(mut self, mut inbound: S) -> Option<Close>
    where
        S: Stream<Item = Inbound> + Unpin,
    {
        let init_deadline = tokio::time::sleep(self.config.connection_init_timeout);
        tokio::pin!(init_deadline);

        let close = loop {
            tokio::select! {
                _ = &mut init_deadline, if self.phase == SessionPhase::AwaitingInit => {
                    break Some(Close::new(CloseCode::ConnectionInitialisationTimeout));
                }
                event = inbound.next() => match event {
                    Some(Inbound::Text(text)) => {
                        if let Err(close) = self.handle_text(&text) {
                            break Some(close);
                        }
                    }
                    Some(Inbound::Close) | None => break None,
                },
            }
        };

        if let Some(close) = &close {
            tracing::info!(
                session_id = %self.info.id,
                code = close.code.code(),
                reason = %close.reason,
                "closing connection"
            );
            let _ = self.outbound.send(Outbound::Close(close.clone()));
        }
        self.shutdown();
        close
    }

    /// Cancel every subscription and stop accepting messages.
    pub fn shutdown(&mut self) {
        self.phase = SessionPhase::Closed;
        let cancelled = self.subscriptions.cancel_all();
        if cancelled > 0 {
            tracing::debug!(session_id = %self.info.id, cancelled, "subscriptions cancelled");
        }
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).is_err() {
            tracing::trace!(session_id = %self.info.id, "outbound queue closed");
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.subscriptions.cancel_all();
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.info.id)
            .field("phase", &self.phase)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livelist_core::{ChannelRegistry, TodoList};
    use serde_json::json;

    fn session() -> (TransportSession, mpsc::UnboundedReceiver<Outbound>) {
        let todos = Arc::new(TodoList::new(Arc::new(ChannelRegistry::new())));
        let schema = Arc::new(Schema::new(todos));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = TransportSession::new(
            Arc::new(ConnectionInfo::with_id("test")),
            schema,
            SessionConfig::default(),
            tx,
        );
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_init_acknowledged() {
        let (mut session, mut rx) = session();
        session
            .handle_text(r#"{"type":"connection_init","payload":{}}"#)
            .unwrap();

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(
            drain(&mut rx),
            vec![Outbound::Message(ServerMessage::ack(None))]
        );
    }

    #[test]
    fn test_second_init_rejected() {
        let (mut session, _rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();

        let close = session
            .handle_message(ClientMessage::connection_init())
            .unwrap_err();
        assert_eq!(close.code, CloseCode::TooManyInitialisationRequests);
    }

    #[test]
    fn test_bad_init_payload() {
        let (mut session, _rx) = session();
        let close = session
            .handle_text(r#"{"type":"connection_init","payload":[1]}"#)
            .unwrap_err();
        assert_eq!(close.code, CloseCode::BadRequest);
    }

    #[test]
    fn test_subscribe_before_ack() {
        let (mut session, _rx) = session();
        let close = session
            .handle_message(ClientMessage::subscribe("1", "{ getTodos { id } }"))
            .unwrap_err();
        assert_eq!(close.code, CloseCode::Unauthorized);
    }

    #[test]
    fn test_ping_before_init() {
        let (mut session, mut rx) = session();
        session
            .handle_text(r#"{"type":"ping","payload":{"n":1}}"#)
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![Outbound::Message(ServerMessage::pong(Some(json!({ "n": 1 }))))]
        );
    }

    #[test]
    fn test_garbage_closes_with_bad_request() {
        let (mut session, _rx) = session();
        assert_eq!(
            session.handle_text("not json").unwrap_err().code,
            CloseCode::BadRequest
        );
        assert_eq!(
            session.handle_text(r#"{"type":"bogus"}"#).unwrap_err().code,
            CloseCode::BadRequest
        );
    }

    #[test]
    fn test_oversized_message() {
        let (mut session, _rx) = session();
        session.config.max_message_size = 16;
        let close = session
            .handle_text(r#"{"type":"connection_init","payload":{"token":"abcdef"}}"#)
            .unwrap_err();
        assert_eq!(close.code, CloseCode::BadRequest);
    }

    #[test]
    fn test_query_via_subscribe_completes() {
        let (mut session, mut rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        drain(&mut rx);

        session
            .handle_message(ClientMessage::subscribe("q", "{ getTodos { id } }"))
            .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            &frames[0],
            Outbound::Message(ServerMessage::Next { id, .. }) if id == "q"
        ));
        assert_eq!(frames[1], Outbound::Message(ServerMessage::complete("q")));
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_validation_failure_is_single_error() {
        let (mut session, mut rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        drain(&mut rx);

        session
            .handle_message(ClientMessage::subscribe("bad", "subscription { nope { id } }"))
            .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            &frames[0],
            Outbound::Message(ServerMessage::Error { id, payload }) if id == "bad" && payload.len() == 1
        ));
        assert!(!session.subscriptions().contains("bad"));
    }

    #[test]
    fn test_complete_unknown_id_ignored() {
        let (mut session, mut rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        drain(&mut rx);

        session.handle_message(ClientMessage::complete("ghost")).unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_subscription_id() {
        let (mut session, _rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        session
            .handle_message(ClientMessage::subscribe("s", "subscription { todos { id } }"))
            .unwrap();

        let close = session
            .handle_message(ClientMessage::subscribe("s", "subscription { todos { id } }"))
            .unwrap_err();
        assert_eq!(close.code, CloseCode::SubscriberAlreadyExists);
        assert_eq!(close.reason, "Subscriber for s already exists");
    }

    #[tokio::test]
    async fn test_id_reusable_after_complete() {
        let (mut session, _rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        let subscribe = || ClientMessage::subscribe("s", "subscription { todos { id } }");

        session.handle_message(subscribe()).unwrap();
        session.handle_message(ClientMessage::complete("s")).unwrap();
        session.handle_message(subscribe()).unwrap();
        assert!(session.subscriptions().contains("s"));
    }

    #[tokio::test]
    async fn test_server_complete_leaves_siblings_running() {
        let (mut session, mut rx) = session();
        session.handle_message(ClientMessage::connection_init()).unwrap();
        drain(&mut rx);
        for id in ["a", "b"] {
            session
                .handle_message(ClientMessage::subscribe(id, "subscription { todos { id } }"))
                .unwrap();
        }
        for _ in 0..2 {
            rx.recv().await.unwrap();
        }

        assert!(session.complete("a"));
        assert!(!session.complete("a"));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::complete("a")))
        );

        session.schema.todos().add_todo("x");
        match rx.recv().await {
            Some(Outbound::Message(ServerMessage::Next { id, .. })) => assert_eq!(id, "b"),
            other => panic!("expected next for b, got {:?}", other),
        }
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());

        session
            .handle_message(ClientMessage::subscribe("a", "subscription { todos { id } }"))
            .unwrap();
        assert!(session.subscriptions().contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout() {
        let (session, mut rx) = session();
        let (_client_tx, client_rx) = futures::channel::mpsc::unbounded::<Inbound>();

        let close = session.run(client_rx).await;

        let expected = Close::new(CloseCode::ConnectionInitialisationTimeout);
        assert_eq!(close, Some(expected.clone()));
        assert_eq!(drain(&mut rx), vec![Outbound::Close(expected)]);
    }
}
