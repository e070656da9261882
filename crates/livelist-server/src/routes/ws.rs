//! WebSocket upgrade and socket pump for transport sessions.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use livelist_proto::{framing, handshake, Close, CloseCode, SUBPROTOCOL};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::session::{ConnectionInfo, Inbound, Outbound, SessionConfig, TransportSession};
use crate::AppState;

/// WebSocket upgrade handler.
///
/// Plain `GET` requests without an upgrade are rejected. Clients that do not
/// offer the graphql-transport-ws subprotocol are upgraded and then closed
/// with 4406.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, AppError> {
    let Some(ws) = ws else {
        return Err(AppError::BadRequest(
            "WebSocket upgrade required".to_string(),
        ));
    };

    let negotiated = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .and_then(handshake::negotiate_subprotocol)
        .is_some();

    let info = state.connections.open()?;
    let failed_id = info.id.clone();
    let connections = Arc::clone(&state.connections);

    Ok(ws
        .protocols([SUBPROTOCOL])
        .max_message_size(state.config.max_message_size.saturating_mul(2))
        .on_failed_upgrade(move |err| {
            tracing::warn!(connection_id = %failed_id, error = %err, "websocket upgrade failed");
            connections.close(&failed_id);
        })
        .on_upgrade(move |socket| handle_socket(socket, state, info, negotiated)))
}

fn close_message(close: &Close) -> Message {
    Message::Close(Some(CloseFrame {
        code: close.code.code(),
        reason: close.reason.clone().into(),
    }))
}

/// Run a transport session over an upgraded socket.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    info: Arc<ConnectionInfo>,
    negotiated: bool,
) {
    let (mut sink, stream) = socket.split();

    if !negotiated {
        tracing::debug!(connection_id = %info.id, "subprotocol not acceptable");
        let close = Close::new(CloseCode::SubprotocolNotAcceptable);
        let _ = sink.send(close_message(&close)).await;
        state.connections.close(&info.id);
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let session = TransportSession::new(
        Arc::clone(&info),
        Arc::clone(&state.schema),
        SessionConfig::from(state.config.as_ref()),
        tx,
    );

    let writer_id = info.id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                Outbound::Message(message) => match framing::encode(&message) {
                    Ok(text) => Message::Text(text),
                    Err(err) => {
                        tracing::error!(connection_id = %writer_id, error = %err, "failed to encode frame");
                        let _ = sink
                            .send(close_message(&Close::new(CloseCode::InternalServerError)))
                            .await;
                        break;
                    }
                },
                Outbound::Close(close) => {
                    let _ = sink.send(close_message(&close)).await;
                    break;
                }
            };

            if let Err(err) = sink.send(message).await {
                tracing::debug!(connection_id = %writer_id, error = %err, "socket write failed");
                break;
            }
        }
    });

    let inbound = stream.filter_map(|message| async move {
        match message {
            Ok(Message::Text(text)) => Some(Inbound::Text(text)),
            Ok(Message::Binary(bytes)) => {
                Some(Inbound::Text(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Ok(Message::Close(_)) => Some(Inbound::Close),
            Err(err) => {
                tracing::debug!(error = %err, "websocket read failed");
                Some(Inbound::Close)
            }
        }
    });

    session.run(Box::pin(inbound)).await;

    if writer.await.is_err() {
        tracing::warn!(connection_id = %info.id, "socket writer panicked");
    }
    state.connections.close(&info.id);
}
