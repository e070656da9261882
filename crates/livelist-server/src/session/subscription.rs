//! Active subscriptions of one connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use livelist_core::{Canceller, Snapshot, SubscriptionStream};
use livelist_proto::{error_codes, framing, GraphQLError, ServerMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::manager::ConnectionInfo;
use super::Outbound;
use crate::schema::{PreparedOperation, Schema};

struct ActiveSubscription {
    /// Distinguishes reuses of the same operation id.
    token: u64,
    canceller: Canceller<Snapshot>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ActiveSubscription {
    fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(Outbound::Message(message)).is_ok()
    }
}

/// Operation ids with a live stream, and their cancellers.
///
/// Frames for an operation are only sent while its entry is present, under
/// the table lock, so once [`SubscriptionTable::cancel`] returns no further
/// frame for that id reaches the outbound queue.
///
/// A fault while rendering one event ends only that operation: it gets a
/// single `error` frame and the other ids keep streaming.
#[derive(Clone)]
pub struct SubscriptionTable {
    entries: Arc<Mutex<HashMap<String, ActiveSubscription>>>,
    next_token: Arc<AtomicU64>,
    max_message_size: usize,
    info: Arc<ConnectionInfo>,
}

impl SubscriptionTable {
    /// Create an empty table reporting its size to `info`.
    pub fn new(info: Arc<ConnectionInfo>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            max_message_size: framing::MAX_MESSAGE_SIZE,
            info,
        }
    }

    /// Limit the encoded size of `next` frames. A larger event faults its
    /// operation.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Check whether `id` is active.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check whether no subscription is active.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Active operation ids.
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Register `stream` under `id` and start forwarding its values.
    pub(crate) fn start(
        &self,
        id: String,
        stream: SubscriptionStream<Snapshot>,
        schema: Arc<Schema>,
        operation: Arc<PreparedOperation>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> JoinHandle<()> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.entries.lock();
            entries.insert(
                id.clone(),
                ActiveSubscription {
                    token,
                    canceller: stream.canceller(),
                    outbound,
                },
            );
            self.info.set_subscription_count(entries.len());
        }
        tracing::debug!(
            connection_id = %self.info.id,
            operation_id = %id,
            channel = stream.channel(),
            "subscription started"
        );

        tokio::spawn(forward(self.clone(), id, token, stream, schema, operation))
    }

    /// Remove and cancel `id`. Returns `false` if it was not active.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.remove(id, None, None);
        if removed {
            tracing::debug!(connection_id = %self.info.id, operation_id = %id, "subscription cancelled");
        }
        removed
    }

    /// End `id` from the server side.
    ///
    /// Queues `complete` as the last frame for the operation, then cancels
    /// its stream. Returns `false` if it was not active.
    pub fn terminate(&self, id: &str) -> bool {
        let removed = self.remove(id, None, Some(ServerMessage::complete(id)));
        if removed {
            tracing::debug!(connection_id = %self.info.id, operation_id = %id, "subscription completed by server");
        }
        removed
    }

    /// Cancel every active subscription. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ActiveSubscription> = {
            let mut entries = self.entries.lock();
            let drained = entries.drain().map(|(_, sub)| sub).collect();
            self.info.set_subscription_count(0);
            drained
        };

        for sub in &drained {
            sub.canceller.cancel();
        }
        drained.len()
    }

    /// Queue `message` if `id` is still active with `token`.
    fn send_if_active(&self, id: &str, token: u64, message: ServerMessage) -> bool {
        let entries = self.entries.lock();
        match entries.get(id) {
            Some(sub) if sub.token == token => sub.send(message),
            _ => false,
        }
    }

    /// Remove `id`, only while it still carries `token` if one is given.
    ///
    /// `last` is queued under the lock, so nothing for `id` can follow it.
    /// The stream is cancelled after the lock is released.
    fn remove(&self, id: &str, token: Option<u64>, last: Option<ServerMessage>) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(id) {
                Some(sub) if token.map_or(true, |t| t == sub.token) => {
                    if let Some(message) = last {
                        sub.send(message);
                    }
                    let removed = entries.remove(id);
                    self.info.set_subscription_count(entries.len());
                    removed
                }
                _ => None,
            }
        };

        match removed {
            Some(sub) => {
                sub.canceller.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("connection_id", &self.info.id)
            .field("active", &self.len())
            .finish()
    }
}

async fn forward(
    table: SubscriptionTable,
    id: String,
    token: u64,
    mut stream: SubscriptionStream<Snapshot>,
    schema: Arc<Schema>,
    operation: Arc<PreparedOperation>,
) {
    while let Some(snapshot) = stream.next().await {
        let message = match render_next(&id, &schema, &operation, &snapshot, table.max_message_size) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(
                    connection_id = %table.info.id,
                    operation_id = %id,
                    error = %error.message,
                    "subscription event failed"
                );
                table.remove(&id, Some(token), Some(ServerMessage::error(id.as_str(), vec![error])));
                return;
            }
        };

        tracing::trace!(operation_id = %id, items = snapshot.len(), "forwarding snapshot");
        if !table.send_if_active(&id, token, message) {
            return;
        }
    }

    // The listener left the registry without a client `complete`.
    table.remove(&id, Some(token), Some(ServerMessage::complete(id.as_str())));
}

/// Resolve one snapshot into the `next` frame for `id`.
fn render_next(
    id: &str,
    schema: &Schema,
    operation: &PreparedOperation,
    snapshot: &Snapshot,
    max_message_size: usize,
) -> Result<ServerMessage, GraphQLError> {
    let message = ServerMessage::next(id, schema.resolve_event(operation, snapshot));
    let size = framing::encode(&message).map_err(event_error)?.len();
    framing::check_size(size, max_message_size).map_err(event_error)?;
    Ok(message)
}

fn event_error(err: livelist_proto::Error) -> GraphQLError {
    GraphQLError::new(format!("Subscription event could not be delivered: {}", err))
        .with_code(error_codes::INTERNAL_SERVER_ERROR)
}
