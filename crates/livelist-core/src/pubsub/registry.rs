//! Named-channel registry for publishing payloads to listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Identifier of a registered listener, unique within one registry.
pub type ListenerId = u64;

/// Handle identifying a registered listener and the channel it listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: ListenerId,
    channel: Arc<str>,
}

impl ListenerHandle {
    /// Listener id.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Channel the listener is registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// A registered listener: its handle plus the queue the registry feeds.
#[derive(Debug)]
pub struct Listener<T> {
    handle: ListenerHandle,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Listener<T> {
    /// Handle used to unsubscribe.
    pub fn handle(&self) -> &ListenerHandle {
        &self.handle
    }

    /// Wait for the next payload. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take a payload if one is queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Split into handle and queue.
    pub fn into_parts(self) -> (ListenerHandle, mpsc::UnboundedReceiver<T>) {
        (self.handle, self.receiver)
    }
}

/// Registry of channels and their listeners.
///
/// Each listener owns an unbounded queue, so `publish` never waits on a slow
/// consumer: it pushes a clone of the payload into every queue and returns.
/// Channels are created on first subscribe and removed when their last
/// listener leaves.
pub struct ChannelRegistry<T> {
    /// Listener queues keyed by channel name.
    channels: DashMap<Arc<str>, HashMap<ListenerId, mpsc::UnboundedSender<T>>>,
    /// Next listener ID.
    next_listener_id: AtomicU64,
}

impl<T> ChannelRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Register a listener on `channel`, creating the channel if absent.
    pub fn subscribe(&self, channel: &str) -> Listener<T> {
        let (listener, sender) = self.new_listener(channel);
        self.channels
            .entry(Arc::clone(&listener.handle.channel))
            .or_default()
            .insert(listener.handle.id, sender);

        tracing::debug!(listener_id = listener.handle.id, channel, "listener registered");
        listener
    }

    /// Register a listener and evaluate `snapshot` in one step.
    ///
    /// No publish on `channel` can interleave between the registration and
    /// the snapshot: a publish that happened before is reflected in the
    /// snapshot, and one that happens after is delivered to the listener.
    /// If `snapshot` fails the listener is not registered. `snapshot` runs
    /// while the channel is locked and must not call back into the registry.
    pub fn subscribe_with<S, E, F>(&self, channel: &str, snapshot: F) -> Result<(Listener<T>, S), E>
    where
        F: FnOnce() -> Result<S, E>,
    {
        let (listener, sender) = self.new_listener(channel);
        let mut entry = self
            .channels
            .entry(Arc::clone(&listener.handle.channel))
            .or_default();

        let value = match snapshot() {
            Ok(value) => value,
            Err(e) => {
                let empty = entry.is_empty();
                drop(entry);
                if empty {
                    self.channels.remove_if(channel, |_, l| l.is_empty());
                }
                return Err(e);
            }
        };
        entry.insert(listener.handle.id, sender);
        drop(entry);

        tracing::debug!(listener_id = listener.handle.id, channel, "listener registered with snapshot");
        Ok((listener, value))
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, handle: &ListenerHandle) -> bool {
        let removed = match self.channels.get_mut(handle.channel()) {
            Some(mut listeners) => listeners.remove(&handle.id).is_some(),
            None => false,
        };
        self.channels.remove_if(handle.channel(), |_, l| l.is_empty());

        if removed {
            tracing::debug!(listener_id = handle.id, channel = handle.channel(), "listener removed");
        }
        removed
    }

    /// Number of channels with at least one open listener.
    pub fn channel_count(&self) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.value().values().any(|tx| !tx.is_closed()))
            .count()
    }

    /// Total number of open listeners across all channels.
    ///
    /// A listener dropped without unsubscribing stops counting at once and is
    /// removed on the next publish to its channel.
    pub fn listener_count(&self) -> usize {
        self.channels.iter().map(|entry| open_listeners(entry.value())).sum()
    }

    /// Number of open listeners on one channel.
    pub fn listeners_on(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|l| open_listeners(&l)).unwrap_or(0)
    }

    fn new_listener(&self, channel: &str) -> (Listener<T>, mpsc::UnboundedSender<T>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = ListenerHandle {
            id,
            channel: Arc::from(channel),
        };
        (Listener { handle, receiver }, sender)
    }
}

impl<T: Clone> ChannelRegistry<T> {
    /// Deliver `payload` to every listener on `channel`.
    ///
    /// Returns the number of listeners the payload was queued for. Publishing
    /// to a channel without listeners does nothing. Listeners whose queue was
    /// dropped without unsubscribing are removed here, along with the channel
    /// if none remain.
    pub fn publish(&self, channel: &str, payload: T) -> usize {
        let Some(mut listeners) = self.channels.get_mut(channel) else {
            tracing::trace!(channel, "publish without listeners");
            return 0;
        };

        let before = listeners.len();
        listeners.retain(|_, sender| sender.send(payload.clone()).is_ok());
        let delivered = listeners.len();
        let empty = listeners.is_empty();
        drop(listeners);

        if delivered < before {
            tracing::debug!(channel, pruned = before - delivered, "closed listeners removed");
        }
        if empty {
            self.channels.remove_if(channel, |_, l| l.is_empty());
        }

        tracing::trace!(channel, delivered, "published");
        delivered
    }
}

impl<T> Default for ChannelRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ChannelRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channel_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn open_listeners<T>(listeners: &HashMap<ListenerId, mpsc::UnboundedSender<T>>) -> usize {
    listeners.values().filter(|tx| !tx.is_closed()).count()
}

/// Shared registry handle.
pub type SharedRegistry<T> = Arc<ChannelRegistry<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let registry: ChannelRegistry<u32> = ChannelRegistry::new();

        let listener = registry.subscribe("todos");
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.listeners_on("todos"), 1);

        assert!(registry.unsubscribe(listener.handle()));
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_idempotent() {
        let registry: ChannelRegistry<u32> = ChannelRegistry::new();
        let listener = registry.subscribe("todos");
        let other = registry.subscribe("todos");

        assert!(registry.unsubscribe(listener.handle()));
        assert!(!registry.unsubscribe(listener.handle()));
        assert_eq!(registry.listeners_on("todos"), 1);

        assert!(registry.unsubscribe(other.handle()));
        assert!(!registry.unsubscribe(other.handle()));
        assert_eq!(registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_in_order() {
        let registry = ChannelRegistry::new();
        let mut listener = registry.subscribe("todos");

        for i in 0..5u32 {
            assert_eq!(registry.publish("todos", i), 1);
        }

        for i in 0..5u32 {
            assert_eq!(listener.recv().await, Some(i));
        }
        assert_eq!(listener.try_recv(), None);
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let registry: ChannelRegistry<u32> = ChannelRegistry::new();
        assert_eq!(registry.publish("nobody", 1), 0);
        assert_eq!(registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let registry = ChannelRegistry::new();
        let mut a = registry.subscribe("a");
        let mut b = registry.subscribe("b");

        registry.publish("a", 1u32);

        assert_eq!(a.try_recv(), Some(1));
        assert_eq!(b.try_recv(), None);
    }

    #[tokio::test]
    async fn test_unsubscribed_listener_drains_then_ends() {
        let registry = ChannelRegistry::new();
        let mut listener = registry.subscribe("todos");

        registry.publish("todos", 7u32);
        registry.unsubscribe(listener.handle());
        registry.publish("todos", 8u32);

        assert_eq!(listener.recv().await, Some(7));
        assert_eq!(listener.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscribe_with_failed_snapshot() {
        let registry: ChannelRegistry<u32> = ChannelRegistry::new();

        let result = registry.subscribe_with("todos", || Err::<u32, &str>("boom"));
        assert_eq!(result.err(), Some("boom"));
        assert_eq!(registry.channel_count(), 0);

        let (listener, snapshot) = registry
            .subscribe_with("todos", || Ok::<_, ()>(3u32))
            .unwrap();
        assert_eq!(snapshot, 3);
        assert_eq!(registry.listeners_on(listener.handle().channel()), 1);
    }

    #[tokio::test]
    async fn test_dropped_listeners_are_removed() {
        let registry = ChannelRegistry::new();
        let mut kept = registry.subscribe("todos");
        for _ in 0..10 {
            drop(registry.subscribe("todos"));
        }
        drop(registry.subscribe("other"));

        assert_eq!(registry.listener_count(), 1);
        assert_eq!(registry.listeners_on("todos"), 1);
        assert_eq!(registry.channel_count(), 1);

        assert_eq!(registry.publish("todos", 1u32), 1);
        assert_eq!(registry.publish("other", 1u32), 0);
        assert_eq!(registry.channels.get("todos").map(|l| l.len()), Some(1));
        assert!(registry.channels.get("other").is_none());
        assert_eq!(kept.try_recv(), Some(1));

        drop(kept);
        assert_eq!(registry.listener_count(), 0);
        assert_eq!(registry.publish("todos", 2u32), 0);
        assert_eq!(registry.channels.len(), 0);
    }

    #[test]
    fn test_listener_ids_unique() {
        let registry: ChannelRegistry<u32> = ChannelRegistry::new();
        let a = registry.subscribe("x");
        let b = registry.subscribe("x");
        assert_ne!(a.handle().id(), b.handle().id());
        assert_eq!(a.handle().channel(), "x");
    }
}
