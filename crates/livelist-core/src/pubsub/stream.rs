//! Subscription streams: an initial snapshot followed by live channel payloads.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::registry::{ChannelRegistry, ListenerHandle};

struct Shared<T> {
    registry: Arc<ChannelRegistry<T>>,
    handle: ListenerHandle,
    cancelled: AtomicBool,
}

/// Cancels a [`SubscriptionStream`] from outside the task polling it.
pub struct Canceller<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Canceller<T> {
    /// Stop the stream and release its listener.
    ///
    /// Returns `true` for the call that performed the cancellation; later
    /// calls do nothing and return `false`.
    pub fn cancel(&self) -> bool {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shared.registry.unsubscribe(&self.shared.handle);
        tracing::trace!(
            listener_id = self.shared.handle.id(),
            channel = self.shared.handle.channel(),
            "subscription stream cancelled"
        );
        true
    }

    /// Whether the stream has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Handle of the underlying listener.
    pub fn handle(&self) -> &ListenerHandle {
        &self.shared.handle
    }
}

impl<T> Clone for Canceller<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Canceller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller")
            .field("handle", &self.shared.handle)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Lazy, unbounded stream of channel payloads.
///
/// The first item is the snapshot captured when the stream was opened; every
/// following item is a payload published on the channel afterwards, in
/// publish order. The stream ends only when cancelled, either explicitly or
/// by dropping it.
pub struct SubscriptionStream<T> {
    initial: Option<T>,
    receiver: mpsc::UnboundedReceiver<T>,
    canceller: Canceller<T>,
}

impl<T> SubscriptionStream<T> {
    /// Open a stream on `channel`.
    ///
    /// `snapshot` is evaluated once, atomically with listener registration,
    /// and becomes the first item. A failing snapshot leaves nothing
    /// registered.
    pub fn open<E, F>(
        registry: &Arc<ChannelRegistry<T>>,
        channel: &str,
        snapshot: F,
    ) -> Result<Self, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let (listener, initial) = registry.subscribe_with(channel, snapshot)?;
        let (handle, receiver) = listener.into_parts();

        Ok(Self {
            initial: Some(initial),
            receiver,
            canceller: Canceller {
                shared: Arc::new(Shared {
                    registry: Arc::clone(registry),
                    handle,
                    cancelled: AtomicBool::new(false),
                }),
            },
        })
    }

    /// Stop the stream. Redundant calls are no-ops.
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// Whether the stream has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    /// A handle that can cancel this stream from another task.
    pub fn canceller(&self) -> Canceller<T> {
        self.canceller.clone()
    }

    /// Channel the stream listens on.
    pub fn channel(&self) -> &str {
        self.canceller.handle().channel()
    }
}

// No field is ever pinned.
impl<T> Unpin for SubscriptionStream<T> {}

impl<T> Stream for SubscriptionStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.canceller.is_cancelled() {
            return Poll::Ready(None);
        }
        if let Some(initial) = this.initial.take() {
            return Poll::Ready(Some(initial));
        }
        this.receiver.poll_recv(cx)
    }
}

impl<T> Drop for SubscriptionStream<T> {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

impl<T> std::fmt::Debug for SubscriptionStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("channel", &self.channel())
            .field("initial_pending", &self.initial.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
