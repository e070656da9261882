//! Publish/subscribe infrastructure for live updates.
//!
//! A [`ChannelRegistry`] fans payloads out to listeners by channel name. A
//! [`SubscriptionStream`] pairs a listener with an initial snapshot so a new
//! subscriber sees the current state first and every later publish after it.

mod registry;
mod stream;

pub use registry::{ChannelRegistry, Listener, ListenerHandle, ListenerId, SharedRegistry};
pub use stream::{Canceller, SubscriptionStream};
