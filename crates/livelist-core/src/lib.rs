//! livelist core: live broadcast of a shared list.
//!
//! # Modules
//!
//! - [`pubsub`] - Channel registry and subscription streams
//! - [`store`] - The shared todo list, publishing after every mutation
//! - [`error`] - Core error types
//!
//! ```
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use livelist_core::{ChannelRegistry, TodoList};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let list = TodoList::new(Arc::new(ChannelRegistry::new()));
//! let mut stream = list.subscribe().unwrap();
//!
//! list.add_todo("write docs");
//!
//! assert!(stream.next().await.unwrap().is_empty());
//! assert_eq!(stream.next().await.unwrap()[0].text, "write docs");
//! # }
//! ```

pub mod error;
pub mod pubsub;
pub mod store;

pub use error::{Error, Result};
pub use pubsub::{Canceller, ChannelRegistry, Listener, ListenerHandle, SubscriptionStream};
pub use store::{SharedTodoList, Snapshot, Todo, TodoList, TODOS_CHANNEL};
