//! In-memory todo list that publishes its full state after every change.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pubsub::{ChannelRegistry, SubscriptionStream};

/// Channel that carries todo list snapshots.
pub const TODOS_CHANNEL: &str = "todos";

/// A single todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub done: bool,
}

impl Todo {
    /// Create an open todo.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            done: false,
        }
    }
}

/// Immutable full copy of the list, as delivered to subscribers.
pub type Snapshot = Arc<Vec<Todo>>;

/// The shared todo list.
///
/// Mutations are serialized, and each one publishes the resulting list on
/// [`TODOS_CHANNEL`] before the next mutation starts, so subscribers see
/// snapshots in mutation order.
pub struct TodoList {
    registry: Arc<ChannelRegistry<Snapshot>>,
    todos: RwLock<Vec<Todo>>,
    /// Held across mutate-then-publish.
    write_lock: Mutex<()>,
}

impl TodoList {
    /// Create an empty list publishing through `registry`.
    pub fn new(registry: Arc<ChannelRegistry<Snapshot>>) -> Self {
        Self::with_todos(registry, Vec::new())
    }

    /// Create a list with initial contents.
    pub fn with_todos(registry: Arc<ChannelRegistry<Snapshot>>, todos: Vec<Todo>) -> Self {
        Self {
            registry,
            todos: RwLock::new(todos),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a list holding the demo item.
    pub fn with_seed(registry: Arc<ChannelRegistry<Snapshot>>) -> Self {
        Self::with_todos(registry, vec![Todo::new("1", "Learn GraphQL + Solid")])
    }

    /// The registry this list publishes to.
    pub fn registry(&self) -> &Arc<ChannelRegistry<Snapshot>> {
        &self.registry
    }

    /// Current contents.
    pub fn todos(&self) -> Vec<Todo> {
        self.todos.read().clone()
    }

    /// Current contents as a shareable snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Arc::new(self.todos())
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.todos.read().len()
    }

    /// Check whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.todos.read().is_empty()
    }

    /// Append a todo and publish the new list.
    ///
    /// The id is the list length after insertion.
    pub fn add_todo(&self, text: impl Into<String>) -> Todo {
        let _guard = self.write_lock.lock();

        let (todo, snapshot) = {
            let mut todos = self.todos.write();
            let todo = Todo::new((todos.len() + 1).to_string(), text);
            todos.push(todo.clone());
            (todo, Arc::new(todos.clone()))
        };

        let delivered = self.registry.publish(TODOS_CHANNEL, snapshot);
        tracing::debug!(id = %todo.id, delivered, "todo added");
        todo
    }

    /// Set the `done` flag of a todo and publish the new list.
    ///
    /// A missing id fails with [`Error::NotFound`] and publishes nothing.
    pub fn set_done(&self, id: &str, done: bool) -> Result<Todo> {
        let _guard = self.write_lock.lock();

        let (todo, snapshot) = {
            let mut todos = self.todos.write();
            let todo = todos
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| Error::NotFound("Todo not found".to_string()))?;
            todo.done = done;
            let todo = todo.clone();
            (todo, Arc::new(todos.clone()))
        };

        let delivered = self.registry.publish(TODOS_CHANNEL, snapshot);
        tracing::debug!(id, done, delivered, "todo updated");
        Ok(todo)
    }

    /// Open a live stream of list snapshots, starting with the current list.
    pub fn subscribe(&self) -> Result<SubscriptionStream<Snapshot>> {
        SubscriptionStream::open(&self.registry, TODOS_CHANNEL, || Ok(self.snapshot()))
    }
}

impl std::fmt::Debug for TodoList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoList")
            .field("todos", &*self.todos.read())
            .finish()
    }
}

/// Shared todo list handle.
pub type SharedTodoList = Arc<TodoList>;
