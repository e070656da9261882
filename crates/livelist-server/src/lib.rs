//! livelist server.
//!
//! Serves the live todo list over GraphQL: queries and mutations via
//! `POST /graphql`, and subscriptions over WebSocket using the
//! graphql-transport-ws subprotocol on `GET /graphql`.

pub mod config;
pub mod error;
pub mod routes;
pub mod schema;
pub mod session;

pub use config::{Args, ServerConfig};
pub use error::{AppError, Error, Result};
pub use schema::{PreparedOperation, Schema};
pub use session::{ConnectionManager, TransportSession};

use std::sync::Arc;

use axum::Router;
use livelist_core::{ChannelRegistry, Snapshot, TodoList};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Channel registry shared by sessions and the todo list.
    pub registry: Arc<ChannelRegistry<Snapshot>>,
    /// The todo list.
    pub todos: Arc<TodoList>,
    /// Executable schema over the todo list.
    pub schema: Arc<Schema>,
    /// Live WebSocket connections.
    pub connections: Arc<ConnectionManager>,
}

impl AppState {
    /// Create application state with a fresh registry and list.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let todos = if config.seed_demo {
            TodoList::with_seed(Arc::clone(&registry))
        } else {
            TodoList::new(Arc::clone(&registry))
        };
        let todos = Arc::new(todos);

        Self {
            schema: Arc::new(Schema::new(Arc::clone(&todos))),
            connections: Arc::new(ConnectionManager::new(config.max_connections)),
            config: Arc::new(config),
            registry,
            todos,
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::graphql::routes(&state.config.graphql_path))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
