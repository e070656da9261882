//! Server configuration.

use std::time::Duration;

use clap::Parser;

/// Default host to bind to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default GraphQL endpoint path.
pub const DEFAULT_GRAPHQL_PATH: &str = "/graphql";

/// Default wait for `connection_init`, in milliseconds.
pub const DEFAULT_CONNECTION_INIT_TIMEOUT_MS: u64 = 3000;

/// Default maximum message size in kilobytes.
pub const DEFAULT_MAX_MESSAGE_KB: usize = 1024;

/// Default maximum concurrent WebSocket connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// livelist server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path serving GraphQL over HTTP and WebSocket.
    pub graphql_path: String,
    /// How long a new connection may wait before sending `connection_init`.
    pub connection_init_timeout: Duration,
    /// Maximum size of one client message in bytes.
    pub max_message_size: usize,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seed the list with the demo todo.
    pub seed_demo: bool,
}

impl ServerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            connection_init_timeout: Duration::from_millis(DEFAULT_CONNECTION_INIT_TIMEOUT_MS),
            max_message_size: DEFAULT_MAX_MESSAGE_KB * 1024,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            seed_demo: false,
        }
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the GraphQL endpoint path. A leading `/` is added if missing.
    pub fn with_graphql_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.graphql_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Set the `connection_init` wait timeout.
    pub fn with_connection_init_timeout(mut self, timeout: Duration) -> Self {
        self.connection_init_timeout = timeout;
        self
    }

    /// Set the maximum message size in bytes.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the maximum number of concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Seed the list with the demo todo.
    pub fn with_seed_demo(mut self, seed: bool) -> Self {
        self.seed_demo = seed;
        self
    }

    /// Socket address string to bind to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// HTTP URL of the GraphQL endpoint.
    pub fn endpoint_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.graphql_path)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "livelist-server")]
#[command(version, about = "Live todo list over GraphQL subscriptions", long_about = None)]
pub struct Args {
    /// Host to bind to.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// GraphQL endpoint path (HTTP POST and WebSocket).
    #[arg(long, default_value = DEFAULT_GRAPHQL_PATH)]
    pub path: String,

    /// Milliseconds a connection may wait before sending connection_init.
    #[arg(long, default_value_t = DEFAULT_CONNECTION_INIT_TIMEOUT_MS)]
    pub connection_init_timeout_ms: u64,

    /// Maximum client message size in kilobytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_KB)]
    pub max_message_kb: usize,

    /// Maximum concurrent WebSocket connections.
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// Start with the demo todo in the list.
    #[arg(long)]
    pub seed_demo: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig::new()
            .with_host(self.host)
            .with_port(self.port)
            .with_graphql_path(self.path)
            .with_connection_init_timeout(Duration::from_millis(self.connection_init_timeout_ms))
            .with_max_message_size(self.max_message_kb.saturating_mul(1024))
            .with_max_connections(self.max_connections)
            .with_seed_demo(self.seed_demo)
    }
}
