//! Tracking of live WebSocket connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::error::{Error, Result};

/// A live connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    /// Connection ID.
    pub id: String,
    /// When the socket was upgraded.
    pub connected_at: Instant,
    subscriptions: AtomicUsize,
}

impl ConnectionInfo {
    /// Create connection info with a fresh UUID.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create connection info with a given ID.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected_at: Instant::now(),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Number of active subscriptions on this connection.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::Relaxed)
    }

    pub(crate) fn set_subscription_count(&self, count: usize) {
        self.subscriptions.store(count, Ordering::Relaxed);
    }

    /// Seconds since the connection was opened.
    pub fn age_secs(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection summary for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub age_secs: u64,
    pub subscriptions: usize,
}

/// Tracks live connections and enforces the connection limit.
pub struct ConnectionManager {
    connections: DashMap<String, Arc<ConnectionInfo>>,
    max_connections: usize,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
        }
    }

    /// Register a new connection.
    pub fn open(&self) -> Result<Arc<ConnectionInfo>> {
        if self.connections.len() >= self.max_connections {
            return Err(Error::TooManyConnections(self.max_connections));
        }

        let info = Arc::new(ConnectionInfo::new());
        self.connections.insert(info.id.clone(), Arc::clone(&info));

        tracing::info!(connection_id = %info.id, "connection opened");
        Ok(info)
    }

    /// Get a connection by ID.
    pub fn get(&self, id: &str) -> Option<Arc<ConnectionInfo>> {
        self.connections.get(id).map(|c| Arc::clone(&c))
    }

    /// Unregister a connection.
    pub fn close(&self, id: &str) -> bool {
        match self.connections.remove(id) {
            Some((_, info)) => {
                tracing::info!(
                    connection_id = %id,
                    age_secs = info.age_secs(),
                    "connection closed"
                );
                true
            }
            None => false,
        }
    }

    /// Number of live connections.
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Maximum allowed connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Active subscriptions summed over all connections.
    pub fn subscription_count(&self) -> usize {
        self.connections
            .iter()
            .map(|c| c.value().subscription_count())
            .sum()
    }

    /// Summaries of all live connections.
    pub fn list(&self) -> Vec<ConnectionSummary> {
        self.connections
            .iter()
            .map(|entry| {
                let info = entry.value();
                ConnectionSummary {
                    id: info.id.clone(),
                    age_secs: info.age_secs(),
                    subscriptions: info.subscription_count(),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("active", &self.active_count())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close() {
        let manager = ConnectionManager::new(10);
        let info = manager.open().unwrap();
        assert_eq!(manager.active_count(), 1);
        assert!(manager.get(&info.id).is_some());

        assert!(manager.close(&info.id));
        assert!(!manager.close(&info.id));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_max_connections() {
        let manager = ConnectionManager::new(2);
        manager.open().unwrap();
        manager.open().unwrap();

        let result = manager.open();
        assert!(matches!(result, Err(Error::TooManyConnections(2))));
    }

    #[test]
    fn test_unique_ids() {
        let manager = ConnectionManager::new(10);
        let a = manager.open().unwrap();
        let b = manager.open().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_subscription_counts() {
        let manager = ConnectionManager::new(10);
        let a = manager.open().unwrap();
        let b = manager.open().unwrap();
        a.set_subscription_count(2);
        b.set_subscription_count(1);

        assert_eq!(manager.subscription_count(), 3);
        let summary = manager.list();
        assert_eq!(summary.len(), 2);
        assert!(summary.iter().any(|s| s.id == a.id && s.subscriptions == 2));
    }
}
