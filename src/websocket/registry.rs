use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::connection::{Connection, ConnectionId};

/// The set of live connections.
///
/// Membership changes take the write lock; broadcast snapshots share the
/// read lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection: Connection) {
        let id = connection.id();
        let remote_addr = connection.remote_addr().to_string();
        self.connections.write().await.insert(id, connection);
        info!(connection_id = %id, %remote_addr, "Registered connection");
    }

    /// Removes a connection. Returns false if it was already gone.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();
        if removed {
            info!(connection_id = %id, "Unregistered connection");
        }
        removed
    }

    /// Members at this instant. A connection registering concurrently with
    /// the snapshot may be left out.
    pub async fn snapshot_for_broadcast(&self) -> Vec<Connection> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Starts closing every member and empties the registry. Close failures
    /// are not reported back.
    pub async fn close_all_and_clear(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        for (_, connection) in connections.drain() {
            tokio::spawn(async move {
                connection.close().await;
                debug!(connection_id = %connection.id(), "Closed connection on shutdown");
            });
        }
        info!(count, "Cleared connection registry");
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
