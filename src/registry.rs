//! Live table of currently open client connections.
//!
//! Each transport adapter owns one [`ConnectionRegistry`] and is the only
//! writer: its connect handler registers, its close handler unregisters.
//! Fan-out never touches the live map; it iterates an owned [`snapshot`]
//! so register/unregister happening mid-broadcast cannot invalidate the
//! iteration.
//!
//! [`snapshot`]: ConnectionRegistry::snapshot

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};

/// Identifier for one connection, assigned by the transport layer
/// (a monotonic counter for raw WebSocket clients, the session id for
/// Socket.IO clients). Never reused once the connection closes.
pub type ConnectionId = String;

/// Sender half of a connection's outbound text channel. The transport
/// adapter drains the receiving half into the actual socket.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Registry of open connections, keyed by [`ConnectionId`].
///
/// Invariant: every entry is an open connection. Entries are removed
/// synchronously with the close/disconnect signal, so the registry never
/// holds a closed connection longer than one in-flight broadcast.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, OutboundSender>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a newly opened connection, making it a broadcast target.
    ///
    /// Ids are adapter-assigned and never reused, so a collision means a
    /// transport bug; the old entry is replaced and a warning logged.
    pub async fn register(&self, id: &str, sender: OutboundSender) {
        let mut conns = self.connections.write().await;
        if conns.insert(id.to_string(), sender).is_some() {
            tracing::warn!(connection_id = %id, "replaced existing registry entry");
        }
    }

    /// Removes a connection by id, returning whether it was present.
    ///
    /// A no-op for absent ids: close signals can arrive twice (e.g. a
    /// failed broadcast send racing the transport's own close handler).
    pub async fn unregister(&self, id: &str) -> bool {
        let mut conns = self.connections.write().await;
        conns.remove(id).is_some()
    }

    /// Returns an owned copy of the current entries for fan-out.
    pub async fn snapshot(&self) -> Vec<(ConnectionId, OutboundSender)> {
        let conns = self.connections.read().await;
        conns
            .iter()
            .map(|(id, sender)| (id.clone(), sender.clone()))
            .collect()
    }

    /// Number of currently registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry holds no connections.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
