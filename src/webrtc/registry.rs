//! Process-wide registry of active peer connections
//!
//! Every connection created by the offer endpoint is registered here and
//! removed exactly once, either by the state-change hook when the connection
//! fails or by [`ConnectionRegistry::close_all`] at shutdown. `discard`
//! returns the removed handle, so whoever wins the removal is the only
//! caller that gets to close the connection.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info};
use webrtc::peer_connection::RTCPeerConnection;

/// Registry of active peer connections keyed by connection id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<RTCPeerConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under the given id
    pub async fn add(&self, id: impl Into<String>, pc: Arc<RTCPeerConnection>) {
        let id = id.into();
        debug!(connection_id = %id, "Connection registered");
        self.connections.write().await.insert(id, pc);
    }

    /// Remove a connection if present, returning its handle.
    ///
    /// Idempotent: a second discard of the same id returns `None`.
    pub async fn discard(&self, id: &str) -> Option<Arc<RTCPeerConnection>> {
        let removed = self.connections.write().await.remove(id);
        if removed.is_some() {
            debug!(connection_id = %id, "Connection deregistered");
        }
        removed
    }

    /// Whether the id is currently registered
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Number of active connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Close every registered connection concurrently and clear the registry
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<RTCPeerConnection>)> =
            self.connections.write().await.drain().collect();

        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "Closing all peer connections");

        let mut closes = FuturesUnordered::new();
        for (id, pc) in drained {
            closes.push(async move {
                if let Err(e) = pc.close().await {
                    debug!(connection_id = %id, "Close failed: {}", e);
                }
            });
        }
        while closes.next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn test_pc() -> Arc<RTCPeerConnection> {
        let api = APIBuilder::new().build();
        Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn discard_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.add("a", test_pc().await).await;

        assert!(registry.contains("a").await);
        assert!(registry.discard("a").await.is_some());
        assert!(registry.discard("a").await.is_none());
        assert!(!registry.contains("a").await);
    }

    #[tokio::test]
    async fn discard_absent_id_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(registry.discard("missing").await.is_none());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        for n in [0usize, 1, 5] {
            let registry = ConnectionRegistry::new();
            for i in 0..n {
                registry.add(format!("pc-{i}"), test_pc().await).await;
            }
            assert_eq!(registry.len().await, n);
            registry.close_all().await;
            assert!(registry.is_empty().await);
        }
    }

    #[tokio::test]
    async fn id_can_be_re_added_after_discard() {
        let registry = ConnectionRegistry::new();
        registry.add("a", test_pc().await).await;
        registry.discard("a").await;
        registry.add("a", test_pc().await).await;
        assert!(registry.contains("a").await);
    }
}
