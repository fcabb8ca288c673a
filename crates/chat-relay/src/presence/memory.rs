//! Process-local presence registry.
//!
//! Used when no Redis URL is configured, and as the reference store in tests.
//! A `BTreeMap` keeps snapshots in lexicographic order without a sort.

use super::{ActiveSession, PresenceStore};
use crate::errors::RelayError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// In-memory `PresenceStore`.
///
/// Cheaply cloneable; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPresenceStore {
    sessions: Arc<RwLock<BTreeMap<String, ActiveSession>>>,
}

impl InMemoryPresenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PresenceStore for InMemoryPresenceStore {
    #[instrument(skip_all, fields(identity = %identity))]
    async fn register(&self, identity: &str) -> Result<(), RelayError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(identity.to_string(), ActiveSession::new(identity));

        debug!(
            target: "relay.presence.memory",
            identity = %identity,
            active = sessions.len(),
            "Registered session"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(identity = %identity))]
    async fn deregister(&self, identity: &str) -> Result<(), RelayError> {
        let removed = self.sessions.write().await.remove(identity).is_some();

        debug!(
            target: "relay.presence.memory",
            identity = %identity,
            removed,
            "Deregistered session"
        );
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<String>, RelayError> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_snapshot_contains_identity() {
        let store = InMemoryPresenceStore::new();
        store.register("u1").await.unwrap();

        assert_eq!(store.snapshot().await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_register_deregister_removes_identity() {
        let store = InMemoryPresenceStore::new();
        store.register("u1").await.unwrap();
        store.deregister("u1").await.unwrap();

        assert!(store.snapshot().await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_deregister_unknown_is_noop() {
        let store = InMemoryPresenceStore::new();
        store.register("u1").await.unwrap();

        store.deregister("ghost").await.unwrap();

        assert_eq!(store.snapshot().await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_register_twice_keeps_single_entry() {
        let store = InMemoryPresenceStore::new();
        store.register("u1").await.unwrap();
        store.register("u1").await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.snapshot().await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_is_lexicographic() {
        let store = InMemoryPresenceStore::new();
        for identity in ["carol", "alice", "bob"] {
            store.register(identity).await.unwrap();
        }

        assert_eq!(
            store.snapshot().await.unwrap(),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let store = InMemoryPresenceStore::new();
        let clone = store.clone();
        clone.register("u1").await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let store = InMemoryPresenceStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.register(&format!("user-{:02}", i % 16)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.len().await, 16);
    }
}
