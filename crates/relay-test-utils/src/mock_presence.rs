//! Presence store mock with failure injection.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_test_utils::MockPresenceStore;
//!
//! let store = MockPresenceStore::with_sessions(&["u1", "u2"]).failing_register();
//! assert!(store.register("u3").await.is_err());
//! assert!(!store.contains("u3"));
//! ```

use chat_relay::errors::RelayError;
use chat_relay::presence::PresenceStore;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock `PresenceStore`.
///
/// Keeps identities in a `BTreeSet` so snapshots are ordered like the real
/// stores. Each operation can be switched to fail with `RelayError::Storage`;
/// a failing write leaves the set untouched.
#[derive(Debug, Default)]
pub struct MockPresenceStore {
    sessions: Mutex<BTreeSet<String>>,
    fail_register: AtomicBool,
    fail_deregister: AtomicBool,
    fail_snapshot: AtomicBool,
    register_calls: AtomicUsize,
    deregister_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl MockPresenceStore {
    /// Create an empty store where every operation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `identities`.
    pub fn with_sessions(identities: &[&str]) -> Self {
        let store = Self::new();
        store
            .sessions
            .lock()
            .unwrap()
            .extend(identities.iter().map(|id| (*id).to_string()));
        store
    }

    /// Make every `register` fail.
    pub fn failing_register(self) -> Self {
        self.set_fail_register(true);
        self
    }

    /// Make every `deregister` fail.
    pub fn failing_deregister(self) -> Self {
        self.set_fail_deregister(true);
        self
    }

    /// Make every `snapshot` fail.
    pub fn failing_snapshot(self) -> Self {
        self.fail_snapshot.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deregister(&self, fail: bool) {
        self.fail_deregister.store(fail, Ordering::SeqCst);
    }

    /// Whether `identity` is currently registered.
    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.lock().unwrap().contains(identity)
    }

    /// Registered identities, ordered.
    pub fn identities(&self) -> Vec<String> {
        self.sessions.lock().unwrap().iter().cloned().collect()
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PresenceStore for MockPresenceStore {
    async fn register(&self, identity: &str) -> Result<(), RelayError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(RelayError::Storage("Mock register failure".to_string()));
        }
        self.sessions.lock().unwrap().insert(identity.to_string());
        Ok(())
    }

    async fn deregister(&self, identity: &str) -> Result<(), RelayError> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deregister.load(Ordering::SeqCst) {
            return Err(RelayError::Storage("Mock deregister failure".to_string()));
        }
        self.sessions.lock().unwrap().remove(identity);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<String>, RelayError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(RelayError::Storage("Mock snapshot failure".to_string()));
        }
        Ok(self.identities())
    }
}
