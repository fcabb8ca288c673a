//! Presence registry.
//!
//! The registry is the set of identities that currently receive broadcasts.
//! It holds one [`ActiveSession`] record per connected principal, keyed by
//! identity.
//!
//! # Contract
//!
//! - `register` upserts. Registering a present identity again leaves exactly
//!   one record.
//! - `deregister` of an absent identity is a no-op. Disconnect notifications
//!   race with explicit removal, and both must succeed.
//! - `snapshot` returns identities in lexicographic order. It may be slightly
//!   stale relative to concurrent writes.
//! - Backend failures surface as `RelayError::Storage`. A failed `register`
//!   leaves no record.
//!
//! Implementations only need per-key atomicity. No cross-key transaction is
//! ever required.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryPresenceStore;
pub use self::redis::RedisPresenceStore;

use crate::errors::RelayError;
use serde::{Deserialize, Serialize};

/// Persisted record for one connected principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Stable identity from the external identity provider.
    pub identity: String,
}

impl ActiveSession {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

/// Shared registry of active sessions (enables mocking).
#[async_trait::async_trait]
pub trait PresenceStore: Send + Sync {
    /// Upsert the `ActiveSession` for `identity`.
    async fn register(&self, identity: &str) -> Result<(), RelayError>;

    /// Remove the record for `identity`. Absent identities are not an error.
    async fn deregister(&self, identity: &str) -> Result<(), RelayError>;

    /// Identities of all registered sessions, lexicographically ordered.
    async fn snapshot(&self) -> Result<Vec<String>, RelayError>;
}
