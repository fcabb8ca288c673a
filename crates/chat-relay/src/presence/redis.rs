//! Redis-backed presence registry.
//!
//! # Key Pattern
//!
//! All records live in one hash (default `minichat:active_sessions`):
//!
//! - field: the session identity
//! - value: the `ActiveSession` record as JSON
//!
//! `HSET` upserts one field atomically, `HDEL` of a missing field returns 0
//! rather than failing, and `HGETALL` is the full scan behind `snapshot`.
//!
//! # Connection Pattern
//!
//! `ConnectionManager` is cheap to clone and reconnects on its own after a
//! dropped connection. Each operation clones it; no locking is needed.
//! Every command is bounded by the configured store timeout, so a hung Redis
//! surfaces as `RelayError::Storage` instead of a stalled request.

use super::{ActiveSession, PresenceStore};
use crate::errors::RelayError;
use crate::observability::metrics::record_presence_latency;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Redis `PresenceStore`.
#[derive(Clone)]
pub struct RedisPresenceStore {
    connection: ConnectionManager,
    key: String,
    timeout: Duration,
}

impl RedisPresenceStore {
    /// Connect to Redis and bind the store to the hash at `key`.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Storage` if the URL is invalid or the initial
    /// connection cannot be established within `timeout`.
    pub async fn connect(
        redis_url: &str,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = Client::open(redis_url).map_err(|e| {
            // The URL may carry credentials; never log it.
            error!(
                target: "relay.presence.redis",
                error = %e,
                "Failed to open Redis client"
            );
            RelayError::Storage(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                error!(
                    target: "relay.presence.redis",
                    timeout_ms = timeout.as_millis(),
                    "Timed out connecting to Redis"
                );
                RelayError::Storage("Timed out connecting to Redis".to_string())
            })?
            .map_err(|e| {
                error!(
                    target: "relay.presence.redis",
                    error = %e,
                    "Failed to connect to Redis"
                );
                RelayError::Storage(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            key: key.into(),
            timeout,
        })
    }

    /// Run one Redis command under the store timeout and record its latency.
    async fn bounded<T, F>(&self, operation: &'static str, command: F) -> Result<T, RelayError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, command).await;
        record_presence_latency(operation, start.elapsed());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(
                    target: "relay.presence.redis",
                    error = %e,
                    operation,
                    "Redis command failed"
                );
                Err(RelayError::Storage(format!("{operation} failed: {e}")))
            }
            Err(_) => {
                warn!(
                    target: "relay.presence.redis",
                    operation,
                    timeout_ms = self.timeout.as_millis(),
                    "Redis command timed out"
                );
                Err(RelayError::Storage(format!(
                    "{operation} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl PresenceStore for RedisPresenceStore {
    #[instrument(skip_all, fields(identity = %identity))]
    async fn register(&self, identity: &str) -> Result<(), RelayError> {
        let json = encode_record(identity)?;
        let mut conn = self.connection.clone();

        let created: i64 = self
            .bounded("register", conn.hset(&self.key, identity, &json))
            .await?;

        debug!(
            target: "relay.presence.redis",
            identity = %identity,
            created = created == 1,
            "Registered session"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(identity = %identity))]
    async fn deregister(&self, identity: &str) -> Result<(), RelayError> {
        let mut conn = self.connection.clone();

        let removed: i64 = self
            .bounded("deregister", conn.hdel(&self.key, identity))
            .await?;

        debug!(
            target: "relay.presence.redis",
            identity = %identity,
            removed = removed == 1,
            "Deregistered session"
        );
        Ok(())
    }

    #[instrument(skip_all)]
    async fn snapshot(&self) -> Result<Vec<String>, RelayError> {
        let mut conn = self.connection.clone();

        let entries: HashMap<String, String> =
            self.bounded("snapshot", conn.hgetall(&self.key)).await?;

        Ok(decode_snapshot(entries))
    }
}

/// Serialize the record stored under an identity's hash field.
fn encode_record(identity: &str) -> Result<String, RelayError> {
    serde_json::to_string(&ActiveSession::new(identity)).map_err(|e| {
        error!(
            target: "relay.presence.redis",
            error = %e,
            "Failed to serialize ActiveSession"
        );
        RelayError::Internal(format!("serialization failed: {e}"))
    })
}

/// Turn `HGETALL` output into the ordered identity list.
///
/// The hash field is authoritative. A value that does not decode, or that
/// names a different identity, is logged but the field is still reported, so
/// a corrupt record never silently drops a principal from broadcasts.
fn decode_snapshot(entries: HashMap<String, String>) -> Vec<String> {
    let mut identities: Vec<String> = entries
        .into_iter()
        .map(|(field, value)| {
            match serde_json::from_str::<ActiveSession>(&value) {
                Ok(record) if record.identity == field => {}
                Ok(record) => {
                    warn!(
                        target: "relay.presence.redis",
                        field = %field,
                        record_identity = %record.identity,
                        "ActiveSession record does not match its key"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "relay.presence.redis",
                        field = %field,
                        error = %e,
                        "Undecodable ActiveSession record"
                    );
                }
            }
            field
        })
        .collect();

    identities.sort_unstable();
    identities
}
