//! Push channel capability.
//!
//! A `ChannelProvisioner` hands out delivery tokens and pushes payloads to
//! whoever holds the most recent token for an identity. The relay core only
//! talks to this trait; [`LocalChannelProvisioner`] is the in-process
//! platform used by the binary.

pub mod local;

pub use local::{ChannelStream, LocalChannelProvisioner};

use crate::errors::RelayError;
use bytes::Bytes;
use common::types::ChannelToken;

/// Push platform capability (enables mocking).
#[async_trait::async_trait]
pub trait ChannelProvisioner: Send + Sync {
    /// Allocate a fresh delivery token for `identity`. Unique per call.
    async fn provision(&self, identity: &str) -> Result<ChannelToken, RelayError>;

    /// Best-effort push to the holder of the latest token for `identity`.
    ///
    /// Returns `RelayError::Delivery` when no live channel exists.
    async fn send(&self, identity: &str, payload: Bytes) -> Result<(), RelayError>;

    /// Discard a token that was issued but will not be used.
    ///
    /// Best effort; never fails.
    async fn revoke(&self, token: &ChannelToken);
}

/// The platform observed that the client holding `identity`'s channel went
/// away. `token` is the channel that closed, not necessarily the identity's
/// current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectNotice {
    pub identity: String,
    pub token: ChannelToken,
}
