//! Session lifecycle.
//!
//! Per-principal state machine:
//!
//! ```text
//! Anonymous --identify--> Connecting --provision+register--> Active
//!     ^                        |                                |
//!     +------- failure --------+                     disconnect notice
//!                                                               v
//!                                                         Disconnected
//! ```
//!
//! `Connecting -> Active` needs both a provisioned channel and a registered
//! `ActiveSession`. When registration fails after provisioning succeeded, the
//! fresh token is revoked (best effort) and the failure is returned. Nothing
//! is retried here; the platform owns redelivery of disconnect notices.
//!
//! `Disconnected` is terminal for one connection instance. A reconnect for
//! the same identity starts a new instance at `Connecting`.
//!
//! Disconnect notices from the in-process platform are asynchronous and can
//! be processed after the identity already reconnected. A notice whose
//! channel has been superseded is dropped.

use crate::channel::{ChannelProvisioner, DisconnectNotice, LocalChannelProvisioner};
use crate::errors::RelayError;
use crate::identity::IdentityProvider;
use crate::observability::metrics::{record_session_connect, record_session_disconnect};
use crate::presence::PresenceStore;
use axum::http::HeaderMap;
use common::types::ChannelToken;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle state of one connection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No identified principal.
    Anonymous,
    /// Identified, channel and registration in progress.
    Connecting,
    /// Registered; receives broadcasts.
    Active,
    /// Deregistered after a disconnect notice.
    Disconnected,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Anonymous, SessionState::Connecting)
                | (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Anonymous)
                | (SessionState::Active, SessionState::Disconnected)
        )
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveConnection {
    pub identity: String,
    pub token: ChannelToken,
}

/// Connect and disconnect orchestration over the injected capabilities.
#[derive(Clone)]
pub struct SessionLifecycle {
    presence: Arc<dyn PresenceStore>,
    channels: Arc<dyn ChannelProvisioner>,
    identities: Arc<dyn IdentityProvider>,
}

impl SessionLifecycle {
    #[must_use]
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        channels: Arc<dyn ChannelProvisioner>,
        identities: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            presence,
            channels,
            identities,
        }
    }

    /// Resolve the caller's identity.
    ///
    /// # Errors
    ///
    /// `RelayError::AuthRequired` carrying the login URL when the caller is
    /// anonymous. No state is created.
    pub fn identify(&self, headers: &HeaderMap) -> Result<String, RelayError> {
        self.identities.identify(headers).ok_or_else(|| {
            debug!(target: "relay.lifecycle", "Anonymous caller, redirecting to login");
            RelayError::AuthRequired {
                login_url: self.identities.login_url(),
            }
        })
    }

    /// Provision a channel for `identity` and register its presence.
    ///
    /// # Errors
    ///
    /// - `RelayError::Provision` if no channel could be allocated; nothing is
    ///   registered.
    /// - `RelayError::Storage` if registration failed; the issued token is
    ///   revoked and `identity` is not in the registry.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn connect(&self, identity: &str) -> Result<ActiveConnection, RelayError> {
        log_transition(identity, SessionState::Anonymous, SessionState::Connecting);

        let token = match self.channels.provision(identity).await {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    target: "relay.lifecycle",
                    identity = %identity,
                    error = %e,
                    "Channel provisioning failed"
                );
                record_session_connect("provision_error");
                log_transition(identity, SessionState::Connecting, SessionState::Anonymous);
                return Err(e);
            }
        };

        if let Err(e) = self.presence.register(identity).await {
            error!(
                target: "relay.lifecycle",
                identity = %identity,
                error = %e,
                "Presence registration failed, revoking channel"
            );
            self.channels.revoke(&token).await;
            record_session_connect("storage_error");
            log_transition(identity, SessionState::Connecting, SessionState::Anonymous);
            return Err(e);
        }

        record_session_connect("success");
        log_transition(identity, SessionState::Connecting, SessionState::Active);
        info!(target: "relay.lifecycle", identity = %identity, "Session connected");

        Ok(ActiveConnection {
            identity: identity.to_string(),
            token,
        })
    }

    /// Handle a disconnect notice for `identity`.
    ///
    /// An empty identity is ignored. An identity with no record is not an
    /// error.
    ///
    /// # Errors
    ///
    /// `RelayError::Storage` if the registry could not be updated. The
    /// failure is logged and not retried.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn disconnect(&self, identity: &str) -> Result<(), RelayError> {
        if identity.is_empty() {
            debug!(target: "relay.lifecycle", "Ignoring disconnect notice without identity");
            return Ok(());
        }

        if let Err(e) = self.presence.deregister(identity).await {
            error!(
                target: "relay.lifecycle",
                identity = %identity,
                error = %e,
                "Failed to deregister disconnected session"
            );
            record_session_disconnect("error");
            return Err(e);
        }

        record_session_disconnect("removed");
        log_transition(identity, SessionState::Active, SessionState::Disconnected);
        info!(target: "relay.lifecycle", identity = %identity, "Session disconnected");
        Ok(())
    }

    /// Apply a disconnect notice from the in-process platform.
    ///
    /// Skips the notice when `platform` already holds a newer channel for the
    /// identity. A connect that provisions while the deregister is in flight
    /// gets its presence record back.
    #[instrument(skip_all, fields(identity = %notice.identity))]
    pub async fn channel_closed(
        &self,
        platform: &LocalChannelProvisioner,
        notice: &DisconnectNotice,
    ) {
        if platform.is_superseded(&notice.identity, &notice.token) {
            debug!(
                target: "relay.lifecycle",
                identity = %notice.identity,
                "Stale disconnect notice, client already reconnected"
            );
            return;
        }

        // Already logged and counted by disconnect().
        if self.disconnect(&notice.identity).await.is_err() {
            return;
        }

        if platform.is_superseded(&notice.identity, &notice.token) {
            warn!(
                target: "relay.lifecycle",
                identity = %notice.identity,
                "Client reconnected during disconnect, restoring presence"
            );
            if let Err(e) = self.presence.register(&notice.identity).await {
                error!(
                    target: "relay.lifecycle",
                    identity = %notice.identity,
                    error = %e,
                    "Failed to restore presence after reconnect"
                );
            }
        }
    }
}

/// Close every local channel and deregister the identities that had one
/// open. Returns how many sessions were drained.
///
/// Open event streams never finish on their own, so shutdown calls this
/// before the server stops.
pub async fn drain_local_sessions(
    platform: &LocalChannelProvisioner,
    lifecycle: &SessionLifecycle,
) -> usize {
    let closed = platform.close_all();
    info!(
        target: "relay.lifecycle",
        sessions = closed.len(),
        "Deregistering local sessions"
    );
    for identity in &closed {
        // Already logged and counted by disconnect().
        let _ = lifecycle.disconnect(identity).await;
    }
    closed.len()
}

/// Feed `platform`'s disconnect notices into
/// [`SessionLifecycle::channel_closed`].
///
/// Runs until `cancel_token` fires or every notice sender is gone. Failures
/// are logged and not retried.
pub async fn run_disconnect_pump(
    lifecycle: SessionLifecycle,
    platform: LocalChannelProvisioner,
    mut notices: mpsc::UnboundedReceiver<DisconnectNotice>,
    cancel_token: CancellationToken,
) {
    info!(target: "relay.lifecycle", "Disconnect pump started");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "relay.lifecycle", "Disconnect pump shutting down");
                break;
            }
            notice = notices.recv() => {
                let Some(notice) = notice else {
                    info!(target: "relay.lifecycle", "Notice channel closed, disconnect pump exiting");
                    break;
                };
                lifecycle.channel_closed(&platform, &notice).await;
            }
        }
    }
}

fn log_transition(identity: &str, from: SessionState, to: SessionState) {
    if from.can_transition_to(to) {
        debug!(
            target: "relay.lifecycle",
            identity = %identity,
            from = from.as_str(),
            to = to.as_str(),
            "Session state transition"
        );
    } else {
        warn!(
            target: "relay.lifecycle",
            identity = %identity,
            from = from.as_str(),
            to = to.as_str(),
            "Unexpected session state transition"
        );
    }
}
