//! Best-effort message fanout.
//!
//! A broadcast snapshots the presence registry once and pushes the rendered
//! message to every identity in it. Per-recipient failures (no live channel,
//! full buffer, send timeout) are counted in the [`BroadcastReport`] and never
//! abort the remaining sends. Only a failed snapshot fails the broadcast.

use crate::channel::ChannelProvisioner;
use crate::errors::RelayError;
use crate::observability::metrics::record_broadcast;
use crate::presence::PresenceStore;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// An inbound chat message. Exists only for one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub body: Bytes,
}

impl Message {
    #[must_use]
    pub fn new(sender: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Payload pushed to every recipient: `"{sender}: {body}"`.
    ///
    /// Invalid UTF-8 in the body is replaced, not rejected.
    #[must_use]
    pub fn render(&self) -> Bytes {
        Bytes::from(format!(
            "{}: {}",
            self.sender,
            String::from_utf8_lossy(&self.body)
        ))
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Recipients in the snapshot.
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed or timed out.
    pub failed: usize,
    /// Identities whose send failed, in snapshot order.
    #[serde(skip)]
    pub failed_identities: Vec<String>,
}

impl BroadcastReport {
    /// Whether every recipient received the message.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Pushes messages to every registered session.
#[derive(Clone)]
pub struct Fanout {
    presence: Arc<dyn PresenceStore>,
    channels: Arc<dyn ChannelProvisioner>,
    send_timeout: Duration,
}

impl Fanout {
    #[must_use]
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        channels: Arc<dyn ChannelProvisioner>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            presence,
            channels,
            send_timeout,
        }
    }

    /// Deliver `message` to every identity in the current presence snapshot.
    ///
    /// Sends run in snapshot order, each bounded by the send timeout.
    ///
    /// # Errors
    ///
    /// `RelayError::Storage` if the snapshot cannot be read. Delivery
    /// failures are reported in the returned `BroadcastReport` instead.
    #[instrument(skip_all, fields(sender = %message.sender, body_len = message.body.len()))]
    pub async fn broadcast(&self, message: &Message) -> Result<BroadcastReport, RelayError> {
        let recipients = self.presence.snapshot().await?;
        let payload = message.render();

        let mut report = BroadcastReport {
            attempted: recipients.len(),
            ..BroadcastReport::default()
        };

        for identity in recipients {
            let outcome = tokio::time::timeout(
                self.send_timeout,
                self.channels.send(&identity, payload.clone()),
            )
            .await;

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    debug!(
                        target: "relay.fanout",
                        recipient = %identity,
                        error = %e,
                        "Delivery failed"
                    );
                    report.failed += 1;
                    report.failed_identities.push(identity);
                }
                Err(_) => {
                    warn!(
                        target: "relay.fanout",
                        recipient = %identity,
                        timeout_ms = self.send_timeout.as_millis(),
                        "Delivery timed out"
                    );
                    report.failed += 1;
                    report.failed_identities.push(identity);
                }
            }
        }

        record_broadcast(report.delivered, report.failed);
        info!(
            target: "relay.fanout",
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );

        Ok(report)
    }
}
