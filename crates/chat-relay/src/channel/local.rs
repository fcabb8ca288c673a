//! In-process push platform.
//!
//! Each identity owns at most one slot. A slot starts out provisioned (token
//! issued, nobody listening) and becomes open once a client presents the
//! token. Provisioning again replaces the slot, which drops the old sender
//! and ends the previous client's stream.
//!
//! # Disconnects
//!
//! A [`ChannelStream`] removes its slot when dropped, but only if the slot
//! still holds the stream's token, and then emits a [`DisconnectNotice`]. A
//! superseded stream stays silent so it cannot tear down the reconnect that
//! replaced it. A notice emitted before the reconnect is still in flight when
//! the new slot appears; consumers check [`LocalChannelProvisioner::is_superseded`].
//!
//! The registry sits behind a `std::sync::Mutex`. No lock is held across an
//! await point, and `Drop` needs synchronous access.

use super::{ChannelProvisioner, DisconnectNotice};
use crate::errors::RelayError;
use bytes::Bytes;
use common::types::ChannelToken;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, instrument, warn};

/// Random bytes per channel token (hex-encoded to 64 characters).
const TOKEN_BYTES: usize = 32;

struct Slot {
    token: ChannelToken,
    issued_at: Instant,
    sender: Option<mpsc::Sender<Bytes>>,
}

#[derive(Default)]
struct Registry {
    by_identity: HashMap<String, Slot>,
    /// Current token value -> identity.
    by_token: HashMap<String, String>,
}

impl Registry {
    fn remove_if_current(&mut self, identity: &str, token: &ChannelToken) -> bool {
        let current = self
            .by_identity
            .get(identity)
            .is_some_and(|slot| slot.token == *token);
        if current {
            self.by_identity.remove(identity);
            self.by_token.remove(token.as_str());
        }
        current
    }

    /// Drop provisioned slots nobody opened within `ttl`.
    fn prune_expired(&mut self, ttl: Duration) -> usize {
        let expired: Vec<(String, ChannelToken)> = self
            .by_identity
            .iter()
            .filter(|(_, slot)| slot.sender.is_none() && slot.issued_at.elapsed() > ttl)
            .map(|(identity, slot)| (identity.clone(), slot.token.clone()))
            .collect();

        for (identity, token) in &expired {
            self.remove_if_current(identity, token);
        }
        expired.len()
    }
}

struct Inner {
    registry: Mutex<Registry>,
    rng: SystemRandom,
    token_ttl: Duration,
    buffer: usize,
    notices: mpsc::UnboundedSender<DisconnectNotice>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process `ChannelProvisioner`.
///
/// Cheaply cloneable; clones share the same slots.
#[derive(Clone)]
pub struct LocalChannelProvisioner {
    inner: Arc<Inner>,
}

impl fmt::Debug for LocalChannelProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannelProvisioner")
            .field("token_ttl", &self.inner.token_ttl)
            .field("buffer", &self.inner.buffer)
            .finish_non_exhaustive()
    }
}

impl LocalChannelProvisioner {
    /// Create the platform and the receiving end of its disconnect notices.
    ///
    /// `buffer` is clamped to at least 1.
    #[must_use]
    pub fn new(
        token_ttl: Duration,
        buffer: usize,
    ) -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let provisioner = Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                rng: SystemRandom::new(),
                token_ttl,
                buffer: buffer.max(1),
                notices,
            }),
        };
        (provisioner, notice_rx)
    }

    /// Bind a client to the slot behind `token`.
    ///
    /// # Errors
    ///
    /// `RelayError::InvalidChannelToken` if the token is unknown, was
    /// superseded or revoked, has expired, or was already opened.
    #[instrument(skip_all)]
    pub fn open(&self, token: &str) -> Result<ChannelStream, RelayError> {
        let mut registry = self.inner.registry();

        let Some(identity) = registry.by_token.get(token).cloned() else {
            debug!(target: "relay.channel.local", "Open with unknown channel token");
            return Err(RelayError::InvalidChannelToken);
        };
        let Some(slot) = registry.by_identity.get_mut(&identity) else {
            registry.by_token.remove(token);
            return Err(RelayError::InvalidChannelToken);
        };

        if slot.sender.is_some() {
            warn!(
                target: "relay.channel.local",
                identity = %identity,
                "Channel token presented twice"
            );
            return Err(RelayError::InvalidChannelToken);
        }

        if slot.issued_at.elapsed() > self.inner.token_ttl {
            let stale = slot.token.clone();
            registry.remove_if_current(&identity, &stale);
            debug!(
                target: "relay.channel.local",
                identity = %identity,
                "Channel token expired before open"
            );
            return Err(RelayError::InvalidChannelToken);
        }

        let (tx, rx) = mpsc::channel(self.inner.buffer);
        slot.sender = Some(tx);
        let token = slot.token.clone();
        drop(registry);

        info!(
            target: "relay.channel.local",
            identity = %identity,
            "Channel opened"
        );

        Ok(ChannelStream {
            receiver: ReceiverStream::new(rx),
            identity,
            token,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Remove every slot, ending all open streams without disconnect
    /// notices. Returns the identities that had an open channel.
    pub fn close_all(&self) -> Vec<String> {
        let mut registry = self.inner.registry();
        registry.by_token.clear();
        let mut open: Vec<String> = registry
            .by_identity
            .drain()
            .filter(|(_, slot)| slot.sender.is_some())
            .map(|(identity, _)| identity)
            .collect();
        drop(registry);

        open.sort_unstable();
        info!(
            target: "relay.channel.local",
            closed = open.len(),
            "Closed all channels"
        );
        open
    }

    /// Whether `identity` holds a slot issued under a token other than
    /// `token`, i.e. the client reconnected after that channel closed.
    #[must_use]
    pub fn is_superseded(&self, identity: &str, token: &ChannelToken) -> bool {
        self.inner
            .registry()
            .by_identity
            .get(identity)
            .is_some_and(|slot| slot.token != *token)
    }

    /// Number of identities with a provisioned or open slot.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.inner.registry().by_identity.len()
    }

    /// Whether `identity` currently has an open channel.
    #[must_use]
    pub fn is_open(&self, identity: &str) -> bool {
        self.inner
            .registry()
            .by_identity
            .get(identity)
            .is_some_and(|slot| slot.sender.as_ref().is_some_and(|tx| !tx.is_closed()))
    }

    fn generate_token(&self) -> Result<ChannelToken, RelayError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.inner
            .rng
            .fill(&mut bytes)
            .map_err(|_| RelayError::Provision("CSPRNG failure".to_string()))?;
        Ok(ChannelToken::new(hex::encode(bytes)))
    }
}

#[async_trait::async_trait]
impl ChannelProvisioner for LocalChannelProvisioner {
    #[instrument(skip_all, fields(identity = %identity))]
    async fn provision(&self, identity: &str) -> Result<ChannelToken, RelayError> {
        let token = self.generate_token()?;

        let mut registry = self.inner.registry();
        let pruned = registry.prune_expired(self.inner.token_ttl);

        let previous = registry.by_identity.insert(
            identity.to_string(),
            Slot {
                token: token.clone(),
                issued_at: Instant::now(),
                sender: None,
            },
        );
        if let Some(previous) = &previous {
            registry.by_token.remove(previous.token.as_str());
        }
        registry
            .by_token
            .insert(token.as_str().to_string(), identity.to_string());
        drop(registry);

        debug!(
            target: "relay.channel.local",
            identity = %identity,
            replaced = previous.is_some(),
            pruned,
            "Channel provisioned"
        );
        Ok(token)
    }

    async fn send(&self, identity: &str, payload: Bytes) -> Result<(), RelayError> {
        let sender = {
            let registry = self.inner.registry();
            let Some(slot) = registry.by_identity.get(identity) else {
                return Err(RelayError::Delivery("no channel".to_string()));
            };
            let Some(sender) = &slot.sender else {
                return Err(RelayError::Delivery("channel not opened".to_string()));
            };
            sender.clone()
        };

        sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RelayError::Delivery("channel buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                RelayError::Delivery("channel closed".to_string())
            }
        })
    }

    async fn revoke(&self, token: &ChannelToken) {
        let mut registry = self.inner.registry();
        let Some(identity) = registry.by_token.get(token.as_str()).cloned() else {
            return;
        };
        let removed = registry.remove_if_current(&identity, token);
        drop(registry);

        debug!(
            target: "relay.channel.local",
            identity = %identity,
            removed,
            "Channel token revoked"
        );
    }
}

/// Client end of an open channel.
///
/// Yields payloads in send order. Ends when the slot is superseded or the
/// provisioner is dropped.
pub struct ChannelStream {
    receiver: ReceiverStream<Bytes>,
    identity: String,
    token: ChannelToken,
    inner: Arc<Inner>,
}

impl ChannelStream {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStream")
            .field("identity", &self.identity)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Stream for ChannelStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        let removed = self
            .inner
            .registry()
            .remove_if_current(&self.identity, &self.token);

        if !removed {
            debug!(
                target: "relay.channel.local",
                identity = %self.identity,
                "Superseded channel closed"
            );
            return;
        }

        info!(
            target: "relay.channel.local",
            identity = %self.identity,
            "Channel closed by client"
        );

        let notice = DisconnectNotice {
            identity: self.identity.clone(),
            token: self.token.clone(),
        };
        if self.inner.notices.send(notice).is_err() {
            warn!(
                target: "relay.channel.local",
                identity = %self.identity,
                "Disconnect notice dropped, no listener"
            );
        }
    }
}
