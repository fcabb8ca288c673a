//! Push platform mock.
//!
//! Records every send and revoke, and fails or stalls sends for chosen
//! identities.

use bytes::Bytes;
use chat_relay::channel::ChannelProvisioner;
use chat_relay::errors::RelayError;
use common::types::ChannelToken;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock `ChannelProvisioner`.
///
/// Tokens are `mock-token-{n}`, so every `provision` call yields a new one.
#[derive(Debug, Default)]
pub struct MockChannelProvisioner {
    fail_provision: AtomicBool,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    provision_calls: AtomicUsize,
    provisioned: Mutex<Vec<(String, ChannelToken)>>,
    sends: Mutex<Vec<(String, Bytes)>>,
    revoked: Mutex<Vec<ChannelToken>>,
}

impl MockChannelProvisioner {
    /// Create a mock where every provision and send succeeds.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Create a mock whose `provision` always fails.
    pub fn failing_provision() -> Self {
        let mock = Self::default();
        mock.fail_provision.store(true, Ordering::SeqCst);
        mock
    }

    /// Sends to any of `identities` fail with `RelayError::Delivery`.
    pub fn failing_for(identities: &[&str]) -> Self {
        Self {
            failing: identities.iter().map(|id| (*id).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Sends to any of `identities` never complete.
    pub fn hanging_for(identities: &[&str]) -> Self {
        Self {
            hanging: identities.iter().map(|id| (*id).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    /// Successful provisions, in call order.
    pub fn provisioned(&self) -> Vec<(String, ChannelToken)> {
        self.provisioned.lock().unwrap().clone()
    }

    /// Successful sends, in call order.
    pub fn sends(&self) -> Vec<(String, Bytes)> {
        self.sends.lock().unwrap().clone()
    }

    /// Identities that received a successful send, in call order.
    pub fn recipients(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn revoked(&self) -> Vec<ChannelToken> {
        self.revoked.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChannelProvisioner for MockChannelProvisioner {
    async fn provision(&self, identity: &str) -> Result<ChannelToken, RelayError> {
        let n = self.provision_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(RelayError::Provision("Mock provision failure".to_string()));
        }

        let token = ChannelToken::new(format!("mock-token-{n}"));
        self.provisioned
            .lock()
            .unwrap()
            .push((identity.to_string(), token.clone()));
        Ok(token)
    }

    async fn send(&self, identity: &str, payload: Bytes) -> Result<(), RelayError> {
        if self.hanging.contains(identity) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(identity) {
            return Err(RelayError::Delivery(format!("Mock send failure for {identity}")));
        }

        self.sends
            .lock()
            .unwrap()
            .push((identity.to_string(), payload));
        Ok(())
    }

    async fn revoke(&self, token: &ChannelToken) {
        self.revoked.lock().unwrap().push(token.clone());
    }
}
