//! External identity capability.
//!
//! The relay never authenticates anyone itself. An `IdentityProvider` turns
//! request headers into a stable identity, or reports the caller as
//! anonymous and names the login flow to send them to.

use axum::http::HeaderMap;
use tracing::debug;

/// Identity capability (enables mocking).
pub trait IdentityProvider: Send + Sync {
    /// Identity of the principal behind the request, `None` when anonymous.
    fn identify(&self, headers: &HeaderMap) -> Option<String>;

    /// Where anonymous callers are redirected.
    fn login_url(&self) -> String;
}

/// Reads the identity from a header set by an authenticating proxy.
///
/// The proxy must strip the header from inbound client requests; the relay
/// trusts whatever value arrives.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentityProvider {
    header: String,
    login_url: String,
}

impl TrustedHeaderIdentityProvider {
    #[must_use]
    pub fn new(header: impl Into<String>, login_url: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            login_url: login_url.into(),
        }
    }
}

impl IdentityProvider for TrustedHeaderIdentityProvider {
    fn identify(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(self.header.as_str())?;

        let Ok(value) = value.to_str() else {
            debug!(
                target: "relay.identity",
                header = %self.header,
                "Identity header is not visible ASCII"
            );
            return None;
        };

        let identity = value.trim();
        if identity.is_empty() {
            return None;
        }
        Some(identity.to_string())
    }

    fn login_url(&self) -> String {
        self.login_url.clone()
    }
}
