//! Identity provider test double.

use axum::http::HeaderMap;
use chat_relay::identity::IdentityProvider;

/// Login URL reported by [`StaticIdentityProvider`].
pub const TEST_LOGIN_URL: &str = "/_ah/login?continue=/";

/// Identifies every request as the same principal, or as nobody.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: Option<String>,
}

impl StaticIdentityProvider {
    /// Every request is `identity`.
    pub fn signed_in(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
        }
    }

    /// Every request is anonymous.
    pub fn anonymous() -> Self {
        Self { identity: None }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn identify(&self, _headers: &HeaderMap) -> Option<String> {
        self.identity.clone()
    }

    fn login_url(&self) -> String {
        TEST_LOGIN_URL.to_string()
    }
}
