//! Common data types for the minichat relay.

use serde::{Serialize, Serializer};
use std::fmt;

/// Opaque delivery handle a client uses to open its push channel.
///
/// A token grants the right to receive every message addressed to one
/// identity, so `Debug` only shows a short prefix. The full value is
/// reachable through [`ChannelToken::as_str`] and serialization (the connect
/// response has to hand it to the client).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChannelToken(String);

impl ChannelToken {
    /// Wrap an already-generated token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the raw token value.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.get(..8).unwrap_or("");
        write!(f, "ChannelToken({prefix}…)")
    }
}

impl Serialize for ChannelToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
