//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used by the relay. The Redis URL (which may
//! carry a password) is held as a `SecretString`, and so is any value that
//! must not reach a log line through `{:?}`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Backend {
//!     name: String,
//!     url: SecretString, // Debug shows "[REDACTED]"
//! }
//!
//! let backend = Backend {
//!     name: "presence".to_string(),
//!     url: SecretString::from("redis://:hunter2@localhost:6379"),
//! };
//!
//! assert!(!format!("{backend:?}").contains("hunter2"));
//! let url: &str = backend.url.expose_secret();
//! assert!(url.starts_with("redis://"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
