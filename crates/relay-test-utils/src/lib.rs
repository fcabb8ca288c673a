//! # Relay Test Utilities
//!
//! Shared test utilities for the minichat relay.
//!
//! This crate provides:
//! - Capability mocks (`MockPresenceStore`, `MockChannelProvisioner`,
//!   `StaticIdentityProvider`)
//! - Configuration and header fixtures
//! - Server test harness (`TestRelayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! let presence = Arc::new(MockPresenceStore::with_sessions(&["u1", "u2"]));
//! let channels = Arc::new(MockChannelProvisioner::failing_for(&["u2"]));
//! let fanout = Fanout::new(presence, channels.clone(), Duration::from_secs(1));
//!
//! let report = fanout.broadcast(&Message::new("u1", "hi")).await?;
//! assert_eq!(report.failed, 1);
//! ```

pub mod fixtures;
pub mod mock_channels;
pub mod mock_identity;
pub mod mock_presence;
pub mod server_harness;

pub use fixtures::*;
pub use mock_channels::MockChannelProvisioner;
pub use mock_identity::{StaticIdentityProvider, TEST_LOGIN_URL};
pub use mock_presence::MockPresenceStore;
pub use server_harness::TestRelayServer;
