//! minichat relay
//!
//! A minimal real-time chat relay. Any identified visitor connects, receives
//! a private delivery channel, and from then on gets every message any
//! visitor posts.
//!
//! # Architecture
//!
//! ```text
//! handlers/*.rs -> lifecycle.rs / fanout.rs -> presence/*.rs
//!                                           -> channel/*.rs
//! ```
//!
//! The presence registry is the only shared mutable state and the sole
//! source of truth for who receives broadcasts. Push delivery and identity
//! are capabilities injected as trait objects.
//!
//! # Modules
//!
//! - `channel` - Push channel capability and the in-process platform
//! - `config` - Configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `fanout` - Best-effort broadcast over a presence snapshot
//! - `handlers` - HTTP request handlers
//! - `identity` - External identity capability
//! - `lifecycle` - Connect/disconnect orchestration
//! - `observability` - Metrics and health probes
//! - `presence` - Presence registry (Redis and in-memory)
//! - `routes` - Axum router setup

pub mod channel;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod handlers;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod presence;
pub mod routes;
