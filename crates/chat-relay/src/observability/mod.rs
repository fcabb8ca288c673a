//! Observability for the relay.
//!
//! # Privacy by Default
//!
//! Identities are logged as structured fields but never used as metric
//! labels, and channel tokens are never logged in full.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `relay_sessions_connected_total` | Counter | `outcome` |
//! | `relay_sessions_disconnected_total` | Counter | `outcome` |
//! | `relay_broadcasts_total` | Counter | none |
//! | `relay_deliveries_total` | Counter | `outcome` |
//! | `relay_broadcast_recipients` | Histogram | none |
//! | `relay_presence_latency_seconds` | Histogram | `operation` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_broadcast, record_presence_latency, record_session_connect,
    record_session_disconnect,
};
