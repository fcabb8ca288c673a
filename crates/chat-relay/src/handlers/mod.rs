//! HTTP request handlers for the relay.

pub mod channel;
pub mod chat;
pub mod metrics;
pub mod session;

pub use channel::open_channel;
pub use chat::post_message;
pub use metrics::metrics_handler;
pub use session::{channel_disconnected, connect};
