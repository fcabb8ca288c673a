//! HTTP routes for the relay.
//!
//! Defines the Axum router and application state.

use crate::channel::LocalChannelProvisioner;
use crate::config::Config;
use crate::fanout::Fanout;
use crate::handlers;
use crate::lifecycle::SessionLifecycle;
use crate::observability::{health_router, HealthState};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: SessionLifecycle,
    pub fanout: Fanout,

    /// In-process push platform. `None` when sends go through another
    /// `ChannelProvisioner`, in which case channel opens are refused.
    pub platform: Option<LocalChannelProvisioner>,

    pub config: Config,
}

/// Build the application routes.
///
/// - `GET /` - connect
/// - `POST /chat` - post a message (body limit from config)
/// - `POST /_ah/channel/disconnected/` - platform disconnect notice
/// - `GET /_ah/channel/connect` - Server-Sent Events channel (no timeout)
/// - `GET /health`, `GET /ready` - probes
/// - `GET /metrics` - Prometheus scrape, when a handle is given
pub fn build_routes(
    state: Arc<AppState>,
    health: Arc<HealthState>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let request_timeout = state.config.request_timeout;
    let max_message_bytes = state.config.max_message_bytes;

    let api_routes = Router::new()
        .route("/", get(handlers::connect))
        .route(
            "/chat",
            post(handlers::post_message).layer(DefaultBodyLimit::max(max_message_bytes)),
        )
        .route(
            "/_ah/channel/disconnected/",
            post(handlers::channel_disconnected),
        )
        .with_state(Arc::clone(&state))
        .merge(health_router(health))
        .layer(TimeoutLayer::new(request_timeout));

    // Long-lived stream; must not inherit the request timeout.
    let stream_routes = Router::new()
        .route("/_ah/channel/connect", get(handlers::open_channel))
        .with_state(state);

    let mut app = api_routes.merge(stream_routes);

    if let Some(handle) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(handlers::metrics_handler))
                .with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
}
