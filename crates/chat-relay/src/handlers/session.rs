//! Connect and disconnect-notification handlers.

use crate::errors::RelayError;
use crate::lifecycle::ActiveConnection;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Form, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `GET /`.
///
/// Identifies the caller, provisions a channel and registers presence.
///
/// # Response
///
/// - 200 with `{"identity": "...", "token": "..."}`
/// - 302 to the login URL for anonymous callers
/// - 503 if no channel could be provisioned
/// - 500 if presence registration failed
#[instrument(skip_all, name = "relay.session.connect")]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ActiveConnection>, RelayError> {
    let identity = state.lifecycle.identify(&headers)?;
    let connection = state.lifecycle.connect(&identity).await?;
    Ok(Json(connection))
}

/// Form body the push platform posts when a client's channel goes away.
#[derive(Debug, Deserialize)]
pub struct DisconnectForm {
    /// Identity whose channel closed. Missing is treated as empty.
    #[serde(default)]
    pub from: String,
}

/// Handler for `POST /_ah/channel/disconnected/`.
///
/// Called by the platform, not by users, so no identity check applies.
/// Unknown and empty identities succeed. A storage failure answers 500 so the
/// platform may redeliver.
#[instrument(skip_all, name = "relay.session.disconnected")]
pub async fn channel_disconnected(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DisconnectForm>,
) -> Result<StatusCode, RelayError> {
    state.lifecycle.disconnect(&form.from).await?;
    Ok(StatusCode::OK)
}
