//! Message posting handler.

use crate::errors::RelayError;
use crate::fanout::{BroadcastReport, Message};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /chat`.
///
/// The raw request body is the message, attributed to the authenticated
/// caller and broadcast to every active session. Per-recipient delivery
/// failures do not fail the request.
///
/// # Response
///
/// - 200 with `{"attempted": n, "delivered": n, "failed": n}`
/// - 302 to the login URL for anonymous callers
/// - 413 when the body exceeds the configured limit
/// - 500 if the presence snapshot could not be read
#[instrument(skip_all, name = "relay.chat.post")]
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BroadcastReport>, RelayError> {
    let sender = state.lifecycle.identify(&headers)?;
    let report = state.fanout.broadcast(&Message::new(sender, body)).await?;
    Ok(Json(report))
}
