//! Client side of the local push platform.
//!
//! `GET /_ah/channel/connect?token=...` opens the channel behind a token and
//! streams every payload as one Server-Sent `message` event. When the client
//! hangs up the response body, and with it the `ChannelStream`, is dropped,
//! which produces the disconnect notice.

use crate::errors::RelayError;
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub token: String,
}

/// Handler for `GET /_ah/channel/connect`.
///
/// # Response
///
/// - 200 `text/event-stream` for a valid, unopened token
/// - 403 for unknown, superseded, expired or reused tokens, and for every
///   token when the relay pushes through an external platform
#[instrument(skip_all, name = "relay.channel.open")]
pub async fn open_channel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChannelQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let Some(platform) = &state.platform else {
        return Err(RelayError::InvalidChannelToken);
    };

    let stream = platform
        .open(&query.token)?
        .map(|payload| Ok::<_, Infallible>(Event::default().data(String::from_utf8_lossy(&payload))));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
