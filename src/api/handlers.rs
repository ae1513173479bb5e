//! HTTP API handlers.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::decimal::Decimal;
use crate::error::BookError;
use crate::metrics;
use crate::orderbook::aggregator::finest_bucket_width;
use crate::orderbook::types::Book;
use crate::store::PairStore;
use crate::sync::DiffEvent;

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Books written by the sync loop.
    pub store: Arc<PairStore>,
    /// Diff fan-out; each WebSocket client subscribes on connect.
    pub diffs: broadcast::Sender<DiffEvent>,
}

impl AppState {
    /// Create new app state.
    pub fn new(store: Arc<PairStore>, diffs: broadcast::Sender<DiffEvent>) -> Self {
        Self { store, diffs }
    }

    /// Check if the source has been reached.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }
}

/// Query failure rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub BookError);

impl From<BookError> for ApiError {
    fn from(e: BookError) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// HTTP status for the underlying error.
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BookError::InvalidBucketWidth(_) | BookError::Decimal(_) => StatusCode::BAD_REQUEST,
            BookError::UnknownPair(_) => StatusCode::NOT_FOUND,
            BookError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(status = %status, error = %self.0, "Request rejected");
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the source has been reached.
    pub ready: bool,
    /// Tracked pairs.
    pub pairs: usize,
}

/// Snapshot query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Bucket width, exactly `1 x 10^k` for any integer `k`. Defaults to the
    /// finest tick.
    pub spread: Option<String>,
}

/// WebSocket query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Only forward diffs of this pair.
    pub pair: Option<String>,
}

fn parse_width(spread: Option<&str>) -> Result<Decimal, BookError> {
    match spread {
        None => Ok(finest_bucket_width()),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BookError::InvalidBucketWidth(raw.to_string())),
    }
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 once the source answered, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        pairs: state.store.len(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Source metadata captured at initialization.
pub async fn info(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.info()?))
}

/// Tracked pair keys as a bare array, weighted first.
pub async fn pairs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.pairs())
}

/// Merged snapshot of one pair.
pub async fn snapshot(
    State(state): State<AppState>,
    Path(pair): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Book>, ApiError> {
    let width = parse_width(query.spread.as_deref())?;
    let book = state.store.snapshot(&pair.to_lowercase(), &width)?;
    Ok(Json(book))
}

/// Upgrade to a WebSocket that streams diff events.
pub async fn stream(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    let diffs = state.diffs.subscribe();
    let pair = query.pair.map(|p| p.to_lowercase());
    info!(pair = ?pair, "WebSocket connection request");
    ws.on_upgrade(move |socket| forward_diffs(socket, diffs, pair))
}

/// Text frame for `event`, or `None` if `pair` filters it out.
pub fn diff_frame(event: &DiffEvent, pair: Option<&str>) -> Option<String> {
    if pair.is_some_and(|p| p != event.pair) {
        return None;
    }
    match event.to_message() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(channel = %event.channel, error = %e, "Failed to encode diff");
            None
        }
    }
}

async fn forward_diffs(
    socket: WebSocket,
    mut diffs: broadcast::Receiver<DiffEvent>,
    pair: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = diffs.recv() => match event {
                Ok(event) => {
                    let Some(text) = diff_frame(&event, pair.as_deref()) else {
                        continue;
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                    metrics::inc_ws_messages_sent();
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagging, diffs dropped");
                    metrics::add_ws_lagged(skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("WebSocket connection closed");
}
