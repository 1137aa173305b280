use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;
use crate::stream::{self, StreamSession};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    /// Kept as a string so malformed values get our own 400 message.
    gauss: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    sequence: u64,
    motion: Option<bool>,
    width: Option<u32>,
    height: Option<u32>,
    blur_kernel_size: u32,
    snapshots_written: u64,
    active_sessions: usize,
}

fn no_cache_headers(content_type: &'static str) -> [(HeaderName, &'static str); 5] {
    [
        (header::CACHE_CONTROL, stream::CACHE_CONTROL),
        (header::CONNECTION, "close"),
        (header::EXPIRES, stream::EXPIRES),
        (header::PRAGMA, "no-cache"),
        (header::CONTENT_TYPE, content_type),
    ]
}

/// Parse a `gauss` value: a positive integer. Oddness and the upper bound
/// are checked by the kernel.
fn parse_gauss(raw: &str) -> Result<u32, String> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("gauss must be an odd positive integer, got {raw:?}"))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("gauss must be an odd positive integer, got {value}"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /preview?gauss=N: endless multipart JPEG stream of annotated frames
async fn preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    let size = match query.gauss.as_deref().map(parse_gauss).transpose() {
        Ok(size) => size.unwrap_or(state.default_kernel),
        Err(reason) => {
            warn!(%reason, "rejected preview request");
            return (StatusCode::BAD_REQUEST, reason).into_response();
        }
    };
    if let Err(e) = state.kernel.set(size) {
        warn!(error = %e, "rejected preview request");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let session = StreamSession::new(state.preview.clone(), state.pacing, Arc::clone(&state.stats));
    info!(session = session.id(), blur_kernel_size = size, "starting preview stream");

    // Infinite streams would otherwise hold graceful shutdown open forever.
    let body = session
        .into_body_stream()
        .take_until(state.shutdown.clone().wait());

    (no_cache_headers(stream::CONTENT_TYPE), Body::from_stream(body)).into_response()
}

/// GET /frame: latest annotated frame as a single JPEG
async fn frame(State(state): State<Arc<AppState>>) -> Response {
    match state.preview.read().frame {
        Some(frame) => (no_cache_headers("image/jpeg"), frame.jpeg()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no frame captured yet").into_response(),
    }
}

/// GET /status: pipeline counters as JSON
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    let snapshot = state.preview.read();
    let frame = snapshot.frame.as_deref();
    Json(StatusBody {
        sequence: snapshot.sequence,
        motion: frame.map(|f| f.motion()),
        width: frame.map(|f| f.frame().width()),
        height: frame.map(|f| f.frame().height()),
        blur_kernel_size: state.kernel.get(),
        snapshots_written: state.stats.snapshots_written.load(Ordering::Relaxed),
        active_sessions: state.stats.active_sessions.load(Ordering::Relaxed),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/preview", get(preview))
        .route("/frame", get(frame))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_parsing() {
        assert_eq!(parse_gauss("11"), Ok(11));
        assert_eq!(parse_gauss(" 3 "), Ok(3));
        // Even values parse here and are rejected by the kernel.
        assert_eq!(parse_gauss("10"), Ok(10));
        assert!(parse_gauss("0").is_err());
        assert!(parse_gauss("-5").is_err());
        assert!(parse_gauss("abc").is_err());
        assert!(parse_gauss("4294967296").is_err());
    }

    #[test]
    fn stream_headers() {
        let headers = no_cache_headers(stream::CONTENT_TYPE);
        assert!(headers
            .iter()
            .any(|(name, value)| *name == header::CONNECTION && *value == "close"));
        assert!(headers.iter().any(|(name, value)| *name == header::CONTENT_TYPE
            && *value == "multipart/x-mixed-replace; boundary=boundarydonotcross"));
    }
}
