//! Range streaming endpoint.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use magstream_core::MediaStream;
use serde::Deserialize;

use crate::errors::ApiError;
use crate::server::AppState;

/// Query string of `GET /stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Magnet link of the content to stream
    pub magnet: Option<String>,
}

/// Streams the first playable file of a magnet link.
///
/// Without a `Range` header the whole file is sent with 200; with one, the
/// requested span is sent with 206.
///
/// # Errors
/// - `ApiError::MissingParameter` - `magnet` absent or blank
/// - `ApiError::Stream` - Session, readiness, file selection or range failure
pub async fn stream_magnet(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let magnet = params
        .magnet
        .as_deref()
        .map(str::trim)
        .filter(|magnet| !magnet.is_empty())
        .ok_or(ApiError::MissingParameter { name: "magnet" })?;

    let range = extract_range_header(&headers);
    let stream = state.controller.open(magnet, range.as_deref()).await?;
    build_media_response(stream)
}

/// Reads the `Range` header as a string, ignoring non-UTF-8 values.
pub fn extract_range_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::RANGE)
        .and_then(|range| range.to_str().ok())
        .map(|range| range.to_string())
}

/// Writes status and headers for `stream` and attaches its body.
fn build_media_response(stream: MediaStream) -> Result<Response, ApiError> {
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, stream.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, stream.content_length());

    response = match stream.content_range() {
        Some(content_range) => response
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, content_range),
        None => response.status(StatusCode::OK),
    };

    response
        .body(Body::from_stream(stream.body))
        .map_err(|e| ApiError::Internal {
            reason: format!("Failed to build stream response: {e}"),
        })
}
