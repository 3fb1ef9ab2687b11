//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use magstream_core::StreamError;
use magstream_search::MediaSearchError;
use serde_json::json;

/// Errors returned by API handlers.
///
/// Rendered as `{"error": <kind>, "message": <text>}` with a status code
/// chosen per variant.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Required query parameter absent or empty.
    #[error("Missing required parameter '{name}'")]
    MissingParameter {
        /// Name of the parameter
        name: &'static str,
    },

    /// Stream request failed before the response started.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Search request failed.
    #[error(transparent)]
    Search(#[from] MediaSearchError),

    /// Response could not be assembled.
    #[error("Internal error: {reason}")]
    Internal {
        /// What went wrong
        reason: String,
    },
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::Stream(e) => match e {
                StreamError::SessionCreate { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                StreamError::NoPlayableFile { .. } => StatusCode::NOT_FOUND,
                StreamError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                StreamError::ReadyTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                StreamError::SessionFatal { .. } => StatusCode::SERVICE_UNAVAILABLE,
                StreamError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Search(e) => match e {
                MediaSearchError::InvalidQuery { .. } => StatusCode::BAD_REQUEST,
                MediaSearchError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind for the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingParameter { .. } => "missing_parameter",
            ApiError::Stream(e) => match e {
                StreamError::SessionCreate { .. } => "session_create",
                StreamError::NoPlayableFile { .. } => "no_playable_file",
                StreamError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
                StreamError::ReadyTimeout { .. } => "ready_timeout",
                StreamError::SessionFatal { .. } => "session_fatal",
                StreamError::Transport { .. } => "transport",
            },
            ApiError::Search(e) => match e {
                MediaSearchError::InvalidQuery { .. } => "invalid_query",
                MediaSearchError::Configuration { .. } => "configuration",
                _ => "search_failed",
            },
            ApiError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed with {}: {}", status, self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        let mut response = (status, body).into_response();

        if let ApiError::Stream(StreamError::RangeNotSatisfiable { length }) = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{length}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use magstream_core::swarm::{InfoHash, SwarmError};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let info_hash = InfoHash::new([1; 20]);
        let cases = [
            (
                ApiError::MissingParameter { name: "magnet" },
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Stream(StreamError::SessionCreate {
                    source: SwarmError::JoinFailed {
                        info_hash,
                        reason: "no peers".to_string(),
                    },
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Stream(StreamError::NoPlayableFile {
                    info_hash,
                    file_count: 1,
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Search(MediaSearchError::NetworkError {
                    reason: "refused".to_string(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_range_error_sets_content_range() {
        let response =
            ApiError::Stream(StreamError::RangeNotSatisfiable { length: 1000 }).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
