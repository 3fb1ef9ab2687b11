//! Magstream Core - Swarm session cache and range streaming
//!
//! This crate turns magnet links into seekable media streams: a swarm engine
//! seam, a process-wide session cache that joins each swarm at most once and
//! evicts idle sessions, and a stream controller that serves byte ranges from
//! content that may still be downloading.

pub mod cache;
pub mod config;
pub mod streaming;
pub mod swarm;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use cache::{CacheError, Session, SessionCache, SessionLease};
pub use config::MagstreamConfig;
pub use streaming::{MediaStream, StreamController, StreamError};
pub use swarm::{InfoHash, LocalSwarmEngine, MagnetLink, SwarmEngine, SwarmError};

/// Core errors that can bubble up from any Magstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MagstreamError {
    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MagstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            MagstreamError::Swarm(SwarmError::InvalidMagnet { reason }) => {
                format!("Invalid magnet link: {reason}")
            }
            MagstreamError::Swarm(_) => "Download error occurred".to_string(),
            MagstreamError::Cache(CacheError::SessionCreate { info_hash, .. }) => {
                format!("Could not start download for {info_hash}")
            }
            MagstreamError::Streaming(e) => match e {
                StreamError::NoPlayableFile { .. } => "No playable video file found".to_string(),
                StreamError::RangeNotSatisfiable { .. } => {
                    "Requested range is outside the file".to_string()
                }
                StreamError::ReadyTimeout { .. } => "Timed out waiting for metadata".to_string(),
                _ => "Streaming error occurred".to_string(),
            },
            MagstreamError::Configuration { reason } => format!("Configuration error: {reason}"),
            MagstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MagstreamError::Configuration { .. }
                | MagstreamError::Swarm(SwarmError::InvalidMagnet { .. })
                | MagstreamError::Streaming(StreamError::RangeNotSatisfiable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, MagstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_for_invalid_magnet() {
        let error = MagstreamError::from(SwarmError::InvalidMagnet {
            reason: "missing btih".to_string(),
        });
        assert_eq!(error.user_message(), "Invalid magnet link: missing btih");
        assert!(error.is_user_error());
    }

    #[test]
    fn test_streaming_errors_convert() {
        let error: MagstreamError = StreamError::NoPlayableFile {
            info_hash: InfoHash::new([1; 20]),
            file_count: 2,
        }
        .into();
        assert_eq!(error.user_message(), "No playable video file found");
        assert!(!error.is_user_error());
    }
}
