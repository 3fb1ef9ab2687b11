//! Error types for torrent search.

use thiserror::Error;

/// Errors that can occur during search operations.
#[derive(Debug, Clone, Error)]
pub enum MediaSearchError {
    /// Search operation failed with the specified query and reason.
    #[error("Search failed for query '{query}': {reason}")]
    SearchFailed {
        /// The search query that failed
        query: String,
        /// The reason for the failure
        reason: String,
    },

    /// Network communication error occurred during search.
    #[error("Network error: {reason}")]
    NetworkError {
        /// The reason for the network error
        reason: String,
    },

    /// Failed to parse the provider response.
    #[error("Parse error: {reason}")]
    ParseError {
        /// The reason for the parse error
        reason: String,
    },

    /// The query was empty or otherwise unusable.
    #[error("Invalid query: {reason}")]
    InvalidQuery {
        /// Why the query was rejected
        reason: String,
    },

    /// Provider was configured with unusable settings.
    #[error("Provider configuration error: {reason}")]
    Configuration {
        /// The reason the configuration was rejected
        reason: String,
    },
}

impl MediaSearchError {
    /// True when the upstream provider, not the caller, is at fault.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            MediaSearchError::SearchFailed { .. }
                | MediaSearchError::NetworkError { .. }
                | MediaSearchError::ParseError { .. }
        )
    }
}
