//! Provider implementations for torrent search.

use async_trait::async_trait;

use crate::errors::MediaSearchError;
use crate::types::SearchResult;

pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use http::HttpSearchProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockProvider;

/// Trait for torrent search providers.
///
/// Implementations return every match for a query; paging happens in the
/// search service.
#[async_trait]
pub trait TorrentSearchProvider: Send + Sync + std::fmt::Debug {
    /// Search for torrents matching a free-text query.
    ///
    /// # Errors
    /// - `MediaSearchError::SearchFailed` - Provider rejected the query
    /// - `MediaSearchError::NetworkError` - Network connectivity issues
    /// - `MediaSearchError::ParseError` - Provider response could not be decoded
    async fn search_torrents(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError>;
}
