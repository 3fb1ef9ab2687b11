//! Search service: validates queries, calls the provider and pages results.

use std::sync::Arc;

use magstream_core::config::SearchConfig;
use tracing::{info, warn};

use crate::errors::MediaSearchError;
use crate::pagination::{PageRequest, paginate};
use crate::providers::{HttpSearchProvider, TorrentSearchProvider};
use crate::types::SearchPage;

/// Search service shared by request handlers.
///
/// Cheap to clone; clones share the provider.
#[derive(Debug, Clone)]
pub struct MediaSearchService {
    provider: Arc<dyn TorrentSearchProvider>,
}

impl MediaSearchService {
    /// Creates a service over an existing provider.
    pub fn new(provider: Arc<dyn TorrentSearchProvider>) -> Self {
        Self { provider }
    }

    /// Creates a service backed by the HTTP search API.
    ///
    /// # Errors
    /// - `MediaSearchError::Configuration` - Invalid search API settings
    pub fn from_config(config: &SearchConfig) -> Result<Self, MediaSearchError> {
        let provider = HttpSearchProvider::from_config(config)?;
        info!("Search service using {}", provider.endpoint());
        Ok(Self::new(Arc::new(provider)))
    }

    /// Runs `query` and returns the requested page.
    ///
    /// # Errors
    /// - `MediaSearchError::InvalidQuery` - Query is empty after trimming
    /// - `MediaSearchError::SearchFailed` - Provider rejected the query
    /// - `MediaSearchError::NetworkError` - Network connectivity issues
    /// - `MediaSearchError::ParseError` - Provider response could not be decoded
    pub async fn search(
        &self,
        query: &str,
        request: PageRequest,
    ) -> Result<SearchPage, MediaSearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MediaSearchError::InvalidQuery {
                reason: "query must not be empty".to_string(),
            });
        }

        let results = self.provider.search_torrents(query).await.map_err(|e| {
            warn!("Search for '{}' failed: {}", query, e);
            e
        })?;

        let page = paginate(results, request);
        info!(
            "Search '{}': {} results, page {}/{}",
            query, page.total_results, page.current_page, page.total_pages
        );
        Ok(page)
    }
}
