//! HTTP search provider backed by an external search API.

use async_trait::async_trait;
use magstream_core::config::SearchConfig;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::TorrentSearchProvider;
use crate::errors::MediaSearchError;
use crate::types::SearchResult;

const SEARCH_PATH: &str = "api/v1/search";

/// Provider that queries `<base_url>/api/v1/search?query=...`.
///
/// The API answers with `{"results": [{name, magnet, size, seeders, leechers}]}`;
/// missing numeric fields default to zero.
#[derive(Debug)]
pub struct HttpSearchProvider {
    client: reqwest::Client,
    endpoint: Url,
}

/// Response from the search API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiTorrent>,
}

/// Single torrent entry from the search API.
#[derive(Debug, Deserialize)]
struct ApiTorrent {
    name: String,
    magnet: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    seeders: u32,
    #[serde(default)]
    leechers: u32,
}

impl From<ApiTorrent> for SearchResult {
    fn from(torrent: ApiTorrent) -> Self {
        Self {
            name: torrent.name,
            size: torrent.size,
            seeders: torrent.seeders,
            leechers: torrent.leechers,
            magnet: torrent.magnet,
        }
    }
}

impl HttpSearchProvider {
    /// Creates a provider from search configuration.
    ///
    /// # Errors
    /// - `MediaSearchError::Configuration` - Base URL is not a valid URL or the
    ///   HTTP client cannot be built
    pub fn from_config(config: &SearchConfig) -> Result<Self, MediaSearchError> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/"))
            .and_then(|base| base.join(SEARCH_PATH))
            .map_err(|e| MediaSearchError::Configuration {
                reason: format!("Invalid search URL '{}': {e}", config.base_url),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MediaSearchError::Configuration {
                reason: format!("HTTP client setup failed: {e}"),
            })?;

        Ok(Self { client, endpoint })
    }

    /// The full search endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TorrentSearchProvider for HttpSearchProvider {
    async fn search_torrents(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError> {
        debug!("Searching {} for '{}'", self.endpoint, query);

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| MediaSearchError::NetworkError {
                reason: format!("Search request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(MediaSearchError::SearchFailed {
                query: query.to_string(),
                reason: format!("Search API returned HTTP {}", response.status()),
            });
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| MediaSearchError::ParseError {
                reason: format!("Search API JSON parsing failed: {e}"),
            })?;

        Ok(body.results.into_iter().map(SearchResult::from).collect())
    }
}
