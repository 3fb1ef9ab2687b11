//! Mock provider implementation for testing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::TorrentSearchProvider;
use crate::errors::MediaSearchError;
use crate::types::SearchResult;

/// Mock provider returning canned results whose names contain the query.
#[derive(Debug, Default)]
pub struct MockProvider {
    results: Vec<SearchResult>,
    failure: Mutex<Option<MediaSearchError>>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Creates a provider that answers from `results`.
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    /// Creates a provider with `count` numbered results named `"<prefix> <n>"`.
    pub fn with_generated(prefix: &str, count: usize) -> Self {
        let results = (0..count)
            .map(|i| SearchResult {
                name: format!("{prefix} {i}"),
                size: 700 * 1024 * 1024,
                seeders: (count - i) as u32,
                leechers: i as u32,
                magnet: format!("magnet:?xt=urn:btih:{:040x}", i + 1),
            })
            .collect();
        Self::new(results)
    }

    /// Makes every following search fail with `error`.
    pub fn fail_with(&self, error: MediaSearchError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error);
        }
    }

    /// Number of searches served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TorrentSearchProvider for MockProvider {
    async fn search_torrents(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failure = self.failure.lock().ok().and_then(|failure| failure.clone());
        if let Some(error) = failure {
            return Err(error);
        }

        let query = query.to_lowercase();
        Ok(self
            .results
            .iter()
            .filter(|result| result.name.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }
}
