//! Data types for search results.

use serde::{Deserialize, Serialize};

/// One torrent returned by the search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Torrent name as listed by the indexer
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Peers with the complete content
    pub seeders: u32,
    /// Peers still downloading
    pub leechers: u32,
    /// Magnet link for streaming
    pub magnet: String,
}

impl SearchResult {
    /// Format file size in human-readable format.
    pub fn format_size(&self) -> String {
        const GB: u64 = 1024 * 1024 * 1024;
        const MB: u64 = 1024 * 1024;

        if self.size >= GB {
            format!("{:.1} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.1} MB", self.size as f64 / MB as f64)
        } else {
            format!("{:.1} KB", self.size as f64 / 1024.0)
        }
    }
}

/// One page of search results as served by `/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    /// Number of results across all pages
    pub total_results: usize,
    /// 1-based page number
    pub current_page: u32,
    /// Page size used for this response
    pub per_page: u32,
    /// Number of pages, `ceil(total_results / per_page)`
    pub total_pages: u32,
    /// Results on this page
    pub results: Vec<SearchResult>,
}
