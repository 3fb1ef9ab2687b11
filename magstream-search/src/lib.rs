//! Magstream Search - Torrent search proxy

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Forwards free-text queries to an external search API and pages the
//! normalized results for the HTTP layer.

pub mod errors;
pub mod pagination;
pub mod providers;
pub mod service;
pub mod types;

// Re-export main types
pub use errors::MediaSearchError;
pub use pagination::{PageRequest, paginate};
pub use providers::{HttpSearchProvider, TorrentSearchProvider};
pub use service::MediaSearchService;
pub use types::{SearchPage, SearchResult};

/// Convenience type alias for Results with MediaSearchError.
pub type Result<T> = std::result::Result<T, MediaSearchError>;
