//! HTTP request handlers organized by functionality

pub mod search;
pub mod status;
pub mod stream;

// Re-export handler functions
pub use search::{SearchQuery, api_search};
pub use status::{StatusResponse, api_status};
pub use stream::{StreamQuery, stream_magnet};
