//! Magstream Web - JSON and streaming API server

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Exposes `/status`, `/search` and `/stream` over axum. Stream requests are
//! served from the shared session cache with HTTP range support.

pub mod errors;
pub mod handlers;
pub mod server;

// Re-export main types
pub use errors::ApiError;
pub use server::{AppState, router, run_server, serve};
