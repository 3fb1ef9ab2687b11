//! Range streaming over cached swarm sessions.
//!
//! The controller turns a magnet link and an optional `Range` header into a
//! `MediaStream`: response metadata plus a body that pulls bytes from the
//! shared session. Transfers refresh the session's idle timer when they end
//! and never evict it themselves.

pub mod controller;
pub mod range;
mod transfer;

use std::time::Duration;

pub use controller::{MediaStream, StreamController, select_playable_file};
pub use range::{ByteRange, RangeSpec, parse_range_header, select_range};
pub use transfer::MediaBody;

pub use crate::swarm::PLAYABLE_EXTENSIONS;

use crate::cache::CacheError;
use crate::swarm::{InfoHash, SwarmError};

/// Errors that end a stream request or an in-progress transfer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("Session creation failed: {source}")]
    SessionCreate { source: SwarmError },

    #[error("No playable file in {info_hash} ({file_count} files)")]
    NoPlayableFile {
        info_hash: InfoHash,
        file_count: usize,
    },

    #[error("Transfer failed: {reason}")]
    Transport { reason: String },

    #[error("Session failed: {source}")]
    SessionFatal { source: SwarmError },

    #[error("Range not satisfiable for {length} byte file")]
    RangeNotSatisfiable { length: u64 },

    #[error("Session {info_hash} not ready after {timeout:?}")]
    ReadyTimeout {
        info_hash: InfoHash,
        timeout: Duration,
    },
}

impl From<CacheError> for StreamError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::SessionCreate { source, .. } => StreamError::SessionCreate { source },
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
