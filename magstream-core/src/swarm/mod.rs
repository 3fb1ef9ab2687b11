//! Swarm engine abstraction
//!
//! The peer-to-peer transport is an external collaborator. This module defines
//! the seam the session cache talks to: join a swarm by magnet link, wait for
//! its metadata, read byte ranges of a constituent file, and observe
//! session-fatal errors reported asynchronously by the engine.

pub mod local;
pub mod magnet;
#[cfg(any(test, feature = "test-utils"))]
pub mod simulated;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use local::LocalSwarmEngine;
pub use magnet::MagnetLink;
#[cfg(any(test, feature = "test-utils"))]
pub use simulated::{SimulatedContent, SimulatedSwarm};

/// SHA-1 hash identifying a unique swarm content set.
///
/// Used as the session cache key, so magnet links that differ only in
/// trackers or display name resolve to the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string into an InfoHash.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMagnet` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, SwarmError> {
        if hex_str.len() != 40 {
            return Err(SwarmError::InvalidMagnet {
                reason: format!("Invalid hash length: {} (expected 40)", hex_str.len()),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|e| SwarmError::InvalidMagnet {
            reason: format!("Invalid hex in info hash {hex_str}: {e}"),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// File extensions served as media, matched case-insensitively.
pub const PLAYABLE_EXTENSIONS: [&str; 3] = [".mp4", ".mkv", ".avi"];

/// One constituent file of a swarm content set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmFile {
    /// Path of the file within the content set
    pub name: String,
    /// Final size of the file in bytes
    pub length: u64,
}

impl SwarmFile {
    /// Creates a file entry.
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }

    /// True if the name ends in one of the playable media extensions.
    pub fn is_playable(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        PLAYABLE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Errors reported by swarm engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwarmError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Failed to join swarm {info_hash}: {reason}")]
    JoinFailed { info_hash: InfoHash, reason: String },

    #[error("Swarm {info_hash} is not ready")]
    NotReady { info_hash: InfoHash },

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Read failed: {reason}")]
    Read { reason: String },

    #[error("Swarm session {info_hash} failed: {reason}")]
    SessionFatal { info_hash: InfoHash, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for SwarmError {
    fn from(error: std::io::Error) -> Self {
        SwarmError::Io {
            reason: error.to_string(),
        }
    }
}

/// Stream of file bytes produced by a swarm engine.
pub type ByteStream = BoxStream<'static, Result<Bytes, SwarmError>>;

/// Engine capable of joining swarms by magnet link.
///
/// Implementations decide whether joining is event-driven or polling; callers
/// only see the async contract.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Joins or creates a download session for the magnet link.
    ///
    /// Returns as soon as the engine has accepted the content. Metadata may
    /// not be available yet; use `SwarmHandle::wait_ready`.
    ///
    /// # Errors
    /// - `SwarmError::JoinFailed` - Engine could not create the session
    /// - `SwarmError::InvalidMagnet` - Engine rejected the identifier
    async fn join(&self, magnet: &MagnetLink) -> Result<Arc<dyn SwarmHandle>, SwarmError>;

    /// Short name used in logs.
    fn engine_type(&self) -> &'static str;
}

/// Handle to one engine-managed download session.
#[async_trait]
pub trait SwarmHandle: Send + Sync {
    /// Info hash this handle downloads.
    fn info_hash(&self) -> InfoHash;

    /// Suspends until the engine has the content metadata.
    ///
    /// Resolves with the constituent files in engine listing order.
    ///
    /// # Errors
    /// - `SwarmError::SessionFatal` - Session broke before becoming ready
    async fn wait_ready(&self) -> Result<Vec<SwarmFile>, SwarmError>;

    /// Listing as of now, for engines whose files grow after readiness.
    ///
    /// `None` means the listing from `wait_ready` is final.
    ///
    /// # Errors
    /// - `SwarmError::Io` - Listing could not be read
    async fn current_files(&self) -> Result<Option<Vec<SwarmFile>>, SwarmError> {
        Ok(None)
    }

    /// Streams bytes `start..=end` of the file at `file_index`.
    ///
    /// The stream may suspend while the bytes are still being downloaded and
    /// yields an error item if the read fails.
    fn read_range(&self, file_index: usize, start: u64, end: u64) -> ByteStream;

    /// Latch flipped to `Some` when the engine declares the session broken.
    fn fatal_errors(&self) -> watch::Receiver<Option<SwarmError>>;

    /// Terminates the underlying session. Calling it twice is harmless.
    async fn destroy(&self);
}
