//! Stream controller: magnet link plus Range header in, media stream out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use super::range::{ByteRange, select_range};
use super::transfer::{MediaBody, transfer_body};
use super::{StreamError, StreamResult};
use crate::cache::{Session, SessionCache};
use crate::swarm::{InfoHash, MagnetLink, SwarmFile};

const CONTENT_TYPE: &str = "video/mp4";

/// Returns the first playable file in listing order with its index.
pub fn select_playable_file(files: &[SwarmFile]) -> Option<(usize, &SwarmFile)> {
    files.iter().enumerate().find(|(_, file)| file.is_playable())
}

/// A media response ready to be written: headers plus a lazy body.
pub struct MediaStream {
    pub info_hash: InfoHash,
    pub session_id: Uuid,
    pub file: SwarmFile,
    /// Requested span, or None for a full response
    pub range: Option<ByteRange>,
    pub content_type: &'static str,
    pub body: MediaBody,
}

impl MediaStream {
    /// True when the response is 206 Partial Content.
    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }

    /// Number of bytes the body will carry.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.file.length, |range| range.byte_count())
    }

    /// `Content-Range` value for partial responses.
    pub fn content_range(&self) -> Option<String> {
        self.range.map(|range| range.content_range())
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("info_hash", &self.info_hash)
            .field("session_id", &self.session_id)
            .field("file", &self.file)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Serves stream requests against the shared session cache.
#[derive(Debug, Clone)]
pub struct StreamController {
    cache: SessionCache,
    ready_timeout: Option<Duration>,
}

impl StreamController {
    /// Creates a controller; `ready_timeout` of None waits indefinitely.
    pub fn new(cache: SessionCache, ready_timeout: Option<Duration>) -> Self {
        Self {
            cache,
            ready_timeout,
        }
    }

    /// The cache this controller acquires sessions from.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Opens a stream for `magnet` honoring an optional `Range` header.
    ///
    /// Acquires and refreshes the session, waits until it is ready, picks the
    /// first playable file and refreshes again before any bytes move. The
    /// session stays leased while waiting and while the body streams, and
    /// the body refreshes it once more when the transfer ends.
    ///
    /// # Errors
    /// - `StreamError::SessionCreate` - Invalid magnet link or engine join failed
    /// - `StreamError::SessionFatal` - Session failed while waiting for readiness
    /// - `StreamError::ReadyTimeout` - Readiness exceeded the configured timeout
    /// - `StreamError::NoPlayableFile` - Content holds no .mp4, .mkv or .avi file
    /// - `StreamError::RangeNotSatisfiable` - Range lies outside the file
    pub async fn open(&self, magnet: &str, range_header: Option<&str>) -> StreamResult<MediaStream> {
        let magnet =
            MagnetLink::parse(magnet).map_err(|source| StreamError::SessionCreate { source })?;
        let session = self.cache.acquire(&magnet).await?;
        self.cache.refresh(&magnet.info_hash);

        let files = {
            let _waiting = session.lease();
            self.await_files(&session).await?
        };

        let (file_index, file) =
            select_playable_file(&files).ok_or_else(|| StreamError::NoPlayableFile {
                info_hash: magnet.info_hash,
                file_count: files.len(),
            })?;
        let file = file.clone();

        self.cache.refresh(&magnet.info_hash);

        let range = select_range(range_header, file.length)?;
        let span = range.or_else(|| ByteRange::full(file.length));

        match range {
            Some(range) => debug!(
                "Serving {} from {}: {}",
                file.name,
                magnet.info_hash,
                range.content_range()
            ),
            None => info!(
                "Serving {} ({} bytes) from {}",
                file.name, file.length, magnet.info_hash
            ),
        }

        Ok(MediaStream {
            info_hash: magnet.info_hash,
            session_id: session.id(),
            range,
            content_type: CONTENT_TYPE,
            body: transfer_body(self.cache.clone(), Arc::clone(&session), file_index, span),
            file,
        })
    }

    /// Waits for readiness, then takes the engine's current listing.
    async fn await_files(&self, session: &Session) -> StreamResult<Arc<Vec<SwarmFile>>> {
        let files = match self.ready_timeout {
            Some(timeout) => tokio::time::timeout(timeout, session.current_files())
                .await
                .map_err(|_| StreamError::ReadyTimeout {
                    info_hash: session.info_hash(),
                    timeout,
                })?,
            None => session.current_files().await,
        };

        files.map_err(|source| StreamError::SessionFatal { source })
    }
}
