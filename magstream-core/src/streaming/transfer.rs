//! Byte transfer from a swarm session to one HTTP response body.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::StreamError;
use super::range::ByteRange;
use crate::cache::{Session, SessionCache, SessionLease, next_fatal};
use crate::swarm::{ByteStream, InfoHash, SwarmError};

/// Response body of a media stream.
pub type MediaBody = BoxStream<'static, Result<Bytes, StreamError>>;

enum Outcome {
    InProgress,
    Completed,
    Failed(String),
}

/// Holds the session lease for the life of the body and refreshes the
/// session when the transfer ends, however it ends.
///
/// Dropping the body before the range is exhausted counts as a client
/// disconnect.
struct TransferGuard {
    cache: SessionCache,
    lease: Option<SessionLease>,
    info_hash: InfoHash,
    expected: u64,
    sent: u64,
    outcome: Outcome,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        match &self.outcome {
            Outcome::Completed => debug!(
                "Transfer of {} bytes from {} complete",
                self.sent, self.info_hash
            ),
            Outcome::Failed(reason) => warn!(
                "Transfer from {} failed after {} of {} bytes: {}",
                self.info_hash, self.sent, self.expected, reason
            ),
            Outcome::InProgress => info!(
                "Client disconnected from {} after {} of {} bytes",
                self.info_hash, self.sent, self.expected
            ),
        }

        // Release before refreshing so the new deadline counts from now.
        self.lease.take();
        self.cache.refresh(&self.info_hash);
    }
}

struct Transfer {
    source: Option<ByteStream>,
    fatal: watch::Receiver<Option<SwarmError>>,
    position: u64,
    remaining: u64,
    guard: TransferGuard,
}

enum Step {
    Fatal(SwarmError),
    Chunk(Option<Result<Bytes, SwarmError>>),
}

/// Builds the body that streams `range` of `file_index` from `session`.
///
/// `None` yields an empty body, used for zero-length files. Either way the
/// session stays leased until the body is finished or dropped.
pub(crate) fn transfer_body(
    cache: SessionCache,
    session: Arc<Session>,
    file_index: usize,
    range: Option<ByteRange>,
) -> MediaBody {
    let (position, remaining, source) = match range {
        Some(range) => (
            range.start,
            range.byte_count(),
            Some(session.read_range(file_index, range.start, range.end)),
        ),
        None => (0, 0, None),
    };

    let transfer = Transfer {
        source,
        fatal: session.fatal_signal(),
        position,
        remaining,
        guard: TransferGuard {
            cache,
            info_hash: session.info_hash(),
            lease: Some(session.lease()),
            expected: remaining,
            sent: 0,
            outcome: Outcome::InProgress,
        },
    };

    stream::unfold(transfer, |mut transfer| async move {
        let item = transfer.next_chunk().await?;
        Some((item, transfer))
    })
    .boxed()
}

impl Transfer {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        if self.remaining == 0 {
            self.source = None;
            self.guard.outcome = Outcome::Completed;
            return None;
        }

        let step = {
            let source = self.source.as_mut()?;
            tokio::select! {
                biased;
                error = next_fatal(&mut self.fatal) => Step::Fatal(error),
                chunk = source.next() => Step::Chunk(chunk),
            }
        };

        match step {
            Step::Fatal(source) => Some(Err(self.abort(StreamError::SessionFatal { source }))),
            Step::Chunk(Some(Ok(chunk))) => Some(Ok(self.accept(chunk))),
            Step::Chunk(Some(Err(error))) => Some(Err(self.abort(StreamError::Transport {
                reason: error.to_string(),
            }))),
            Step::Chunk(None) => {
                let reason = format!(
                    "engine stream ended at byte {} with {} bytes outstanding",
                    self.position, self.remaining
                );
                Some(Err(self.abort(StreamError::Transport { reason })))
            }
        }
    }

    /// Trims `chunk` to the requested range and advances the position.
    fn accept(&mut self, chunk: Bytes) -> Bytes {
        let chunk = if chunk.len() as u64 > self.remaining {
            chunk.slice(..self.remaining as usize)
        } else {
            chunk
        };

        let len = chunk.len() as u64;
        self.position += len;
        self.remaining -= len;
        self.guard.sent += len;
        chunk
    }

    /// Drops the engine stream and records the failure.
    fn abort(&mut self, error: StreamError) -> StreamError {
        self.source = None;
        self.guard.outcome = Outcome::Failed(error.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::TryStreamExt;

    use super::*;
    use crate::swarm::simulated::patterned_bytes;
    use crate::swarm::{MagnetLink, SimulatedContent, SimulatedSwarm};

    async fn setup(byte: u8, swarm: SimulatedSwarm) -> (SessionCache, Arc<Session>) {
        let info_hash = InfoHash::new([byte; 20]);
        let magnet = MagnetLink::parse(&format!("magnet:?xt=urn:btih:{info_hash}")).unwrap();
        swarm.add_content(
            info_hash,
            SimulatedContent::new().with_patterned_file("movie.mp4", 1000),
        );
        let cache = SessionCache::new(Arc::new(swarm), Duration::from_secs(60));
        let session = cache.acquire(&magnet).await.unwrap();
        session.wait_ready().await.unwrap();
        (cache, session)
    }

    fn range(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange {
            start,
            end,
            total: 1000,
        })
    }

    #[tokio::test]
    async fn test_transfer_delivers_exact_range() {
        let (cache, session) = setup(1, SimulatedSwarm::new().with_chunk_size(64)).await;

        let chunks: Vec<Bytes> = transfer_body(cache, session, 0, range(100, 299))
            .try_collect()
            .await
            .unwrap();
        let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(bytes, patterned_bytes(1000)[100..300].to_vec());
    }

    #[tokio::test]
    async fn test_empty_range_yields_no_bytes() {
        let (cache, session) = setup(2, SimulatedSwarm::new()).await;
        let chunks: Vec<Bytes> = transfer_body(cache, session, 0, None)
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_body_refreshes_without_evicting() {
        let (cache, session) = setup(3, SimulatedSwarm::new().with_chunk_size(10)).await;
        let info_hash = session.info_hash();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let mut body = transfer_body(cache.clone(), session, 0, range(0, 999));
        assert!(body.next().await.is_some());
        drop(body);

        assert!(cache.contains(&info_hash));
        assert_eq!(cache.expires_in(&info_hash), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_body_refreshes_on_completion() {
        let (cache, session) = setup(6, SimulatedSwarm::new()).await;
        let info_hash = session.info_hash();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let body = transfer_body(cache.clone(), Arc::clone(&session), 0, None);
        assert_eq!(session.active_leases(), 1);
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();

        assert!(chunks.is_empty());
        assert_eq!(session.active_leases(), 0);
        assert_eq!(cache.expires_in(&info_hash), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_transfer_keeps_session_past_ttl() {
        let swarm = SimulatedSwarm::new().with_chunk_size(10);
        let info_hash = InfoHash::new([7; 20]);
        swarm.stall_reads_for(info_hash);
        let (cache, session) = setup(7, swarm.clone()).await;

        let mut body = transfer_body(cache.clone(), Arc::clone(&session), 0, range(0, 999));
        assert!(matches!(body.next().await, Some(Ok(_))));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.contains(&info_hash));
        assert!(!session.is_destroyed());
        assert_eq!(swarm.destroy_count(), 0);

        drop(body);
        assert_eq!(session.active_leases(), 0);
        assert_eq!(cache.expires_in(&info_hash), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_transfer() {
        let swarm = SimulatedSwarm::new().with_chunk_size(10);
        let info_hash = InfoHash::new([4; 20]);
        swarm.stall_reads_for(info_hash);
        let (cache, session) = setup(4, swarm.clone()).await;

        let mut body = transfer_body(cache, session, 0, range(0, 999));
        assert!(matches!(body.next().await, Some(Ok(_))));

        swarm.trigger_fatal(info_hash, "peer banned us");
        assert!(matches!(
            body.next().await,
            Some(Err(StreamError::SessionFatal { .. }))
        ));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_short_engine_stream_is_transport_error() {
        let (cache, session) = setup(5, SimulatedSwarm::new()).await;

        // Range runs past the 1000 byte file, so the engine stops early.
        let body = transfer_body(
            cache,
            session,
            0,
            Some(ByteRange {
                start: 900,
                end: 1099,
                total: 1100,
            }),
        );
        let result: Result<Vec<Bytes>, StreamError> = body.try_collect().await;
        assert!(matches!(result, Err(StreamError::Transport { .. })));
    }
}
