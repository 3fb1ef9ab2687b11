//! In-memory swarm engine for tests and development.
//!
//! Serves registered content from memory with configurable latency, and lets
//! tests inject join failures, stalled transfers and session-fatal errors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{ByteStream, InfoHash, MagnetLink, SwarmEngine, SwarmError, SwarmFile, SwarmHandle};

const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Files making up one simulated content set.
#[derive(Debug, Clone, Default)]
pub struct SimulatedContent {
    files: Vec<(String, Bytes)>,
}

impl SimulatedContent {
    /// Creates an empty content set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file with the given bytes.
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.push((name.into(), data.into()));
        self
    }

    /// Appends a file of `length` bytes with a position-dependent pattern.
    pub fn with_patterned_file(self, name: impl Into<String>, length: usize) -> Self {
        self.with_file(name, patterned_bytes(length))
    }
}

/// Deterministic byte pattern where byte `i` is `i % 251`.
pub fn patterned_bytes(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i % 251) as u8).collect()
}

/// Simulated swarm engine.
///
/// Cloning shares the underlying state, so tests can keep a clone to inspect
/// counters after handing the engine to a cache.
#[derive(Clone, Default)]
pub struct SimulatedSwarm {
    inner: Arc<SimulatedInner>,
}

#[derive(Default)]
struct SimulatedInner {
    content: Mutex<HashMap<InfoHash, SimulatedContent>>,
    handles: Mutex<HashMap<InfoHash, Vec<Arc<SimulatedHandle>>>>,
    failing_joins: Mutex<HashSet<InfoHash>>,
    stalled_reads: Mutex<HashSet<InfoHash>>,
    join_delay: Mutex<Duration>,
    ready_delay: Mutex<Duration>,
    chunk_size: Mutex<Option<usize>>,
    joins: AtomicUsize,
    destroys: Arc<AtomicUsize>,
}

impl SimulatedSwarm {
    /// Creates an engine with no content and no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every join by `delay`.
    pub fn with_join_delay(self, delay: Duration) -> Self {
        *self.inner.join_delay.lock() = delay;
        self
    }

    /// Delays readiness of every joined session by `delay`.
    pub fn with_ready_delay(self, delay: Duration) -> Self {
        *self.inner.ready_delay.lock() = delay;
        self
    }

    /// Splits reads into chunks of `chunk_size` bytes.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        *self.inner.chunk_size.lock() = Some(chunk_size.max(1));
        self
    }

    /// Registers content that joins for `info_hash` will serve.
    pub fn add_content(&self, info_hash: InfoHash, content: SimulatedContent) {
        self.inner.content.lock().insert(info_hash, content);
    }

    /// Makes joins for `info_hash` fail.
    pub fn fail_joins_for(&self, info_hash: InfoHash) {
        self.inner.failing_joins.lock().insert(info_hash);
    }

    /// Lets joins for `info_hash` succeed again.
    pub fn allow_joins_for(&self, info_hash: InfoHash) {
        self.inner.failing_joins.lock().remove(&info_hash);
    }

    /// Makes reads for `info_hash` deliver one chunk and then stall forever.
    pub fn stall_reads_for(&self, info_hash: InfoHash) {
        self.inner.stalled_reads.lock().insert(info_hash);
    }

    /// Reports a session-fatal error on every live handle for `info_hash`.
    pub fn trigger_fatal(&self, info_hash: InfoHash, reason: &str) {
        let handles = self
            .inner
            .handles
            .lock()
            .get(&info_hash)
            .cloned()
            .unwrap_or_default();

        for handle in handles {
            handle.fatal_tx.send_replace(Some(SwarmError::SessionFatal {
                info_hash,
                reason: reason.to_string(),
            }));
        }
    }

    /// Total number of join attempts across all content.
    pub fn join_count(&self) -> usize {
        self.inner.joins.load(Ordering::SeqCst)
    }

    /// Number of join attempts that produced a handle for `info_hash`.
    pub fn handle_count_for(&self, info_hash: InfoHash) -> usize {
        self.inner
            .handles
            .lock()
            .get(&info_hash)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of sessions destroyed.
    pub fn destroy_count(&self) -> usize {
        self.inner.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarm {
    async fn join(&self, magnet: &MagnetLink) -> Result<Arc<dyn SwarmHandle>, SwarmError> {
        let info_hash = magnet.info_hash;
        self.inner.joins.fetch_add(1, Ordering::SeqCst);

        let join_delay = *self.inner.join_delay.lock();
        if !join_delay.is_zero() {
            tokio::time::sleep(join_delay).await;
        }

        if self.inner.failing_joins.lock().contains(&info_hash) {
            return Err(SwarmError::JoinFailed {
                info_hash,
                reason: "simulated join failure".to_string(),
            });
        }

        let content = self
            .inner
            .content
            .lock()
            .get(&info_hash)
            .cloned()
            .ok_or_else(|| SwarmError::JoinFailed {
                info_hash,
                reason: "no peers for content".to_string(),
            })?;

        let (fatal_tx, _) = watch::channel(None);
        let handle = Arc::new(SimulatedHandle {
            info_hash,
            files: content.files,
            ready_delay: *self.inner.ready_delay.lock(),
            chunk_size: self.inner.chunk_size.lock().unwrap_or(DEFAULT_CHUNK_SIZE),
            stalled: self.inner.stalled_reads.lock().contains(&info_hash),
            fatal_tx,
            destroyed: AtomicBool::new(false),
            destroys: Arc::clone(&self.inner.destroys),
        });

        self.inner
            .handles
            .lock()
            .entry(info_hash)
            .or_default()
            .push(Arc::clone(&handle));

        Ok(handle)
    }

    fn engine_type(&self) -> &'static str {
        "simulated"
    }
}

struct SimulatedHandle {
    info_hash: InfoHash,
    files: Vec<(String, Bytes)>,
    ready_delay: Duration,
    chunk_size: usize,
    stalled: bool,
    fatal_tx: watch::Sender<Option<SwarmError>>,
    destroyed: AtomicBool,
    destroys: Arc<AtomicUsize>,
}

#[async_trait]
impl SwarmHandle for SimulatedHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn wait_ready(&self) -> Result<Vec<SwarmFile>, SwarmError> {
        let mut fatal_rx = self.fatal_tx.subscribe();

        tokio::select! {
            _ = tokio::time::sleep(self.ready_delay) => {}
            result = fatal_rx.wait_for(Option::is_some) => {
                let error = result.ok().and_then(|current| current.clone());
                if let Some(error) = error {
                    return Err(error);
                }
            }
        }

        Ok(self
            .files
            .iter()
            .map(|(name, data)| SwarmFile::new(name.clone(), data.len() as u64))
            .collect())
    }

    fn read_range(&self, file_index: usize, start: u64, end: u64) -> ByteStream {
        let Some((_, data)) = self.files.get(file_index) else {
            let error = SwarmError::FileIndexOutOfRange {
                index: file_index,
                file_count: self.files.len(),
            };
            return stream::once(async move { Err(error) }).boxed();
        };

        let len = data.len() as u64;
        let start = start.min(len) as usize;
        let end = end.saturating_add(1).min(len) as usize;
        let slice = data.slice(start..end.max(start));

        let chunks: Vec<Result<Bytes, SwarmError>> = (0..slice.len())
            .step_by(self.chunk_size)
            .map(|offset| {
                let chunk_end = (offset + self.chunk_size).min(slice.len());
                Ok(slice.slice(offset..chunk_end))
            })
            .collect();

        if self.stalled {
            stream::iter(chunks.into_iter().take(1))
                .chain(stream::pending())
                .boxed()
        } else {
            stream::iter(chunks).boxed()
        }
    }

    fn fatal_errors(&self) -> watch::Receiver<Option<SwarmError>> {
        self.fatal_tx.subscribe()
    }

    async fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }
}
