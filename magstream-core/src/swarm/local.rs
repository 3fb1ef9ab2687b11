//! Directory-backed swarm engine
//!
//! Content for info hash `H` is expected under `<download_dir>/<H>/`, written
//! there by an external torrent client. Joining drops a `<H>.magnet` file into
//! the download directory for the client to pick up.
//!
//! When the downloader writes a `manifest.json`, that listing and its final
//! lengths are authoritative and the session is ready as soon as it appears.
//! Without one, the session is ready once a playable file is on disk, and
//! every request re-lists the directory so lengths track the files as they
//! grow. Reads follow files as they grow either way.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ByteStream, InfoHash, MagnetLink, SwarmEngine, SwarmError, SwarmFile, SwarmHandle};
use crate::config::StorageConfig;

/// Optional file listing written by the downloader with final file sizes.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Swarm engine that serves content from the download directory.
#[derive(Debug, Clone)]
pub struct LocalSwarmEngine {
    config: StorageConfig,
}

impl LocalSwarmEngine {
    /// Creates an engine rooted at `config.download_dir`.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Directory holding the content for `info_hash`.
    pub fn content_dir(&self, info_hash: InfoHash) -> PathBuf {
        self.config.download_dir.join(info_hash.to_string())
    }
}

#[async_trait]
impl SwarmEngine for LocalSwarmEngine {
    async fn join(&self, magnet: &MagnetLink) -> Result<Arc<dyn SwarmHandle>, SwarmError> {
        let info_hash = magnet.info_hash;
        let join_failed = |e: std::io::Error| SwarmError::JoinFailed {
            info_hash,
            reason: format!(
                "download directory {} unavailable: {e}",
                self.config.download_dir.display()
            ),
        };

        tokio::fs::create_dir_all(&self.config.download_dir)
            .await
            .map_err(join_failed)?;

        let request_path = self.config.download_dir.join(format!("{info_hash}.magnet"));
        if !tokio::fs::try_exists(&request_path).await.unwrap_or(false) {
            tokio::fs::write(&request_path, magnet.uri.as_bytes())
                .await
                .map_err(join_failed)?;
        }

        let (fatal_tx, _) = watch::channel(None);
        let (closed_tx, _) = watch::channel(false);
        let handle = Arc::new(LocalHandle {
            info_hash,
            content_dir: self.content_dir(info_hash),
            chunk_size: self.config.read_chunk_size.max(1),
            poll_interval: self.config.poll_interval,
            files: Mutex::new(None),
            fatal_tx,
            closed_tx,
        });

        tokio::spawn(monitor_content_dir(Arc::clone(&handle)));

        info!(
            "Joined {} via download directory {}",
            info_hash,
            handle.content_dir.display()
        );
        Ok(handle)
    }

    fn engine_type(&self) -> &'static str {
        "local"
    }
}

struct LocalHandle {
    info_hash: InfoHash,
    content_dir: PathBuf,
    chunk_size: usize,
    poll_interval: Duration,
    files: Mutex<Option<Vec<SwarmFile>>>,
    fatal_tx: watch::Sender<Option<SwarmError>>,
    closed_tx: watch::Sender<bool>,
}

impl LocalHandle {
    fn fatal_error(&self) -> Option<SwarmError> {
        self.fatal_tx.borrow().clone()
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

#[async_trait]
impl SwarmHandle for LocalHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn wait_ready(&self) -> Result<Vec<SwarmFile>, SwarmError> {
        loop {
            if let Some(error) = self.fatal_error() {
                return Err(error);
            }
            if self.is_closed() {
                return Err(SwarmError::NotReady {
                    info_hash: self.info_hash,
                });
            }

            let listing = list_content(&self.content_dir).await?;
            if listing.is_ready() {
                debug!(
                    "{} ready with {} files (manifest: {})",
                    self.info_hash,
                    listing.files.len(),
                    listing.from_manifest
                );
                *self.files.lock() = Some(listing.files.clone());
                return Ok(listing.files);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn current_files(&self) -> Result<Option<Vec<SwarmFile>>, SwarmError> {
        let listing = list_content(&self.content_dir).await?;
        *self.files.lock() = Some(listing.files.clone());
        Ok(Some(listing.files))
    }

    fn read_range(&self, file_index: usize, start: u64, end: u64) -> ByteStream {
        let files = self.files.lock().clone();
        let Some(files) = files else {
            let error = SwarmError::NotReady {
                info_hash: self.info_hash,
            };
            return stream::once(async move { Err(error) }).boxed();
        };
        let Some(file) = files.get(file_index) else {
            let error = SwarmError::FileIndexOutOfRange {
                index: file_index,
                file_count: files.len(),
            };
            return stream::once(async move { Err(error) }).boxed();
        };

        let reader = GrowingFileReader {
            path: self.content_dir.join(&file.name),
            file: None,
            position: start,
            end,
            chunk_size: self.chunk_size,
            poll_interval: self.poll_interval,
            fatal_rx: self.fatal_tx.subscribe(),
            closed_rx: self.closed_tx.subscribe(),
        };

        stream::unfold(Some(reader), |reader| async move {
            let mut reader = reader?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
        .boxed()
    }

    fn fatal_errors(&self) -> watch::Receiver<Option<SwarmError>> {
        self.fatal_tx.subscribe()
    }

    async fn destroy(&self) {
        if !self.closed_tx.send_replace(true) {
            info!("Released local session {}", self.info_hash);
        }
    }
}

/// Reads `position..=end` of a file that may still be growing on disk.
struct GrowingFileReader {
    path: PathBuf,
    file: Option<File>,
    position: u64,
    end: u64,
    chunk_size: usize,
    poll_interval: Duration,
    fatal_rx: watch::Receiver<Option<SwarmError>>,
    closed_rx: watch::Receiver<bool>,
}

impl GrowingFileReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SwarmError> {
        loop {
            if self.position > self.end {
                return Ok(None);
            }
            if let Some(error) = self.fatal_rx.borrow().clone() {
                return Err(error);
            }
            if *self.closed_rx.borrow() {
                return Err(SwarmError::Read {
                    reason: format!("session closed while reading {}", self.path.display()),
                });
            }

            if self.file.is_none() {
                match File::open(&self.path).await {
                    Ok(mut file) => {
                        file.seek(SeekFrom::Start(self.position)).await?;
                        self.file = Some(file);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let remaining = self.end - self.position + 1;
            let want = remaining.min(self.chunk_size as u64) as usize;
            let mut buffer = BytesMut::zeroed(want);

            let read = match self.file.as_mut() {
                Some(file) => file.read(&mut buffer).await?,
                None => 0,
            };

            if read == 0 {
                // Bytes not downloaded yet.
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            buffer.truncate(read);
            self.position += read as u64;
            return Ok(Some(buffer.freeze()));
        }
    }
}

/// Files found in a content directory.
#[derive(Debug, Default)]
struct Listing {
    files: Vec<SwarmFile>,
    from_manifest: bool,
}

impl Listing {
    /// A manifest is final; a bare directory needs a playable file first.
    fn is_ready(&self) -> bool {
        if self.from_manifest {
            !self.files.is_empty()
        } else {
            self.files.iter().any(SwarmFile::is_playable)
        }
    }
}

/// Lists content files, preferring the manifest when present.
async fn list_content(content_dir: &Path) -> Result<Listing, SwarmError> {
    if !tokio::fs::try_exists(content_dir).await.unwrap_or(false) {
        return Ok(Listing::default());
    }

    let manifest_path = content_dir.join(MANIFEST_FILE);
    if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
        let raw = tokio::fs::read(&manifest_path).await?;
        let files = serde_json::from_slice(&raw).map_err(|e| SwarmError::Read {
            reason: format!("invalid manifest {}: {e}", manifest_path.display()),
        })?;
        return Ok(Listing {
            files,
            from_manifest: true,
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![content_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(content_dir) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(SwarmFile::new(name, metadata.len()));
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Listing {
        files,
        from_manifest: false,
    })
}

/// Reports a fatal error if the content directory vanishes after appearing.
async fn monitor_content_dir(handle: Arc<LocalHandle>) {
    let mut seen = false;
    let mut closed_rx = handle.closed_tx.subscribe();

    loop {
        if *closed_rx.borrow() {
            return;
        }

        let exists = tokio::fs::try_exists(&handle.content_dir)
            .await
            .unwrap_or(false);
        if exists {
            seen = true;
        } else if seen {
            warn!(
                "Content directory for {} disappeared: {}",
                handle.info_hash,
                handle.content_dir.display()
            );
            handle.fatal_tx.send_replace(Some(SwarmError::SessionFatal {
                info_hash: handle.info_hash,
                reason: "content directory removed".to_string(),
            }));
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(handle.poll_interval) => {}
            _ = closed_rx.changed() => {}
        }
    }
}
