//! Cached swarm session
//!
//! Wraps an engine handle with a monotonic readiness latch and a fatal-error
//! latch. A supervisor task drives the engine's readiness future and forwards
//! engine-reported fatal errors onto the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::swarm::{ByteStream, InfoHash, MagnetLink, SwarmError, SwarmFile, SwarmHandle};

/// One active swarm download shared by every request for its content.
pub struct Session {
    id: Uuid,
    info_hash: InfoHash,
    display_name: Option<String>,
    handle: Arc<dyn SwarmHandle>,
    ready_tx: watch::Sender<Option<Arc<Vec<SwarmFile>>>>,
    fatal_tx: watch::Sender<Option<SwarmError>>,
    closed_tx: watch::Sender<bool>,
    destroyed: AtomicBool,
    leases: AtomicUsize,
    created_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("info_hash", &self.info_hash)
            .field("ready", &self.is_ready())
            .field("failed", &self.fatal_error().is_some())
            .field("leases", &self.active_leases())
            .finish()
    }
}

impl Session {
    /// Wraps `handle` and spawns its supervisor on the current runtime.
    pub(crate) fn start(handle: Arc<dyn SwarmHandle>, magnet: &MagnetLink) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(None);
        let (fatal_tx, _) = watch::channel(None);
        let (closed_tx, _) = watch::channel(false);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            info_hash: magnet.info_hash,
            display_name: magnet.display_name.clone(),
            handle,
            ready_tx,
            fatal_tx,
            closed_tx,
            destroyed: AtomicBool::new(false),
            leases: AtomicUsize::new(0),
            created_at: Instant::now(),
        });

        tokio::spawn(supervise(Arc::clone(&session)));
        session
    }

    /// Unique id of this session instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Info hash of the content this session downloads.
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Display name from the magnet link, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// True once the engine has reported the content metadata.
    pub fn is_ready(&self) -> bool {
        self.ready_tx.borrow().is_some()
    }

    /// File listing, available once ready.
    pub fn files(&self) -> Option<Arc<Vec<SwarmFile>>> {
        self.ready_tx.borrow().clone()
    }

    /// The fatal error latched on this session, if any.
    pub fn fatal_error(&self) -> Option<SwarmError> {
        self.fatal_tx.borrow().clone()
    }

    /// Receiver that flips to `Some` when the session fails.
    pub fn fatal_signal(&self) -> watch::Receiver<Option<SwarmError>> {
        self.fatal_tx.subscribe()
    }

    /// Suspends until the session is ready.
    ///
    /// # Errors
    /// - `SwarmError::SessionFatal` - Session failed before or after becoming ready
    /// - `SwarmError::NotReady` - Session was destroyed while waiting
    pub async fn wait_ready(&self) -> Result<Arc<Vec<SwarmFile>>, SwarmError> {
        let mut ready_rx = self.ready_tx.subscribe();
        let mut fatal_rx = self.fatal_tx.subscribe();
        let mut closed_rx = self.closed_tx.subscribe();

        loop {
            if let Some(error) = fatal_rx.borrow_and_update().clone() {
                return Err(error);
            }
            if let Some(files) = ready_rx.borrow_and_update().clone() {
                return Ok(files);
            }
            if *closed_rx.borrow_and_update() {
                return Err(SwarmError::NotReady {
                    info_hash: self.info_hash,
                });
            }

            tokio::select! {
                _ = ready_rx.changed() => {}
                _ = fatal_rx.changed() => {}
                _ = closed_rx.changed() => {}
            }
        }
    }

    /// Waits for readiness, then returns the engine's current listing.
    ///
    /// Falls back to the listing reported at readiness when the engine's
    /// files do not change afterwards.
    ///
    /// # Errors
    /// - `SwarmError::SessionFatal` - Session failed before or after becoming ready
    /// - `SwarmError::NotReady` - Session was destroyed while waiting
    /// - `SwarmError::Io` - Engine could not list the content
    pub async fn current_files(&self) -> Result<Arc<Vec<SwarmFile>>, SwarmError> {
        let ready = self.wait_ready().await?;
        match self.handle.current_files().await? {
            Some(files) => Ok(Arc::new(files)),
            None => Ok(ready),
        }
    }

    /// Marks the session as in use until the returned lease is dropped.
    ///
    /// The idle timer never evicts a leased session; it re-arms instead.
    pub fn lease(self: &Arc<Self>) -> SessionLease {
        self.leases.fetch_add(1, Ordering::SeqCst);
        SessionLease {
            session: Arc::clone(self),
        }
    }

    /// Number of requests currently waiting on or reading from the session.
    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Streams bytes `start..=end` of the file at `file_index`.
    pub fn read_range(&self, file_index: usize, start: u64, end: u64) -> ByteStream {
        self.handle.read_range(file_index, start, end)
    }

    /// Latches `error` as the session's fatal error.
    ///
    /// Returns false if the session had already failed; the first error wins.
    pub(crate) fn fail(&self, error: SwarmError) -> bool {
        let latched = self.fatal_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(error.clone());
            true
        });

        if latched {
            warn!("Session {} for {} failed: {}", self.id, self.info_hash, error);
        }
        latched
    }

    /// Terminates the engine session. Subsequent calls do nothing.
    pub(crate) async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.closed_tx.send_replace(true);
        self.handle.destroy().await;
        info!(
            "Destroyed session {} for {} after {:?}",
            self.id,
            self.info_hash,
            self.created_at.elapsed()
        );
    }

    /// True once `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Keeps a session out of idle eviction while a request uses it.
pub struct SessionLease {
    session: Arc<Session>,
}

impl SessionLease {
    /// The leased session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.session.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session", &self.session.id)
            .finish()
    }
}

/// Resolves with the next fatal error, or never if the engine drops its latch.
pub(crate) async fn next_fatal(rx: &mut watch::Receiver<Option<SwarmError>>) -> SwarmError {
    let error = match rx.wait_for(Option::is_some).await {
        Ok(current) => current.clone(),
        Err(_) => None,
    };

    match error {
        Some(error) => error,
        None => std::future::pending().await,
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn supervise(session: Arc<Session>) {
    let mut engine_fatal = session.handle.fatal_errors();
    let mut closed_rx = session.closed_tx.subscribe();

    tokio::select! {
        result = session.handle.wait_ready() => match result {
            Ok(files) => {
                debug!(
                    "Session {} for {} ready with {} files",
                    session.id,
                    session.info_hash,
                    files.len()
                );
                session.ready_tx.send_replace(Some(Arc::new(files)));
            }
            Err(error) => {
                session.fail(error);
                return;
            }
        },
        error = next_fatal(&mut engine_fatal) => {
            session.fail(error);
            return;
        }
        _ = wait_closed(&mut closed_rx) => return,
    }

    tokio::select! {
        error = next_fatal(&mut engine_fatal) => {
            session.fail(error);
        }
        _ = wait_closed(&mut closed_rx) => {}
    }
}
