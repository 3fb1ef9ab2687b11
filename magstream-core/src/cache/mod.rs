//! Process-wide swarm session cache
//!
//! Maps info hashes to live swarm sessions. Concurrent acquires for unseen
//! content share one in-flight join, so each swarm is joined at most once.
//! Every entry carries a sliding idle timer; refreshing cancels the armed
//! timer and arms a new one under the table lock, so the latest refresh
//! always determines the deadline.

mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) use self::session::next_fatal;
pub use self::session::{Session, SessionLease};
use crate::swarm::{InfoHash, MagnetLink, SwarmEngine, SwarmError};

/// Errors returned by the session cache.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The engine could not join or create a session for the content.
    #[error("Could not create session for {info_hash}: {source}")]
    SessionCreate {
        info_hash: InfoHash,
        source: SwarmError,
    },
}

type JoinFuture = Shared<BoxFuture<'static, Result<Arc<Session>, CacheError>>>;

enum Slot {
    Joining { token: u64, join: JoinFuture },
    Live(CacheEntry),
}

struct CacheEntry {
    session: Arc<Session>,
    deadline: Instant,
    epoch: u64,
    timer: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl CacheEntry {
    fn cancel_tasks(&self) {
        self.timer.abort();
        self.watcher.abort();
    }
}

struct CacheInner {
    engine: Arc<dyn SwarmEngine>,
    ttl: Duration,
    runtime: Handle,
    table: Mutex<HashMap<InfoHash, Slot>>,
    counter: AtomicU64,
}

/// Shared handle to the session cache.
///
/// Cheap to clone; all clones operate on the same table.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<CacheInner>,
}

impl SessionCache {
    /// Creates a cache that joins swarms through `engine`.
    ///
    /// Must be called from within a Tokio runtime; timers and supervisors are
    /// spawned on that runtime.
    pub fn new(engine: Arc<dyn SwarmEngine>, ttl: Duration) -> Self {
        info!(
            "Session cache using {} engine, ttl {:?}",
            engine.engine_type(),
            ttl
        );

        Self {
            inner: Arc::new(CacheInner {
                engine,
                ttl,
                runtime: Handle::current(),
                table: Mutex::new(HashMap::new()),
                counter: AtomicU64::new(0),
            }),
        }
    }

    /// Idle time-to-live applied on every refresh.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Returns the session for `magnet`, joining the swarm if needed.
    ///
    /// Existing entries are returned without contacting the engine. For an
    /// unseen info hash exactly one join runs; concurrent callers await the
    /// same join and receive the same session. The entry is inserted with a
    /// fresh deadline before any caller sees the session.
    ///
    /// # Errors
    /// - `CacheError::SessionCreate` - Engine join failed; nothing was inserted
    pub async fn acquire(&self, magnet: &MagnetLink) -> Result<Arc<Session>, CacheError> {
        let info_hash = magnet.info_hash;

        let join = {
            let mut table = self.inner.table.lock();
            match table.get(&info_hash) {
                Some(Slot::Live(entry)) => {
                    debug!("Cache hit for {}", info_hash);
                    return Ok(Arc::clone(&entry.session));
                }
                Some(Slot::Joining { join, .. }) => {
                    debug!("Joining {} already in flight", info_hash);
                    join.clone()
                }
                None => {
                    let token = self.next_counter();
                    let join = self.spawn_join(token, magnet.clone());
                    table.insert(
                        info_hash,
                        Slot::Joining {
                            token,
                            join: join.clone(),
                        },
                    );
                    join
                }
            }
        };

        join.await
    }

    /// Pushes the entry's deadline to `now + ttl`.
    ///
    /// Returns false if there is no live entry for `info_hash`.
    pub fn refresh(&self, info_hash: &InfoHash) -> bool {
        let mut table = self.inner.table.lock();
        match table.get_mut(info_hash) {
            Some(Slot::Live(entry)) => {
                self.arm_timer(*info_hash, entry);
                debug!("Refreshed {}; expires in {:?}", info_hash, self.inner.ttl);
                true
            }
            _ => false,
        }
    }

    /// Removes the entry and terminates its engine session.
    ///
    /// Returns false if there is no live entry for `info_hash`. In-flight
    /// joins are left alone.
    pub fn evict(&self, info_hash: &InfoHash) -> bool {
        let removed = {
            let mut table = self.inner.table.lock();
            let live = matches!(table.get(info_hash), Some(Slot::Live(_)));
            if live { table.remove(info_hash) } else { None }
        };

        match removed {
            Some(Slot::Live(entry)) => {
                info!("Evicting session {} for {}", entry.session.id(), info_hash);
                self.release(entry);
                true
            }
            _ => false,
        }
    }

    /// True if a live entry exists for `info_hash`.
    pub fn contains(&self, info_hash: &InfoHash) -> bool {
        matches!(
            self.inner.table.lock().get(info_hash),
            Some(Slot::Live(_))
        )
    }

    /// The live session for `info_hash`, without refreshing it.
    pub fn get(&self, info_hash: &InfoHash) -> Option<Arc<Session>> {
        match self.inner.table.lock().get(info_hash) {
            Some(Slot::Live(entry)) => Some(Arc::clone(&entry.session)),
            _ => None,
        }
    }

    /// Time left before the entry for `info_hash` expires.
    pub fn expires_in(&self, info_hash: &InfoHash) -> Option<Duration> {
        match self.inner.table.lock().get(info_hash) {
            Some(Slot::Live(entry)) => Some(entry.deadline.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// Number of live entries. In-flight joins are not counted.
    pub fn len(&self) -> usize {
        self.inner
            .table
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// True if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every live entry and waits for the engine sessions to close.
    pub async fn shutdown(&self) {
        let entries: Vec<CacheEntry> = {
            let mut table = self.inner.table.lock();
            let live: Vec<InfoHash> = table
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
                .map(|(info_hash, _)| *info_hash)
                .collect();
            live.iter()
                .filter_map(|info_hash| match table.remove(info_hash) {
                    Some(Slot::Live(entry)) => Some(entry),
                    _ => None,
                })
                .collect()
        };

        info!("Shutting down {} cached sessions", entries.len());
        for entry in entries {
            entry.cancel_tasks();
            entry.session.destroy().await;
        }
    }

    fn next_counter(&self) -> u64 {
        self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Spawns the join so it completes even if every waiter disconnects.
    fn spawn_join(&self, token: u64, magnet: MagnetLink) -> JoinFuture {
        let cache = self.clone();
        let info_hash = magnet.info_hash;
        let task = self
            .inner
            .runtime
            .spawn(async move { cache.run_join(token, magnet).await });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(CacheError::SessionCreate {
                    info_hash,
                    source: SwarmError::JoinFailed {
                        info_hash,
                        reason: format!("join task aborted: {e}"),
                    },
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_join(&self, token: u64, magnet: MagnetLink) -> Result<Arc<Session>, CacheError> {
        let info_hash = magnet.info_hash;
        info!("Joining swarm {}", info_hash);

        let joined = self.inner.engine.join(&magnet).await;

        let mut table = self.inner.table.lock();
        let still_joining = matches!(
            table.get(&info_hash),
            Some(Slot::Joining { token: current, .. }) if *current == token
        );

        match joined {
            Ok(handle) => {
                let session = Session::start(handle, &magnet);
                if still_joining {
                    let entry = self.new_entry(info_hash, Arc::clone(&session));
                    table.insert(info_hash, Slot::Live(entry));
                    info!("Cached session {} for {}", session.id(), info_hash);
                }
                Ok(session)
            }
            Err(source) => {
                if still_joining {
                    table.remove(&info_hash);
                }
                warn!("Join failed for {}: {}", info_hash, source);
                Err(CacheError::SessionCreate { info_hash, source })
            }
        }
    }

    fn new_entry(&self, info_hash: InfoHash, session: Arc<Session>) -> CacheEntry {
        let epoch = self.next_counter();
        let deadline = Instant::now() + self.inner.ttl;

        CacheEntry {
            watcher: self.spawn_fatal_watcher(info_hash, &session),
            timer: self.spawn_timer(info_hash, epoch, deadline),
            session,
            deadline,
            epoch,
        }
    }

    /// Cancels the armed timer and arms a new one. Caller holds the table lock.
    fn arm_timer(&self, info_hash: InfoHash, entry: &mut CacheEntry) {
        entry.timer.abort();
        entry.epoch = self.next_counter();
        entry.deadline = Instant::now() + self.inner.ttl;
        entry.timer = self.spawn_timer(info_hash, entry.epoch, entry.deadline);
    }

    fn spawn_timer(&self, info_hash: InfoHash, epoch: u64, deadline: Instant) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                SessionCache { inner }.expire(info_hash, epoch);
            }
        })
    }

    fn spawn_fatal_watcher(&self, info_hash: InfoHash, session: &Arc<Session>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let session_id = session.id();
        let mut fatal = session.fatal_signal();

        self.inner.runtime.spawn(async move {
            let error = next_fatal(&mut fatal).await;
            if let Some(inner) = weak.upgrade() {
                SessionCache { inner }.evict_failed(info_hash, session_id, &error);
            }
        })
    }

    /// Timer callback; only evicts if no refresh happened since arming.
    ///
    /// A leased session is still in use, so its timer is re-armed instead.
    fn expire(&self, info_hash: InfoHash, epoch: u64) {
        let removed = {
            let mut table = self.inner.table.lock();
            let leases = match table.get(&info_hash) {
                Some(Slot::Live(entry)) if entry.epoch == epoch => entry.session.active_leases(),
                _ => return,
            };

            if leases > 0 {
                if let Some(Slot::Live(entry)) = table.get_mut(&info_hash) {
                    self.arm_timer(info_hash, entry);
                    debug!(
                        "Session {} for {} has {} active requests; timer re-armed",
                        entry.session.id(),
                        info_hash,
                        leases
                    );
                }
                None
            } else {
                table.remove(&info_hash)
            }
        };

        if let Some(Slot::Live(entry)) = removed {
            info!(
                "Session {} for {} idle for {:?}; evicting",
                entry.session.id(),
                info_hash,
                self.inner.ttl
            );
            self.release(entry);
        }
    }

    fn evict_failed(&self, info_hash: InfoHash, session_id: Uuid, error: &SwarmError) {
        let removed = {
            let mut table = self.inner.table.lock();
            let current = matches!(
                table.get(&info_hash),
                Some(Slot::Live(entry)) if entry.session.id() == session_id
            );
            if current { table.remove(&info_hash) } else { None }
        };

        if let Some(Slot::Live(entry)) = removed {
            warn!(
                "Evicting failed session {} for {}: {}",
                session_id, info_hash, error
            );
            self.release(entry);
        }
    }

    fn release(&self, entry: CacheEntry) {
        entry.cancel_tasks();
        let session = entry.session;
        self.inner.runtime.spawn(async move {
            session.destroy().await;
        });
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("ttl", &self.inner.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::swarm::{SimulatedContent, SimulatedSwarm};

    const TTL: Duration = Duration::from_secs(600);

    fn magnet(byte: u8) -> MagnetLink {
        let info_hash = InfoHash::new([byte; 20]);
        MagnetLink::parse(&format!("magnet:?xt=urn:btih:{info_hash}&dn=test")).unwrap()
    }

    fn swarm_with(magnet: &MagnetLink) -> SimulatedSwarm {
        let swarm = SimulatedSwarm::new();
        swarm.add_content(
            magnet.info_hash,
            SimulatedContent::new().with_patterned_file("movie.mp4", 1024),
        );
        swarm
    }

    #[tokio::test]
    async fn test_acquire_inserts_entry() {
        let magnet = magnet(1);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        let session = cache.acquire(&magnet).await.unwrap();
        assert_eq!(session.info_hash(), magnet.info_hash);
        assert_eq!(session.display_name(), Some("test"));
        assert!(cache.contains(&magnet.info_hash));
        assert_eq!(cache.len(), 1);
        assert_eq!(swarm.join_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_existing_entry_skips_engine() {
        let magnet = magnet(2);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        let first = cache.acquire(&magnet).await.unwrap();
        let second = cache.acquire(&magnet).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(swarm.join_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_join_inserts_nothing() {
        let magnet = magnet(3);
        let swarm = swarm_with(&magnet);
        swarm.fail_joins_for(magnet.info_hash);
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        let result = cache.acquire(&magnet).await;
        assert!(matches!(result, Err(CacheError::SessionCreate { .. })));
        assert!(!cache.contains(&magnet.info_hash));
        assert!(cache.is_empty());
        assert!(!cache.refresh(&magnet.info_hash));

        swarm.allow_joins_for(magnet.info_hash);
        assert!(cache.acquire(&magnet).await.is_ok());
        assert_eq!(swarm.join_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_and_evict_missing_entry_are_noops() {
        let swarm = SimulatedSwarm::new();
        let cache = SessionCache::new(Arc::new(swarm), TTL);
        let info_hash = InfoHash::new([9; 20]);

        assert!(!cache.refresh(&info_hash));
        assert!(!cache.evict(&info_hash));
        assert!(cache.expires_in(&info_hash).is_none());
    }

    #[tokio::test]
    async fn test_evict_destroys_session() {
        let magnet = magnet(4);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        let session = cache.acquire(&magnet).await.unwrap();
        assert!(cache.evict(&magnet.info_hash));
        assert!(!cache.contains(&magnet.info_hash));

        for _ in 0..100 {
            if session.is_destroyed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(session.is_destroyed());
        assert_eq!(swarm.destroy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let magnet = magnet(5);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), Duration::from_secs(60));

        cache.acquire(&magnet).await.unwrap();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(cache.contains(&magnet.info_hash));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!cache.contains(&magnet.info_hash));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_slides_deadline() {
        let magnet = magnet(6);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), Duration::from_secs(60));

        cache.acquire(&magnet).await.unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(cache.refresh(&magnet.info_hash));
        assert_eq!(
            cache.expires_in(&magnet.info_hash),
            Some(Duration::from_secs(60))
        );

        // Past the original deadline, inside the refreshed one.
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(cache.contains(&magnet.info_hash));

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(!cache.contains(&magnet.info_hash));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_session_outlives_ttl() {
        let magnet = magnet(10);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), Duration::from_secs(60));

        let session = cache.acquire(&magnet).await.unwrap();
        let lease = session.lease();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.contains(&magnet.info_hash));
        assert_eq!(swarm.destroy_count(), 0);

        drop(lease);
        assert_eq!(session.active_leases(), 0);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!cache.contains(&magnet.info_hash));
    }

    #[tokio::test]
    async fn test_fatal_error_evicts_entry() {
        let magnet = magnet(7);
        let swarm = swarm_with(&magnet);
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        let first = cache.acquire(&magnet).await.unwrap();
        first.wait_ready().await.unwrap();
        swarm.trigger_fatal(magnet.info_hash, "disk full");

        for _ in 0..100 {
            if !cache.contains(&magnet.info_hash) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!cache.contains(&magnet.info_hash));
        assert!(first.fatal_error().is_some());

        let second = cache.acquire(&magnet).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert!(second.fatal_error().is_none());
        assert_eq!(swarm.join_count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_destroys_everything() {
        let first = magnet(8);
        let second = magnet(9);
        let swarm = swarm_with(&first);
        swarm.add_content(second.info_hash, SimulatedContent::new());
        let cache = SessionCache::new(Arc::new(swarm.clone()), TTL);

        cache.acquire(&first).await.unwrap();
        cache.acquire(&second).await.unwrap();
        cache.shutdown().await;

        assert!(cache.is_empty());
        assert_eq!(swarm.destroy_count(), 2);
    }
}
