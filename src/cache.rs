//! Disk cache for fetched source trees.
//!
//! Each entry is a directory under the cache root, named by a digest of the
//! source identity. The filesystem is the only index: an entry is valid
//! exactly when its directory exists, its `.git` marker is present, and its
//! creation time (the marker's mtime, never touched after the clone) is
//! within the TTL. The entry directory's own mtime records the last access
//! and is what the background sweep compares against, so reads extend
//! eviction eligibility without extending the TTL itself.

use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Structural marker confirming an entry was fully populated.
pub const INTEGRITY_MARKER: &str = ".git";

/// Fixed-length digest identifying a cached source tree.
///
/// Derived from the base URL and the credential (or empty), so
/// authenticated and anonymous fetches of the same tree are distinct
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(base_url: &str, credential: Option<&str>) -> Self {
        let digest = blake3::hash(
            format!("{}:{}", base_url, credential.unwrap_or_default()).as_bytes(),
        );
        CacheKey(digest.to_hex()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

/// Store mapping cache keys to directories holding fetched trees.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    /// Create a store rooted at `root`, verifying the directory is writable.
    pub fn new(root: PathBuf, ttl: Duration) -> Result<Self, Error> {
        fs::create_dir_all(&root)
            .map_err(|e| Error::fs(format!("creating cache directory {}", root.display()), e))?;
        let probe = root.join(".write_test");
        fs::write(&probe, b"")
            .map_err(|e| Error::fs(format!("probing cache directory {}", root.display()), e))?;
        let _ = fs::remove_file(&probe);
        Ok(Self { root, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Look up an entry.
    ///
    /// Returns `Ok(None)` when no entry exists or the entry is TTL-expired
    /// (expired entries are not deleted here; removal happens in [`sweep`]
    /// or lazily in [`reserve`]). Returns `Error::CacheIntegrity` when a
    /// directory exists but its structural marker is missing, a distinct
    /// condition the caller recovers from with a fresh fetch.
    ///
    /// A valid hit touches the entry's last-access time.
    ///
    /// [`sweep`]: CacheStore::sweep
    /// [`reserve`]: CacheStore::reserve
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, Error> {
        let path = self.entry_path(key);
        if !path.is_dir() {
            return Ok(None);
        }

        let marker = path.join(INTEGRITY_MARKER);
        let created_at = match fs::metadata(&marker).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                return Err(Error::CacheIntegrity {
                    reason: format!(
                        "integrity marker missing for entry {}",
                        key.as_str()
                    ),
                })
            }
        };

        let expires_at = created_at + self.ttl;
        if SystemTime::now() >= expires_at {
            debug!(key = key.as_str(), "cache entry expired");
            return Ok(None);
        }

        touch(&path);
        Ok(Some(CacheEntry {
            key: key.clone(),
            path,
            created_at,
            expires_at,
        }))
    }

    /// Reserve an empty directory for the key, removing any stale leftover
    /// first. The caller populates it; until the integrity marker lands the
    /// directory is never reported as a valid entry.
    pub fn reserve(&self, key: &CacheKey) -> Result<PathBuf, Error> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| {
                Error::fs(format!("removing stale cache entry {}", key.as_str()), e)
            })?;
        }
        fs::create_dir_all(&path)
            .map_err(|e| Error::fs(format!("reserving cache entry {}", key.as_str()), e))?;
        Ok(path)
    }

    /// Remove a reserved or populated entry, e.g. after a failed fetch.
    pub fn discard(&self, key: &CacheKey) {
        let path = self.entry_path(key);
        if path.exists() {
            if let Err(error) = fs::remove_dir_all(&path) {
                warn!(key = key.as_str(), %error, "failed to remove cache entry");
            }
        }
    }

    /// Delete every entry whose last access is older than the TTL.
    ///
    /// Per-entry failures are logged and do not stop the sweep of other
    /// entries. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(%error, "failed to read cache root for sweep");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(%error, "failed to read cache entry during sweep");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let last_access = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to stat cache entry");
                    continue;
                }
            };
            let stale = SystemTime::now()
                .duration_since(last_access)
                .map(|elapsed| elapsed > self.ttl)
                .unwrap_or(false);
            if !stale {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "swept stale cache entry");
                    removed += 1;
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to sweep cache entry");
                }
            }
        }
        removed
    }
}

/// Record an access by touching the entry directory's mtime.
fn touch(path: &Path) {
    let result = fs::File::open(path).and_then(|dir| dir.set_modified(SystemTime::now()));
    if let Err(error) = result {
        debug!(path = %path.display(), %error, "failed to touch cache entry");
    }
}

/// Spawn the background sweep task.
///
/// Runs until `shutdown` is notified; each pass executes off the async
/// executor. Individual entry failures never terminate the task.
pub fn spawn_sweeper(
    store: Arc<CacheStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh store is not
        // swept at startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = Arc::clone(&store);
                    let removed = tokio::task::spawn_blocking(move || store.sweep())
                        .await
                        .unwrap_or(0);
                    if removed > 0 {
                        info!(removed, "cache sweep removed stale entries");
                    }
                }
                _ = shutdown.notified() => {
                    debug!("cache sweeper shutting down");
                    break;
                }
            }
        }
    })
}
