//! Source tree acquisition.
//!
//! Cache-first fetches with a bounded worker pool: retrieval requests are
//! queued on an mpsc channel and consumed by worker tasks, each request
//! carrying a oneshot completion channel, so a potentially multi-second
//! clone never blocks the caller's executor. A per-key lease guarantees
//! that N simultaneous requests for the same uncached source result in
//! exactly one retrieval.

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::error::Error;
use crate::source::SourceRef;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Options for a single retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Shallow (depth 1) clone.
    pub shallow: bool,
    /// Restrict to a single branch.
    pub branch: Option<String>,
}

/// Seam for the actual remote retrieval, mockable in tests.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Populate `dest` with the tree behind `fetch_url`. `dest` is either
    /// absent or an empty directory when called.
    async fn retrieve(
        &self,
        fetch_url: &str,
        dest: &Path,
        options: &RetrieveOptions,
    ) -> Result<(), Error>;
}

/// Production retriever shelling out to the system `git` binary.
///
/// Using the system git means SSH keys, credential helpers and proxy
/// settings from the user's environment all apply.
#[derive(Debug, Default)]
pub struct GitRetriever;

#[async_trait]
impl Retriever for GitRetriever {
    async fn retrieve(
        &self,
        fetch_url: &str,
        dest: &Path,
        options: &RetrieveOptions,
    ) -> Result<(), Error> {
        let fetch_url = fetch_url.to_string();
        let dest = dest.to_path_buf();
        let options = options.clone();
        tokio::task::spawn_blocking(move || run_git_clone(&fetch_url, &dest, &options))
            .await
            .map_err(|e| Error::FetchFailed {
                reason: format!("clone task failed: {}", e),
            })?
    }
}

fn run_git_clone(fetch_url: &str, dest: &Path, options: &RetrieveOptions) -> Result<(), Error> {
    let mut command = Command::new("git");
    command.arg("clone");
    if options.shallow {
        command.arg("--depth=1");
    }
    if let Some(branch) = &options.branch {
        command.args(["--branch", branch]);
    }
    command.arg(fetch_url).arg(dest);

    let output = command.output().map_err(|e| Error::FetchFailed {
        reason: format!("failed to launch git: {}", e),
    })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_git_failure(&stderr, &strip_userinfo(fetch_url)))
}

/// Map a git failure onto the error taxonomy so callers can distinguish
/// retry-able conditions from user-facing ones.
fn classify_git_failure(stderr: &str, source_url: &str) -> Error {
    let lower = stderr.to_lowercase();
    if lower.contains("repository not found") || lower.contains("not found") {
        Error::SourceNotFound {
            source_url: source_url.to_string(),
        }
    } else if lower.contains("authentication")
        || lower.contains("authorization")
        || lower.contains("permission denied")
        || lower.contains("could not read from remote repository")
    {
        Error::AuthenticationRequired
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        Error::RateLimited
    } else {
        Error::FetchFailed {
            reason: stderr.trim().to_string(),
        }
    }
}

/// Remove any userinfo (embedded credential) from a URL for messages.
fn strip_userinfo(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        if let Some(at) = rest.find('@') {
            return format!("{}{}", &url[..scheme_end + 3], &rest[at + 1..]);
        }
    }
    url.to_string()
}

/// Scrub a credential out of an error message before it propagates.
pub(crate) fn redact_credential(err: Error, credential: Option<&str>) -> Error {
    let Some(token) = credential.filter(|t| !t.is_empty()) else {
        return err;
    };
    match err {
        Error::FetchFailed { reason } => Error::FetchFailed {
            reason: reason.replace(token, "***"),
        },
        other => other,
    }
}

/// Result of acquiring a source tree.
#[derive(Debug, Clone)]
pub struct AcquiredTree {
    /// Root of the fetched tree (the cache entry path).
    pub path: PathBuf,
    /// Requested subdirectory, verified to exist under `path`.
    pub subdirectory: Option<String>,
    pub from_cache: bool,
}

impl AcquiredTree {
    /// Directory a run should process: the subdirectory when one was
    /// requested, the tree root otherwise.
    pub fn content_root(&self) -> PathBuf {
        match &self.subdirectory {
            Some(subdir) => self.path.join(subdir),
            None => self.path.clone(),
        }
    }
}

struct FetchRequest {
    fetch_url: String,
    dest: PathBuf,
    options: RetrieveOptions,
    completion_tx: oneshot::Sender<Result<(), Error>>,
}

/// Cache-first source acquisition over a bounded worker pool.
pub struct Fetcher {
    store: Arc<CacheStore>,
    tx: Option<mpsc::Sender<FetchRequest>>,
    workers: Vec<JoinHandle<()>>,
    timeout: Duration,
    leases: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

impl Fetcher {
    pub fn new(
        store: Arc<CacheStore>,
        retriever: Arc<dyn Retriever>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<FetchRequest>(32);
        let rx = Arc::new(AsyncMutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let retriever = Arc::clone(&retriever);
                tokio::spawn(async move {
                    loop {
                        let request = { rx.lock().await.recv().await };
                        let Some(request) = request else {
                            debug!(worker, "fetch worker stopping");
                            break;
                        };
                        let result = retriever
                            .retrieve(&request.fetch_url, &request.dest, &request.options)
                            .await;
                        if request.completion_tx.send(result).is_err() {
                            debug!(worker, "fetch completion receiver dropped");
                        }
                    }
                })
            })
            .collect();

        Self {
            store,
            tx: Some(tx),
            workers: handles,
            timeout,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a local directory for the source: a cache hit, or a fresh
    /// retrieval performed off the caller's executor.
    pub async fn acquire(
        &self,
        source: &SourceRef,
        credential: Option<&str>,
    ) -> Result<AcquiredTree, Error> {
        let key = CacheKey::new(&source.base_url, credential);

        if let Some(entry) = self.lookup_usable(&key)? {
            return self.from_entry(source, entry);
        }

        // Per-key lease: later waiters block here, re-check the cache and
        // hit the entry the first requester populated.
        let lease = self.lease(&key);
        let guard = lease.lock().await;

        let result = match self.lookup_usable(&key)? {
            Some(entry) => self.from_entry(source, entry),
            None => self.populate(source, credential, &key).await,
        };

        drop(guard);
        drop(lease);
        self.prune_leases();
        result
    }

    fn from_entry(&self, source: &SourceRef, entry: CacheEntry) -> Result<AcquiredTree, Error> {
        verify_subdirectory(&entry.path, source.subdirectory.as_deref())?;
        info!(source = %source.display_name(), "using cached repository");
        Ok(AcquiredTree {
            path: entry.path,
            subdirectory: source.subdirectory.clone(),
            from_cache: true,
        })
    }

    async fn populate(
        &self,
        source: &SourceRef,
        credential: Option<&str>,
        key: &CacheKey,
    ) -> Result<AcquiredTree, Error> {
        let dest = self.store.reserve(key)?;
        info!(source = %source.display_name(), "cloning repository into cache");

        let outcome = self
            .dispatch(source.fetch_url_with_credential(credential), dest.clone())
            .await;

        match outcome {
            Ok(()) => match verify_subdirectory(&dest, source.subdirectory.as_deref()) {
                Ok(()) => Ok(AcquiredTree {
                    path: dest,
                    subdirectory: source.subdirectory.clone(),
                    from_cache: false,
                }),
                Err(err) => {
                    self.store.discard(key);
                    Err(err)
                }
            },
            Err(err) => {
                // No half-populated entry survives a failed fetch.
                self.store.discard(key);
                Err(redact_credential(err, credential))
            }
        }
    }

    async fn dispatch(&self, fetch_url: String, dest: PathBuf) -> Result<(), Error> {
        let sender = self.tx.as_ref().ok_or_else(|| Error::FetchFailed {
            reason: "fetcher is shut down".to_string(),
        })?;
        let (completion_tx, completion_rx) = oneshot::channel();
        sender
            .send(FetchRequest {
                fetch_url,
                dest,
                options: RetrieveOptions::default(),
                completion_tx,
            })
            .await
            .map_err(|_| Error::FetchFailed {
                reason: "fetch workers unavailable".to_string(),
            })?;

        match tokio::time::timeout(self.timeout, completion_rx).await {
            Err(_) => Err(Error::FetchFailed {
                reason: format!("retrieval timed out after {}s", self.timeout.as_secs()),
            }),
            Ok(Err(_)) => Err(Error::FetchFailed {
                reason: "fetch worker dropped the request".to_string(),
            }),
            Ok(Ok(result)) => result,
        }
    }

    fn lookup_usable(&self, key: &CacheKey) -> Result<Option<CacheEntry>, Error> {
        match self.store.lookup(key) {
            Ok(entry) => Ok(entry),
            Err(Error::CacheIntegrity { reason }) => {
                warn!(%reason, "cache integrity failure; falling back to fresh fetch");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn lease(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        let mut leases = self.leases.lock();
        Arc::clone(leases.entry(key.clone()).or_default())
    }

    fn prune_leases(&self) {
        self.leases.lock().retain(|_, lease| Arc::strong_count(lease) > 1);
    }

    /// Stop accepting requests and wait for in-flight workers to finish.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
    }
}

/// A requested subdirectory must exist and be non-empty post-fetch.
fn verify_subdirectory(entry_path: &Path, subdirectory: Option<&str>) -> Result<(), Error> {
    let Some(subdir) = subdirectory else {
        return Ok(());
    };
    let path = entry_path.join(subdir);
    let populated = path.is_dir()
        && fs::read_dir(&path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
    if populated {
        Ok(())
    } else {
        Err(Error::SubdirectoryMissing {
            subdir: subdir.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify_git_failure(
            "fatal: repository 'https://github.com/a/b.git/' not found",
            "https://github.com/a/b.git",
        );
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_classify_authentication() {
        let err = classify_git_failure(
            "fatal: Authentication failed for 'https://github.com/a/b.git/'",
            "https://github.com/a/b.git",
        );
        assert!(matches!(err, Error::AuthenticationRequired));
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_git_failure(
            "error: rate limit exceeded, try again later",
            "https://github.com/a/b.git",
        );
        assert!(matches!(err, Error::RateLimited));
    }

    #[test]
    fn test_classify_generic_transport() {
        let err = classify_git_failure(
            "fatal: unable to access: connection reset",
            "https://github.com/a/b.git",
        );
        assert!(matches!(err, Error::FetchFailed { .. }));
    }

    #[test]
    fn test_strip_userinfo() {
        assert_eq!(
            strip_userinfo("https://token@github.com/a/b.git"),
            "https://github.com/a/b.git"
        );
        assert_eq!(
            strip_userinfo("https://github.com/a/b.git"),
            "https://github.com/a/b.git"
        );
    }

    #[test]
    fn test_redact_credential() {
        let err = Error::FetchFailed {
            reason: "clone of https://tok123@host failed".to_string(),
        };
        match redact_credential(err, Some("tok123")) {
            Error::FetchFailed { reason } => assert!(!reason.contains("tok123")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
