//! Ingestion service.
//!
//! The explicit service object tying the components together: constructed
//! once from configuration, it owns the cache store, the fetch worker pool
//! and the background sweeper, and is passed by reference to callers. No
//! ambient globals.

use crate::cache::{self, CacheStore};
use crate::concat::{ConcatenationEngine, RunStatistics, TreeNode};
use crate::config::RepocatConfig;
use crate::error::Error;
use crate::fetch::{self, Fetcher, GitRetriever, RetrieveOptions, Retriever};
use crate::patterns::PatternSet;
use crate::source::SourceRef;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Result of a full ingest run.
#[derive(Debug)]
pub struct IngestOutcome {
    pub source: SourceRef,
    pub artifact_path: PathBuf,
    pub statistics: RunStatistics,
    pub tree: TreeNode,
    pub from_cache: bool,
}

/// Result of a lightweight pre-check.
#[derive(Debug)]
pub struct SourceSummary {
    pub source: SourceRef,
    pub file_count: usize,
    pub size_kb: f64,
}

/// Service object for repository ingestion.
pub struct Ingestor {
    config: RepocatConfig,
    retriever: Arc<dyn Retriever>,
    fetcher: Fetcher,
    sweeper: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl Ingestor {
    pub fn new(config: RepocatConfig) -> Result<Self, Error> {
        Self::with_retriever(config, Arc::new(GitRetriever))
    }

    /// Construct with a custom retriever (used by tests).
    pub fn with_retriever(
        config: RepocatConfig,
        retriever: Arc<dyn Retriever>,
    ) -> Result<Self, Error> {
        let store = Arc::new(CacheStore::new(config.cache.resolve_dir(), config.cache.ttl())?);
        let shutdown = Arc::new(Notify::new());
        let sweeper = cache::spawn_sweeper(
            Arc::clone(&store),
            config.cache.sweep_interval(),
            Arc::clone(&shutdown),
        );
        let fetcher = Fetcher::new(
            Arc::clone(&store),
            Arc::clone(&retriever),
            config.fetch.workers,
            config.fetch.timeout(),
        );
        Ok(Self {
            config,
            retriever,
            fetcher,
            sweeper: Some(sweeper),
            shutdown,
        })
    }

    /// Fetch the source (cache-first) and concatenate it into an artifact.
    ///
    /// The concatenation run executes off the async executor; concurrent
    /// ingests share no mutable state and write independent artifacts.
    pub async fn ingest(
        &self,
        url: &str,
        credential: Option<&str>,
        caller_patterns: &[String],
    ) -> Result<IngestOutcome, Error> {
        let source = SourceRef::parse(url)?;
        let acquired = self.fetcher.acquire(&source, credential).await?;

        let label = match &source.subdirectory {
            Some(subdir) => format!("{}_{}", source.name, subdir),
            None => source.name.clone(),
        };
        let content_root = acquired.content_root();
        let output_dir = self.config.output.dir.clone();
        let patterns = caller_patterns.to_vec();

        let report = tokio::task::spawn_blocking(move || {
            ConcatenationEngine::new(&content_root, &patterns, &output_dir)
                .map(|engine| engine.with_label(&label))
                .and_then(|engine| engine.run())
        })
        .await
        .map_err(|e| Error::Concatenation {
            reason: format!("run task failed: {}", e),
        })??;

        Ok(IngestOutcome {
            source,
            artifact_path: report.artifact_path,
            statistics: report.statistics,
            tree: report.tree,
            from_cache: acquired.from_cache,
        })
    }

    /// Quick existence/size check: a shallow clone into a scratch directory
    /// and a filtered count of files and bytes. The scratch directory is
    /// removed regardless of outcome.
    pub async fn pre_check(
        &self,
        url: &str,
        credential: Option<&str>,
    ) -> Result<SourceSummary, Error> {
        let source = SourceRef::parse(url)?;
        info!(source = %source.display_name(), "pre-checking repository");

        let temp = tempfile::Builder::new()
            .prefix("repocat_precheck_")
            .tempdir()
            .map_err(|e| Error::fs("creating pre-check directory", e))?;
        let clone_root = temp.path().join("tree");

        let options = RetrieveOptions {
            shallow: true,
            branch: None,
        };
        self.retriever
            .retrieve(
                &source.fetch_url_with_credential(credential),
                &clone_root,
                &options,
            )
            .await
            .map_err(|e| fetch::redact_credential(e, credential))?;

        let subdirectory = source.subdirectory.clone();
        let (file_count, total_bytes) = tokio::task::spawn_blocking(move || {
            summarize_tree(&clone_root, subdirectory.as_deref())
        })
        .await
        .map_err(|e| Error::Concatenation {
            reason: format!("pre-check task failed: {}", e),
        })??;

        Ok(SourceSummary {
            source,
            file_count,
            size_kb: total_bytes as f64 / 1024.0,
        })
    }

    /// Stop the background sweeper and the fetch workers.
    pub async fn shutdown(&mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.await;
        }
        self.fetcher.shutdown().await;
    }
}

/// Count non-ignored files and bytes under a freshly cloned tree, applying
/// the system defaults plus the tree's own `.gitignore`.
fn summarize_tree(clone_root: &Path, subdirectory: Option<&str>) -> Result<(usize, u64), Error> {
    let target = match subdirectory {
        Some(subdir) => {
            let target = clone_root.join(subdir);
            if !target.is_dir() {
                return Err(Error::SubdirectoryMissing {
                    subdir: subdir.to_string(),
                });
            }
            target
        }
        None => clone_root.to_path_buf(),
    };

    let source_patterns = fs::read_to_string(clone_root.join(".gitignore"))
        .map(|contents| contents.lines().map(String::from).collect())
        .unwrap_or_default();
    let matcher = PatternSet::with_defaults(source_patterns, Vec::new()).matcher();

    let mut file_count = 0usize;
    let mut total_bytes = 0u64;
    let walker = WalkDir::new(&target)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry
                .path()
                .strip_prefix(clone_root)
                .unwrap_or_else(|_| entry.path())
                .to_string_lossy()
                .into_owned();
            relative.is_empty() || !matcher.is_ignored(&relative)
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "pre-check walk error");
                continue;
            }
        };
        if entry.file_type().is_file() {
            if let Ok(metadata) = entry.metadata() {
                file_count += 1;
                total_bytes += metadata.len();
            }
        }
    }
    Ok((file_count, total_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_summarize_tree_applies_patterns() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();
        fs::write(root.join("a.txt"), "12345").unwrap();
        fs::write(root.join("b.log"), "ignored").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "ignored").unwrap();

        let (count, bytes) = summarize_tree(root, None).unwrap();
        // a.txt and .gitignore itself are the only survivors.
        assert_eq!(count, 2);
        assert_eq!(bytes, 5 + 6);
    }

    #[test]
    fn test_summarize_tree_missing_subdirectory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();

        let err = summarize_tree(temp.path(), Some("docs")).unwrap_err();
        assert!(matches!(err, Error::SubdirectoryMissing { .. }));
    }
}
