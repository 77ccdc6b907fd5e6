//! Deterministic walk-and-concatenate engine.
//!
//! Walks a local directory depth-first, pruning ignored directories before
//! descent (their children are never visited and never counted), then
//! writes every non-ignored file into a single artifact in lexicographic
//! relative-path order. Repeated runs over unchanged input produce
//! byte-identical artifact content; only the artifact filename embeds the
//! timestamp and run identifier.

pub mod stats;
pub mod tree;

pub use stats::RunStatistics;
pub use tree::{NodeKind, TreeNode};

use crate::error::Error;
use crate::patterns::{Matcher, PatternSet};
use chrono::Local;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one concatenation run.
#[derive(Debug)]
pub struct RunReport {
    pub artifact_path: PathBuf,
    pub statistics: RunStatistics,
    pub tree: TreeNode,
}

/// One-shot engine over a local directory.
pub struct ConcatenationEngine {
    root: PathBuf,
    output_dir: PathBuf,
    label: String,
    patterns: PatternSet,
}

impl ConcatenationEngine {
    /// Create an engine for `root`, loading source-tree ignore rules from a
    /// root-level `.gitignore` when present and merging them with the
    /// system defaults and the caller's patterns.
    pub fn new(root: &Path, caller_patterns: &[String], output_dir: &Path) -> Result<Self, Error> {
        let root = root.canonicalize().map_err(|e| Error::Concatenation {
            reason: format!("directory does not exist: {} ({})", root.display(), e),
        })?;

        let source_patterns = match fs::read_to_string(root.join(".gitignore")) {
            Ok(contents) => contents.lines().map(|l| l.to_string()).collect(),
            Err(_) => Vec::new(),
        };
        debug!(
            root = %root.display(),
            source_patterns = source_patterns.len(),
            caller_patterns = caller_patterns.len(),
            "initializing concatenation engine"
        );
        let patterns = PatternSet::with_defaults(source_patterns, caller_patterns.to_vec());

        fs::create_dir_all(output_dir).map_err(|e| {
            Error::fs(format!("creating output directory {}", output_dir.display()), e)
        })?;

        let label = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repository".to_string());

        Ok(Self {
            root,
            output_dir: output_dir.to_path_buf(),
            label,
            patterns,
        })
    }

    /// Override the artifact label (by default the root directory name).
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Walk, filter and concatenate; returns the artifact path, the run
    /// statistics and the filtered tree.
    pub fn run(&self) -> Result<RunReport, Error> {
        let matcher = self.patterns.matcher();
        let mut statistics = RunStatistics::default();

        let files = self.collect_files(&matcher, &mut statistics)?;
        statistics.file_stats.total_files = files.len();

        // The tree pass shares the matcher, so it reflects exactly the same
        // ignore decisions as the walk above.
        let tree = tree::build_tree(&self.root, &matcher)?;

        let artifact_path = self.output_dir.join(unique_artifact_name(&self.label));
        if let Err(err) = self.write_artifact(&artifact_path, &files, &mut statistics) {
            // No partial artifact survives a failed run.
            let _ = fs::remove_file(&artifact_path);
            return Err(err);
        }

        info!(
            artifact = %artifact_path.display(),
            processed = statistics.file_stats.processed_files,
            skipped = statistics.file_stats.skipped_files,
            "concatenation complete"
        );
        Ok(RunReport {
            artifact_path,
            statistics,
            tree,
        })
    }

    /// Collect the files to process in lexicographic relative-path order,
    /// accumulating directory and filter statistics along the way.
    fn collect_files(
        &self,
        matcher: &Matcher,
        statistics: &mut RunStatistics,
    ) -> Result<Vec<(PathBuf, String)>, Error> {
        let mut files = Vec::new();
        self.walk_into(&self.root, 0, matcher, statistics, &mut files)?;
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    fn walk_into(
        &self,
        dir: &Path,
        depth: usize,
        matcher: &Matcher,
        statistics: &mut RunStatistics,
        files: &mut Vec<(PathBuf, String)>,
    ) -> Result<(), Error> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if depth == 0 => {
                return Err(Error::Concatenation {
                    reason: format!("cannot access directory {}: {}", dir.display(), e),
                })
            }
            Err(error) => {
                warn!(path = %dir.display(), %error, "skipping unreadable directory");
                return Ok(());
            }
        };

        let mut entries: Vec<fs::DirEntry> = entries.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|entry| entry.file_name());

        let file_count = entries
            .iter()
            .filter(|entry| {
                entry
                    .file_type()
                    .map(|kind| !kind.is_dir())
                    .unwrap_or(false)
            })
            .count();
        let dir_display = if depth == 0 {
            ".".to_string()
        } else {
            self.relative(dir)
        };
        statistics.record_dir(&dir_display, depth, file_count);

        for entry in entries {
            let path = entry.path();
            let relative = self.relative(&path);
            let is_dir = entry
                .file_type()
                .map(|kind| kind.is_dir())
                .unwrap_or(false);

            if matcher.is_ignored(&relative) {
                // Pruned before descent: children of an ignored directory
                // are never visited and never counted.
                statistics.record_filtered(&matcher.explain(&relative));
                continue;
            }

            if is_dir {
                self.walk_into(&path, depth + 1, matcher, statistics, files)?;
            } else {
                files.push((path, relative));
            }
        }
        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Write the artifact incrementally; per-file read and decode failures
    /// are counted as skipped and never abort the run.
    fn write_artifact(
        &self,
        artifact_path: &Path,
        files: &[(PathBuf, String)],
        statistics: &mut RunStatistics,
    ) -> Result<(), Error> {
        let write_err = |e: std::io::Error| Error::fs("writing artifact", e);

        let file = fs::File::create(artifact_path)
            .map_err(|e| Error::fs(format!("creating artifact {}", artifact_path.display()), e))?;
        let mut out = BufWriter::new(file);

        let root_line = self.root.display().to_string();
        writeln!(out, "Repository: {}", root_line).map_err(write_err)?;
        writeln!(out, "{}", "=".repeat(root_line.len() + 12)).map_err(write_err)?;
        writeln!(out).map_err(write_err)?;

        for (path, relative) in files {
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(file = %relative, %error, "skipping unreadable file");
                    statistics.record_skipped();
                    continue;
                }
            };
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) => {
                    warn!(file = %relative, "skipping binary file");
                    statistics.record_skipped();
                    continue;
                }
            };

            writeln!(out, "\nFile: {}", relative).map_err(write_err)?;
            writeln!(out, "{}", "-".repeat(relative.len() + 6)).map_err(write_err)?;
            writeln!(out).map_err(write_err)?;
            out.write_all(content.as_bytes()).map_err(write_err)?;
            writeln!(out).map_err(write_err)?;

            statistics.record_file(relative, content.len() as u64, &content);
        }

        out.flush().map_err(write_err)
    }
}

/// Filesystem-safe artifact label.
pub(crate) fn clean_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Artifact filename unique per run even under concurrent runs: source
/// label, sub-second timestamp, process id and a random component.
fn unique_artifact_name(label: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let run_id = Uuid::new_v4().simple().to_string();
    format!(
        "output_{}_{}_pid{}_{}.txt",
        clean_name(label),
        timestamp,
        std::process::id(),
        &run_id[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("widgets"), "widgets");
        assert_eq!(clean_name("docs/api v2"), "docs_api_v2");
        assert_eq!(clean_name("a-b_c"), "a-b_c");
    }

    #[test]
    fn test_unique_artifact_names_differ() {
        let first = unique_artifact_name("repo");
        let second = unique_artifact_name("repo");
        assert_ne!(first, second);
        assert!(first.starts_with("output_repo_"));
        assert!(first.ends_with(".txt"));
        assert!(first.contains(&format!("pid{}", std::process::id())));
    }
}
