//! Run statistics accumulated during a concatenation walk.
//!
//! Counters are updated incrementally as the walk proceeds; derived fields
//! (averages, top patterns) are computed only at serialization time.

use crate::patterns::PatternTier;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

/// Markers that classify a line as a comment, across common languages.
const COMMENT_MARKERS: &[&str] = &["#", "//", "/*", "*", "<!--", "-->", "\"\"\"", "'''"];

/// Per-file statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub file_types: BTreeMap<String, usize>,
    pub largest_file: LargestFile,
    pub total_size: u64,
    pub total_lines: usize,
    pub empty_lines: usize,
    pub comment_lines: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LargestFile {
    pub path: Option<String>,
    pub size: u64,
}

impl FileStats {
    pub fn avg_lines_per_file(&self) -> f64 {
        if self.processed_files == 0 || self.total_lines == 0 {
            return 0.0;
        }
        let avg = self.total_lines as f64 / self.processed_files as f64;
        (avg * 100.0).round() / 100.0
    }
}

/// Per-directory statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirStats {
    pub total_dirs: usize,
    pub max_depth: usize,
    pub dirs_with_most_files: BusiestDir,
    pub empty_dirs: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusiestDir {
    pub path: Option<String>,
    pub count: usize,
}

/// Exclusion statistics, per tier and per pattern.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterStats {
    pub system_filtered: usize,
    pub source_filtered: usize,
    pub caller_filtered: usize,
    pub pattern_matches: BTreeMap<String, usize>,
}

impl FilterStats {
    /// Top patterns by number of paths filtered, ties broken by pattern
    /// text for determinism.
    pub fn most_effective_patterns(&self) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .pattern_matches
            .iter()
            .map(|(pattern, count)| (pattern.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(5);
        ranked
    }
}

/// Complete statistics for one concatenation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatistics {
    pub file_stats: FileStats,
    pub dir_stats: DirStats,
    pub filter_stats: FilterStats,
}

impl RunStatistics {
    /// Record a successfully processed file.
    pub fn record_file(&mut self, relative_path: &str, size: u64, content: &str) {
        let extension = Path::new(relative_path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "no extension".to_string());
        *self.file_stats.file_types.entry(extension).or_insert(0) += 1;

        self.file_stats.total_size += size;
        // Strict comparison: the first file seen wins ties.
        if size > self.file_stats.largest_file.size {
            self.file_stats.largest_file = LargestFile {
                path: Some(relative_path.to_string()),
                size,
            };
        }

        for line in content.lines() {
            self.file_stats.total_lines += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.file_stats.empty_lines += 1;
            } else if COMMENT_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
                self.file_stats.comment_lines += 1;
            }
        }

        self.file_stats.processed_files += 1;
    }

    /// Record a file skipped during processing (binary content or a read
    /// error).
    pub fn record_skipped(&mut self) {
        self.file_stats.skipped_files += 1;
    }

    /// Record a visited directory with its raw file count.
    pub fn record_dir(&mut self, relative_path: &str, depth: usize, file_count: usize) {
        self.dir_stats.total_dirs += 1;
        self.dir_stats.max_depth = self.dir_stats.max_depth.max(depth);
        if file_count > self.dir_stats.dirs_with_most_files.count {
            self.dir_stats.dirs_with_most_files = BusiestDir {
                path: Some(relative_path.to_string()),
                count: file_count,
            };
        }
        if file_count == 0 {
            self.dir_stats.empty_dirs += 1;
        }
    }

    /// Record an excluded path, attributed to the first matching tier and
    /// every matching pattern.
    pub fn record_filtered(&mut self, matches: &[(PatternTier, &str)]) {
        let Some((tier, _)) = matches.first() else {
            return;
        };
        match tier {
            PatternTier::System => self.filter_stats.system_filtered += 1,
            PatternTier::Source => self.filter_stats.source_filtered += 1,
            PatternTier::Caller => self.filter_stats.caller_filtered += 1,
        }
        for (_, pattern) in matches {
            *self
                .filter_stats
                .pattern_matches
                .entry(pattern.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Serialize with derived fields included.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = match serde_json::to_value(self) {
            Ok(value) => value,
            Err(_) => return serde_json::Value::Null,
        };
        if let Some(file_stats) = value.get_mut("file_stats").and_then(|v| v.as_object_mut()) {
            file_stats.insert(
                "avg_lines_per_file".to_string(),
                json!(self.file_stats.avg_lines_per_file()),
            );
        }
        if let Some(filter_stats) = value.get_mut("filter_stats").and_then(|v| v.as_object_mut()) {
            let patterns: Vec<serde_json::Value> = self
                .filter_stats
                .most_effective_patterns()
                .into_iter()
                .map(|(pattern, count)| json!({ "pattern": pattern, "files_filtered": count }))
                .collect();
            filter_stats.insert("most_effective_patterns".to_string(), json!(patterns));
        }
        value
    }
}
