//! Integration tests for the concatenation engine

use repocat::concat::ConcatenationEngine;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn engine(root: &Path, caller: &[&str], output: &Path) -> ConcatenationEngine {
    let caller: Vec<String> = caller.iter().map(|s| s.to_string()).collect();
    ConcatenationEngine::new(root, &caller, output).unwrap()
}

/// Relative paths named by `File:` headers in an artifact.
fn artifact_files(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("File: "))
        .map(|s| s.to_string())
        .collect()
}

#[test]
fn test_filtering_scenario() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "hello world\n").unwrap();
    fs::write(root.join("b.log"), "log line\n").unwrap();
    fs::write(root.join(".gitignore"), "*.log\n.gitignore\n").unwrap();
    fs::create_dir_all(root.join("vendor/sub")).unwrap();
    fs::write(root.join("vendor/c.txt"), "vendored\n").unwrap();
    fs::write(root.join("vendor/sub/deep.txt"), "deep\n").unwrap();

    let output = temp.path().join("out");
    let report = engine(&root, &["vendor/"], &output).run().unwrap();

    let content = fs::read_to_string(&report.artifact_path).unwrap();
    assert_eq!(artifact_files(&content), vec!["a.txt"]);
    assert!(content.contains("hello world"));
    assert!(!content.contains("vendored"));
    assert!(!content.contains("log line"));

    let stats = &report.statistics;
    // Files beneath the pruned vendor directory were never counted.
    assert_eq!(stats.file_stats.total_files, 1);
    assert_eq!(stats.file_stats.processed_files, 1);
    assert_eq!(stats.file_stats.skipped_files, 0);

    // b.log and .gitignore are attributed to the source tier, the vendor
    // directory to the caller tier.
    assert_eq!(stats.filter_stats.source_filtered, 2);
    assert_eq!(stats.filter_stats.caller_filtered, 1);
    assert_eq!(stats.filter_stats.pattern_matches.get("*.log"), Some(&1));
    assert_eq!(stats.filter_stats.pattern_matches.get("vendor/"), Some(&1));

    // Only the root directory was visited.
    assert_eq!(stats.dir_stats.total_dirs, 1);
    assert_eq!(report.tree.file_paths(), vec!["a.txt"]);
}

#[test]
fn test_binary_file_skipped_not_fatal() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "text\n").unwrap();
    fs::write(root.join("blob.dat"), [0u8, 0x9f, 0x92, 0x96]).unwrap();

    let output = temp.path().join("out");
    let report = engine(&root, &[], &output).run().unwrap();

    let stats = &report.statistics.file_stats;
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.processed_files, 1);
    assert_eq!(stats.skipped_files, 1);
    assert_eq!(stats.processed_files + stats.skipped_files, stats.total_files);

    // The skipped file contributes no block to the artifact.
    let content = fs::read_to_string(&report.artifact_path).unwrap();
    assert_eq!(artifact_files(&content), vec!["a.txt"]);
}

#[test]
fn test_deterministic_output() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::write(root.join("README.md"), "# readme\n").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
    fs::write(root.join("src/nested/lib.rs"), "pub fn lib() {}\n").unwrap();
    fs::write(root.join("zeta.txt"), "last\n").unwrap();

    let output = temp.path().join("out");
    let first = engine(&root, &[], &output).run().unwrap();
    let second = engine(&root, &[], &output).run().unwrap();

    // Distinct artifact names, byte-identical content.
    assert_ne!(first.artifact_path, second.artifact_path);
    let first_content = fs::read(&first.artifact_path).unwrap();
    let second_content = fs::read(&second.artifact_path).unwrap();
    assert_eq!(first_content, second_content);

    // Lexicographic order of relative paths.
    let content = String::from_utf8(first_content).unwrap();
    let files = artifact_files(&content);
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
}

#[test]
fn test_tree_matches_concatenated_content() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(root.join("target/debug")).unwrap();
    fs::write(root.join("lib.rs"), "code\n").unwrap();
    fs::write(root.join("docs/guide.md"), "guide\n").unwrap();
    fs::write(root.join("notes.log"), "noise\n").unwrap();
    fs::write(root.join("target/debug/artifact.bin"), "junk\n").unwrap();

    let output = temp.path().join("out");
    let report = engine(&root, &["*.log", "target/"], &output).run().unwrap();

    let content = fs::read_to_string(&report.artifact_path).unwrap();
    let mut from_artifact = artifact_files(&content);
    from_artifact.sort();

    // The tree pass and the concatenation pass made identical decisions.
    assert_eq!(report.tree.file_paths(), from_artifact);
    assert_eq!(
        report.statistics.file_stats.total_files,
        from_artifact.len()
    );
}

#[test]
fn test_statistics_invariants() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("big.txt"), "1\n2\n3\n\n// comment\n").unwrap();
    fs::write(root.join("src/small.txt"), "x\n").unwrap();

    let output = temp.path().join("out");
    let report = engine(&root, &[], &output).run().unwrap();
    let stats = &report.statistics;

    assert_eq!(
        stats.file_stats.processed_files + stats.file_stats.skipped_files,
        stats.file_stats.total_files
    );
    assert!(stats.file_stats.total_lines >= stats.file_stats.empty_lines);
    assert_eq!(stats.file_stats.largest_file.path.as_deref(), Some("big.txt"));
    assert_eq!(stats.file_stats.largest_file.size, 18);
    assert_eq!(stats.dir_stats.total_dirs, 3);
    assert_eq!(stats.dir_stats.empty_dirs, 1);
    assert_eq!(stats.dir_stats.max_depth, 1);
    assert_eq!(stats.file_stats.avg_lines_per_file(), 3.0);
}

#[test]
fn test_artifact_format() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("only.txt"), "payload\n").unwrap();

    let output = temp.path().join("out");
    let report = engine(&root, &[], &output).run().unwrap();
    let content = fs::read_to_string(&report.artifact_path).unwrap();

    let canonical_root = root.canonicalize().unwrap();
    let header = format!("Repository: {}", canonical_root.display());
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], header);
    assert_eq!(lines[1], "=".repeat(header.len()));
    // Separator sized to the file path header.
    assert!(content.contains("File: only.txt"));
    assert!(content.contains(&"-".repeat("only.txt".len() + 6)));
    assert!(content.contains("payload"));
}

#[test]
fn test_missing_root_is_an_error() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out");
    let missing = temp.path().join("does-not-exist");
    let result = ConcatenationEngine::new(&missing, &[], &output);
    assert!(result.is_err());
}
