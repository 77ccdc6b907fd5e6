//! Filtered tree representation of a processed directory.
//!
//! Built once per run by a traversal over the same filter decisions as the
//! concatenation pass; read-only after construction.

use crate::error::Error;
use crate::patterns::Matcher;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One node of the post-filter directory structure.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Relative paths of all file nodes, depth-first.
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.kind == NodeKind::File {
                paths.push(node.path.clone());
            }
            for child in &node.children {
                stack.push(child);
            }
        }
        paths.sort();
        paths
    }
}

/// Build the filtered tree for `root`, applying exactly the same ignore
/// decisions as the walk that feeds the artifact.
pub fn build_tree(root: &Path, matcher: &Matcher) -> Result<TreeNode, Error> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut node = TreeNode {
        name,
        path: String::new(),
        kind: NodeKind::Directory,
        size: None,
        extension: None,
        children: Vec::new(),
    };
    add_children(root, root, matcher, &mut node.children);
    Ok(node)
}

fn add_children(dir: &Path, base: &Path, matcher: &Matcher, children: &mut Vec<TreeNode>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(path = %dir.display(), %error, "failed to read directory for tree");
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    // Directories first, then case-insensitive by name, for a stable
    // presentation order.
    entries.sort_by_key(|entry| {
        (
            entry.path().is_file(),
            entry.file_name().to_string_lossy().to_lowercase(),
        )
    });

    for entry in entries {
        let path = entry.path();
        let relative = match path.strip_prefix(base) {
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        if matcher.is_ignored(&relative) {
            continue;
        }

        let is_file = path.is_file();
        let mut node = TreeNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: relative,
            kind: if is_file {
                NodeKind::File
            } else {
                NodeKind::Directory
            },
            size: if is_file {
                entry.metadata().map(|m| m.len()).ok()
            } else {
                None
            },
            extension: if is_file {
                path.extension().map(|e| e.to_string_lossy().to_lowercase())
            } else {
                None
            },
            children: Vec::new(),
        };

        if !is_file {
            add_children(&path, base, matcher, &mut node.children);
        }
        children.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternSet;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_tree_respects_matcher() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.log"), "b").unwrap();
        fs::create_dir(root.join("vendor")).unwrap();
        fs::write(root.join("vendor/c.txt"), "c").unwrap();

        let set = PatternSet::new(
            vec![],
            vec!["*.log".to_string()],
            vec!["vendor/".to_string()],
        );
        let tree = build_tree(root, &set.matcher()).unwrap();

        assert_eq!(tree.file_paths(), vec!["a.txt".to_string()]);
        assert!(tree.children.iter().all(|c| c.name != "vendor"));
    }

    #[test]
    fn test_tree_orders_directories_first() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("aaa.txt"), "a").unwrap();
        fs::create_dir(root.join("zzz")).unwrap();

        let set = PatternSet::new(vec![], vec![], vec![]);
        let tree = build_tree(root, &set.matcher()).unwrap();

        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zzz", "aaa.txt"]);
    }

    #[test]
    fn test_file_nodes_carry_size_and_extension() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("main.RS"), "fn main() {}").unwrap();

        let set = PatternSet::new(vec![], vec![], vec![]);
        let tree = build_tree(root, &set.matcher()).unwrap();

        let file = &tree.children[0];
        assert_eq!(file.kind, NodeKind::File);
        assert_eq!(file.size, Some(12));
        assert_eq!(file.extension.as_deref(), Some("rs"));
    }
}
