//! Layered ignore-pattern engine.
//!
//! Three ordered pattern lists (system defaults, source-tree rules, caller
//! additions) are unioned into one combined rule set before matching; there
//! are no override semantics between tiers, so a caller-supplied pattern
//! cannot un-ignore something the system or source tier excludes. Matching
//! follows directory-aware ignore-file semantics: a trailing `/` anchors a
//! pattern to directories, `*` does not cross path separators unless
//! doubled, and a pattern without an internal `/` matches at any depth.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

/// System-wide ignore patterns applied to every run.
pub const SYSTEM_IGNORES: &[&str] = &[
    // Version control
    ".git/",
    ".svn/",
    ".hg/",
    // Dependencies and build artifacts
    "node_modules/",
    "venv/",
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "build/",
    "dist/",
    "*.egg-info/",
    // IDE and editor files
    ".idea/",
    ".vscode/",
    "*.swp",
    "*.swo",
    ".DS_Store",
    // Common build and test directories
    "coverage/",
    ".coverage",
    ".pytest_cache/",
    ".tox/",
    // Large binary and media files
    "*.zip",
    "*.tar.gz",
    "*.rar",
    "*.mp4",
    "*.mp3",
    "*.avi",
    "*.mov",
    "*.iso",
];

/// Which list a pattern came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternTier {
    System,
    Source,
    Caller,
}

/// Strip whitespace and drop blank lines and `#` comments.
pub fn normalize_patterns<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let trimmed = line.as_ref().trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Three named pattern lists unioned into one combined rule set.
///
/// The combined set is recomputed eagerly on every mutation; it is never
/// partially stale.
#[derive(Debug, Clone)]
pub struct PatternSet {
    system: Vec<String>,
    source: Vec<String>,
    caller: Vec<String>,
    combined: Vec<(PatternTier, String)>,
}

impl PatternSet {
    pub fn new(system: Vec<String>, source: Vec<String>, caller: Vec<String>) -> Self {
        let mut set = Self {
            system: normalize_patterns(&system),
            source: normalize_patterns(&source),
            caller: normalize_patterns(&caller),
            combined: Vec::new(),
        };
        set.recombine();
        set
    }

    /// Pattern set seeded with the system defaults.
    pub fn with_defaults(source: Vec<String>, caller: Vec<String>) -> Self {
        Self::new(
            SYSTEM_IGNORES.iter().map(|s| s.to_string()).collect(),
            source,
            caller,
        )
    }

    /// Add caller patterns after construction. Forces a full recombination;
    /// there is no incremental update.
    pub fn add_caller_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.caller.extend(normalize_patterns(patterns));
        self.recombine();
    }

    fn recombine(&mut self) {
        let mut combined: Vec<(PatternTier, String)> = Vec::new();
        for (tier, list) in [
            (PatternTier::System, &self.system),
            (PatternTier::Source, &self.source),
            (PatternTier::Caller, &self.caller),
        ] {
            combined.extend(list.iter().map(|p| (tier, p.clone())));
        }
        // Sorted and de-duplicated by pattern text; the stable sort keeps the
        // earliest tier for duplicates.
        combined.sort_by(|a, b| a.1.cmp(&b.1));
        combined.dedup_by(|a, b| a.1 == b.1);
        self.combined = combined;
    }

    /// The combined, sorted, de-duplicated pattern list.
    pub fn combined(&self) -> Vec<&str> {
        self.combined.iter().map(|(_, p)| p.as_str()).collect()
    }

    /// Build a matcher over the combined rule set.
    pub fn matcher(&self) -> Matcher {
        Matcher::build(&self.combined)
    }
}

/// Compiled matcher answering "is this relative path ignored?".
pub struct Matcher {
    set: GlobSet,
    /// Glob index -> index into `patterns`.
    glob_sources: Vec<usize>,
    patterns: Vec<(PatternTier, String)>,
}

impl Matcher {
    fn build(combined: &[(PatternTier, String)]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut glob_sources = Vec::new();

        for (index, (_, pattern)) in combined.iter().enumerate() {
            for glob_text in expand_pattern(pattern) {
                match GlobBuilder::new(&glob_text).literal_separator(true).build() {
                    Ok(glob) => {
                        builder.add(glob);
                        glob_sources.push(index);
                    }
                    Err(error) => {
                        // A malformed pattern degrades to "never matches"
                        // rather than failing the whole set.
                        warn!(pattern = %pattern, %error, "ignoring malformed pattern");
                        break;
                    }
                }
            }
        }

        let set = match builder.build() {
            Ok(set) => set,
            Err(error) => {
                warn!(%error, "failed to compile pattern set; nothing will be ignored");
                GlobSet::empty()
            }
        };

        Matcher {
            set,
            glob_sources,
            patterns: combined.to_vec(),
        }
    }

    /// Whether the relative path matches any combined pattern.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        self.set.is_match(relative_path)
    }

    /// The (tier, pattern) pairs matching the relative path, de-duplicated,
    /// for filter-statistics attribution.
    pub fn explain(&self, relative_path: &str) -> Vec<(PatternTier, &str)> {
        let mut seen: Vec<(PatternTier, &str)> = Vec::new();
        for glob_index in self.set.matches(relative_path) {
            let pattern_index = self.glob_sources[glob_index];
            let (tier, pattern) = &self.patterns[pattern_index];
            if !seen.iter().any(|(_, p)| *p == pattern.as_str()) {
                seen.push((*tier, pattern.as_str()));
            }
        }
        seen
    }
}

/// Translate one ignore pattern into glob expressions.
///
/// Returns an empty vector for unsupported or empty patterns.
fn expand_pattern(pattern: &str) -> Vec<String> {
    if pattern.starts_with('!') {
        // Union-only semantics: negations cannot override other tiers, so
        // partial support would be misleading.
        warn!(pattern = %pattern, "negation patterns are not supported; line skipped");
        return Vec::new();
    }

    let body = pattern.strip_suffix('/').unwrap_or(pattern);
    let rooted = body.starts_with('/');
    let body = body.trim_start_matches('/');
    if body.is_empty() {
        warn!(pattern = %pattern, "empty pattern; line skipped");
        return Vec::new();
    }

    let anchored = rooted || body.contains('/');
    let mut globs = Vec::new();
    if anchored {
        globs.push(body.to_string());
        globs.push(format!("{}/**", body));
    } else {
        // No internal separator: match at any depth. The bare form is kept
        // alongside the `**/` form so top-level entries always match.
        globs.push(body.to_string());
        globs.push(format!("{}/**", body));
        globs.push(format!("**/{}", body));
        globs.push(format!("**/{}/**", body));
    }
    globs
}
