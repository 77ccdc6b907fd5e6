//! Property-based tests for filtering determinism and idempotence.

use proptest::prelude::*;
use repocat::patterns::PatternSet;

fn pattern_lists() -> (Vec<String>, Vec<String>) {
    (
        vec!["*.log".to_string(), "docs/internal/".to_string()],
        vec!["vendor/".to_string(), "*.tmp".to_string()],
    )
}

fn relative_path() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,8}", 1..4).prop_map(|parts| parts.join("/"))
}

proptest! {
    /// Repeated evaluation over the same path yields the same boolean.
    #[test]
    fn filter_evaluation_is_idempotent(path in relative_path()) {
        let (source, caller) = pattern_lists();
        let matcher = PatternSet::with_defaults(source, caller).matcher();
        prop_assert_eq!(matcher.is_ignored(&path), matcher.is_ignored(&path));
    }

    /// Two matchers built from identical inputs agree on every path.
    #[test]
    fn rebuilt_matcher_agrees(path in relative_path()) {
        let (source, caller) = pattern_lists();
        let set = PatternSet::with_defaults(source, caller);
        let first = set.matcher();
        let second = set.matcher();
        prop_assert_eq!(first.is_ignored(&path), second.is_ignored(&path));
    }

    /// Everything beneath an ignored directory is itself ignored.
    #[test]
    fn ignored_directory_covers_descendants(path in relative_path()) {
        let set = PatternSet::new(vec![], vec![], vec!["vendor/".to_string()]);
        let matcher = set.matcher();
        let candidate = format!("vendor/{}", path);
        prop_assert!(matcher.is_ignored(&candidate));
    }
}

#[test]
fn combined_set_is_deterministic() {
    let (source, caller) = pattern_lists();
    let first = PatternSet::with_defaults(source.clone(), caller.clone());
    let second = PatternSet::with_defaults(source, caller);
    assert_eq!(first.combined(), second.combined());

    let combined = first.combined();
    let mut sorted = combined.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(combined, sorted);
}
