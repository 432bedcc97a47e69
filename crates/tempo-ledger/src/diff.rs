use similar::{ChangeTag, TextDiff};

use crate::types::DiffSummary;

/// Summarize the line diff going from `before` to `after`.
///
/// Deterministic for identical inputs. Paired delete+insert lines are
/// reported as changed; the surplus on either side as removed/added.
pub fn summarize(before: &str, after: &str, from_version: i64, to_version: i64) -> DiffSummary {
    let diff = TextDiff::from_lines(before, after);

    let mut deleted = 0usize;
    let mut inserted = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Insert => inserted += 1,
            ChangeTag::Equal => {}
        }
    }

    let changed = deleted.min(inserted);
    DiffSummary {
        from_version,
        to_version,
        lines_added: inserted - changed,
        lines_removed: deleted - changed,
        lines_changed: changed,
        total_before: before.lines().count(),
        total_after: after.lines().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_yield_zero_changes() {
        let text = "a\nb\nc\n";
        let summary = summarize(text, text, 1, 2);
        assert_eq!(summary.lines_added, 0);
        assert_eq!(summary.lines_removed, 0);
        assert_eq!(summary.lines_changed, 0);
        assert_eq!(summary.total_before, 3);
        assert_eq!(summary.total_after, 3);
    }

    #[test]
    fn pure_addition() {
        let summary = summarize("a\n", "a\nb\nc\n", 1, 2);
        assert_eq!(summary.lines_added, 2);
        assert_eq!(summary.lines_removed, 0);
        assert_eq!(summary.lines_changed, 0);
        assert_eq!(summary.total_after, 3);
    }

    #[test]
    fn pure_removal() {
        let summary = summarize("a\nb\nc\n", "b\n", 1, 2);
        assert_eq!(summary.lines_removed, 2);
        assert_eq!(summary.lines_added, 0);
    }

    #[test]
    fn replaced_line_counts_as_changed() {
        let summary = summarize("a\nb\nc\n", "a\nB\nc\n", 3, 4);
        assert_eq!(summary.lines_changed, 1);
        assert_eq!(summary.lines_added, 0);
        assert_eq!(summary.lines_removed, 0);
        assert_eq!(summary.from_version, 3);
        assert_eq!(summary.to_version, 4);
    }

    #[test]
    fn direction_is_labeled() {
        let forward = summarize("a\n", "a\nb\n", 1, 2);
        let backward = summarize("a\nb\n", "a\n", 2, 1);
        assert_eq!(forward.lines_added, backward.lines_removed);
        assert_eq!(forward.from_version, backward.to_version);
    }

    #[test]
    fn deterministic() {
        let before = "fn a() {}\nfn b() {}\n";
        let after = "fn a() {}\nfn c() {}\nfn d() {}\n";
        assert_eq!(summarize(before, after, 1, 2), summarize(before, after, 1, 2));
    }
}
