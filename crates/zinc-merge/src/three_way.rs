//! A small, deterministic, line-based three-way merge.
//!
//! Used as the bounded-memory fallback whenever a block's CRDT history is
//! unavailable locally (a peer just joined, or its change log was pruned
//! before the two sides converged). Non-overlapping edits merge cleanly;
//! overlapping edits are wrapped in diff3-style conflict markers rather
//! than silently dropped.

/// Keep the LCS table bounded: ~8MB of `i32` worst case.
const CELL_LIMIT: usize = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Clean,
    Conflict,
    TooLargeFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWayMergeResult {
    pub kind: MergeKind,
    pub merged: String,
}

impl ThreeWayMergeResult {
    pub fn is_clean(&self) -> bool {
        self.kind == MergeKind::Clean
    }
}

fn split_lines(text: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(64);
    let mut current = String::with_capacity(64);
    for c in text.chars() {
        match c {
            '\r' => continue,
            '\n' => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

struct DiffEdits {
    /// `inserts_before[i]` are the lines of `other` to splice in before
    /// `base[i]`; `inserts_before[base.len()]` goes at the very end.
    inserts_before: Vec<Vec<String>>,
    /// `deletes[i]` is true when `base[i]` is absent from `other`.
    deletes: Vec<bool>,
}

fn diff_edits_from_base(base: &[String], other: &[String]) -> DiffEdits {
    let n = base.len();
    let m = other.len();

    if n == 0 {
        let mut inserts_before = vec![Vec::new(); 1];
        inserts_before[0] = other.to_vec();
        return DiffEdits {
            inserts_before,
            deletes: Vec::new(),
        };
    }

    if (n + 1).saturating_mul(m + 1) > CELL_LIMIT {
        let mut inserts_before = vec![Vec::new(); n + 1];
        inserts_before[0] = other.to_vec();
        return DiffEdits {
            inserts_before,
            deletes: vec![true; n],
        };
    }

    let width = m + 1;
    let mut dp = vec![0i32; (n + 1) * width];
    let at = |dp: &[i32], i: usize, j: usize| dp[i * width + j];

    for i in 0..n {
        for j in 0..m {
            dp[(i + 1) * width + (j + 1)] = if base[i] == other[j] {
                at(&dp, i, j) + 1
            } else {
                at(&dp, i, j + 1).max(at(&dp, i + 1, j))
            };
        }
    }

    let mut inserts_before: Vec<Vec<String>> = vec![Vec::new(); n + 1];
    let mut deletes = vec![false; n];

    let mut i = n;
    let mut j = m;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && base[i - 1] == other[j - 1] {
            i -= 1;
            j -= 1;
            continue;
        }
        if j > 0 && (i == 0 || at(&dp, i, j - 1) >= at(&dp, i - 1, j)) {
            inserts_before[i].push(other[j - 1].clone());
            j -= 1;
            continue;
        }
        if i > 0 {
            deletes[i - 1] = true;
            i -= 1;
        }
    }

    for bucket in &mut inserts_before {
        bucket.reverse();
    }

    DiffEdits {
        inserts_before,
        deletes,
    }
}

fn conflict_chunk(ours: &[String], theirs: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(ours.len() + theirs.len() + 3);
    out.push("<<<<<<< ours".to_string());
    out.extend(ours.iter().cloned());
    out.push("=======".to_string());
    out.extend(theirs.iter().cloned());
    out.push(">>>>>>> theirs".to_string());
    out
}

/// Merge `ours` and `theirs`, both descended from `base`.
///
/// - Identical results, or a side that didn't change from `base`, merge
///   cleanly with no diffing at all.
/// - Non-overlapping line edits merge cleanly.
/// - Overlapping edits produce [`MergeKind::Conflict`] with diff3-style
///   markers embedded in the output.
/// - Inputs too large for the bounded LCS table fall back to a
///   replace-at-start merge, reported as [`MergeKind::TooLargeFallback`].
pub fn three_way_merge_text(base_text: &str, ours_text: &str, theirs_text: &str) -> ThreeWayMergeResult {
    if ours_text == theirs_text {
        return ThreeWayMergeResult {
            kind: MergeKind::Clean,
            merged: ours_text.to_string(),
        };
    }
    if ours_text == base_text {
        return ThreeWayMergeResult {
            kind: MergeKind::Clean,
            merged: theirs_text.to_string(),
        };
    }
    if theirs_text == base_text {
        return ThreeWayMergeResult {
            kind: MergeKind::Clean,
            merged: ours_text.to_string(),
        };
    }

    let base = split_lines(base_text);
    let ours = split_lines(ours_text);
    let theirs = split_lines(theirs_text);

    let ours_edits = diff_edits_from_base(&base, &ours);
    let theirs_edits = diff_edits_from_base(&base, &theirs);

    let too_large = (base.len() + 1).saturating_mul(ours.len() + 1) > CELL_LIMIT
        || (base.len() + 1).saturating_mul(theirs.len() + 1) > CELL_LIMIT;

    let mut clean = true;
    let mut merged: Vec<String> = Vec::with_capacity(base.len().max(ours.len()).max(theirs.len()) + 16);

    let mut emit_inserts = |a: &[String], b: &[String], merged: &mut Vec<String>, clean: &mut bool| {
        if a.is_empty() && b.is_empty() {
            return;
        }
        if a.is_empty() {
            merged.extend(b.iter().cloned());
            return;
        }
        if b.is_empty() {
            merged.extend(a.iter().cloned());
            return;
        }
        if a == b {
            merged.extend(a.iter().cloned());
            return;
        }
        *clean = false;
        merged.extend(conflict_chunk(a, b));
    };

    for i in 0..base.len() {
        emit_inserts(&ours_edits.inserts_before[i], &theirs_edits.inserts_before[i], &mut merged, &mut clean);

        let ours_deleted = ours_edits.deletes[i];
        let theirs_deleted = theirs_edits.deletes[i];
        if ours_deleted || theirs_deleted {
            continue;
        }
        merged.push(base[i].clone());
    }
    emit_inserts(
        &ours_edits.inserts_before[base.len()],
        &theirs_edits.inserts_before[base.len()],
        &mut merged,
        &mut clean,
    );

    let kind = if too_large {
        MergeKind::TooLargeFallback
    } else if clean {
        MergeKind::Clean
    } else {
        MergeKind::Conflict
    };

    ThreeWayMergeResult {
        kind,
        merged: join_lines(&merged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_edits_merge_clean() {
        let r = three_way_merge_text("a\nb\nc", "a\nb\nc\nd", "a\nb\nc\nd");
        assert_eq!(r.kind, MergeKind::Clean);
        assert_eq!(r.merged, "a\nb\nc\nd");
    }

    #[test]
    fn only_one_side_changed_merges_clean() {
        let r = three_way_merge_text("a\nb\nc", "a\nb\nc\nd", "a\nb\nc");
        assert_eq!(r.kind, MergeKind::Clean);
        assert_eq!(r.merged, "a\nb\nc\nd");
    }

    #[test]
    fn non_overlapping_edits_merge_clean() {
        let base = "line1\nline2\nline3";
        let ours = "line1 edited\nline2\nline3";
        let theirs = "line1\nline2\nline3 edited";
        let r = three_way_merge_text(base, ours, theirs);
        assert_eq!(r.kind, MergeKind::Clean);
        assert_eq!(r.merged, "line1 edited\nline2\nline3 edited");
    }

    #[test]
    fn overlapping_edits_produce_conflict_markers() {
        let base = "hello";
        let ours = "hello ours";
        let theirs = "hello theirs";
        let r = three_way_merge_text(base, ours, theirs);
        assert_eq!(r.kind, MergeKind::Conflict);
        assert!(r.merged.contains("<<<<<<< ours"));
        assert!(r.merged.contains("======="));
        assert!(r.merged.contains(">>>>>>> theirs"));
    }

    #[test]
    fn deleting_a_line_on_one_side_is_applied() {
        let base = "a\nb\nc";
        let ours = "a\nc";
        let theirs = "a\nb\nc";
        let r = three_way_merge_text(base, ours, theirs);
        assert_eq!(r.kind, MergeKind::Clean);
        assert_eq!(r.merged, "a\nc");
    }

    #[test]
    fn merge_is_idempotent_when_nothing_changed() {
        let text = "stable\ncontent\nhere";
        let r = three_way_merge_text(text, text, text);
        assert_eq!(r.kind, MergeKind::Clean);
        assert_eq!(r.merged, text);
    }

    proptest::proptest! {
        #[test]
        fn merging_unchanged_text_against_itself_is_always_clean(
            s in "[a-z\n]{0,80}"
        ) {
            let r = three_way_merge_text(&s, &s, &s);
            proptest::prop_assert_eq!(r.kind, MergeKind::Clean);
            proptest::prop_assert_eq!(r.merged, s);
        }

        #[test]
        fn one_sided_change_always_wins_cleanly(
            base in "[a-z\n]{0,40}",
            ours in "[a-z\n]{0,40}",
        ) {
            let r = three_way_merge_text(&base, &ours, &base);
            proptest::prop_assert_eq!(r.kind, MergeKind::Clean);
            proptest::prop_assert_eq!(r.merged, ours);
        }
    }
}
