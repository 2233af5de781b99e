//! Three-way merge integration (spec.md §4.6/§11): the point where a
//! concurrent text edit that the (opaque, out-of-scope) CRDT library
//! rejects falls back to [`zinc_merge::three_way_merge_text`]. Blocks
//! carry their text through [`BlockContent::text`]/[`BlockContent::with_text`]
//! specifically so this function can operate on any variant without
//! matching on it.

use zinc_merge::{three_way_merge_text, MergeKind};
use zinc_storage::models::Block;

/// Outcome of reconciling one block's concurrent edit.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMergeOutcome {
    pub block: Block,
    pub clean: bool,
}

/// Merge `ours` and `theirs` against their common `base`, all three being
/// versions of the same block id. Content type (and all other variant
/// fields) are taken from `ours` — only the text changes; `updated_at` is
/// the later of the two conflicting edits.
///
/// spec.md §4.6: used "when two sides edit the same text block
/// concurrently," in particular for `Code`/`Quote` blocks where content
/// has line semantics the CRDT library doesn't understand.
pub fn merge_block_edit(base: &Block, ours: &Block, theirs: &Block) -> BlockMergeOutcome {
    let result = three_way_merge_text(base.content.text(), ours.content.text(), theirs.content.text());

    let mut merged = ours.clone();
    merged.content = ours.content.with_text(result.merged);
    merged.updated_at = ours.updated_at.max(theirs.updated_at);

    BlockMergeOutcome {
        block: merged,
        clean: matches!(result.kind, MergeKind::Clean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_core::ids::Id;
    use zinc_storage::models::BlockContent;

    fn block(text: &str, updated_at: i64) -> Block {
        Block {
            id: Id::new(),
            page_id: Id::new(),
            parent_block_id: None,
            content: BlockContent::Paragraph { text: text.into() },
            sort_key: "a0".into(),
            created_at: 0,
            updated_at,
        }
    }

    #[test]
    fn clean_merge_combines_non_overlapping_edits() {
        let base = block("a\nb\nc\n", 1);
        let ours = block("a\nb\nc\nours", 2);
        let theirs = block("theirs\na\nb\nc\n", 3);

        let outcome = merge_block_edit(&base, &ours, &theirs);
        assert!(outcome.clean);
        assert_eq!(outcome.block.content.text(), "theirs\na\nb\nc\nours");
        assert_eq!(outcome.block.updated_at, 3);
    }

    #[test]
    fn conflicting_edits_produce_conflict_markers_and_keep_variant() {
        let base = block("a\nb\nc", 1);
        let mut ours = block("a\nX\nc", 2);
        ours.content = BlockContent::Code {
            text: "a\nX\nc".into(),
            language: Some("rust".into()),
        };
        let mut theirs = block("a\nY\nc", 3);
        theirs.content = BlockContent::Code {
            text: "a\nY\nc".into(),
            language: Some("rust".into()),
        };
        let mut base = base;
        base.content = BlockContent::Code {
            text: "a\nb\nc".into(),
            language: Some("rust".into()),
        };

        let outcome = merge_block_edit(&base, &ours, &theirs);
        assert!(!outcome.clean);
        assert!(outcome.block.content.text().contains("<<<<<<< ours"));
        assert!(matches!(outcome.block.content, BlockContent::Code { .. }));
    }
}
