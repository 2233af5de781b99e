//! `PagesSnapshot` (spec.md §6, code `0x40`): spec.md leaves its payload as
//! "opaque JSON blob for bulk init" and defines no schema for it — this
//! module is that schema. It carries one page's blocks in full (not CRDT
//! deltas, since Block content lives outside the opaque CRDT document), so
//! that a freshly-paired device can be bulk-populated without walking the
//! change log from scratch.
//!
//! This is also where SPEC_FULL.md §11's merge/change-application
//! integration lives: a block present on both sides with different text
//! is reconciled with [`zinc_merge::three_way_merge_text`] rather than
//! last-writer-wins, per spec.md §4.6 ("used to reconcile two concurrent
//! edits to a text block when the CRDT library rejects a merge or the
//! block is a code/quote block with line semantics").

use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;
use zinc_storage::block::BlockRepository;
use zinc_storage::models::{Block, BlockContent};

use crate::block_merge::merge_block_edit;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireBlock {
    id: String,
    page_id: String,
    parent_block_id: Option<String>,
    block_type: String,
    text: String,
    properties: serde_json::Value,
    sort_key: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireSnapshot {
    page_id: String,
    blocks: Vec<WireBlock>,
}

fn to_wire(block: &Block) -> Result<WireBlock> {
    let (block_type, properties) = type_and_properties(&block.content);
    Ok(WireBlock {
        id: block.id.to_string(),
        page_id: block.page_id.to_string(),
        parent_block_id: block.parent_block_id.map(|id| id.to_string()),
        block_type: block_type.into(),
        text: block.content.text().to_string(),
        properties,
        sort_key: block.sort_key.clone(),
        created_at: block.created_at,
        updated_at: block.updated_at,
    })
}

fn type_and_properties(content: &BlockContent) -> (&'static str, serde_json::Value) {
    match content {
        BlockContent::Paragraph { .. } => ("paragraph", serde_json::json!({})),
        BlockContent::Heading { level, .. } => ("heading", serde_json::json!({ "level": level })),
        BlockContent::Todo { checked, .. } => ("todo", serde_json::json!({ "checked": checked })),
        BlockContent::Code { language, .. } => ("code", serde_json::json!({ "language": language })),
        BlockContent::Quote { .. } => ("quote", serde_json::json!({})),
        BlockContent::Divider => ("divider", serde_json::json!({})),
        BlockContent::Toggle { expanded, .. } => ("toggle", serde_json::json!({ "expanded": expanded })),
    }
}

fn from_wire(wire: &WireBlock) -> Result<Block> {
    let content = match wire.block_type.as_str() {
        "paragraph" => BlockContent::Paragraph { text: wire.text.clone() },
        "heading" => {
            let level = wire
                .properties
                .get("level")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::bad_input("snapshot heading block missing level"))? as u8;
            BlockContent::Heading { text: wire.text.clone(), level }
        }
        "todo" => {
            let checked = wire.properties.get("checked").and_then(|v| v.as_bool()).unwrap_or(false);
            BlockContent::Todo { text: wire.text.clone(), checked }
        }
        "code" => {
            let language = wire.properties.get("language").and_then(|v| v.as_str()).map(str::to_string);
            BlockContent::Code { text: wire.text.clone(), language }
        }
        "quote" => BlockContent::Quote { text: wire.text.clone() },
        "divider" => BlockContent::Divider,
        "toggle" => {
            let expanded = wire.properties.get("expanded").and_then(|v| v.as_bool()).unwrap_or(false);
            BlockContent::Toggle { text: wire.text.clone(), expanded }
        }
        other => return Err(Error::bad_input(format!("unknown snapshot block_type {other:?}"))),
    };
    Ok(Block {
        id: wire.id.parse()?,
        page_id: wire.page_id.parse()?,
        parent_block_id: wire.parent_block_id.as_deref().map(str::parse).transpose()?,
        content,
        sort_key: wire.sort_key.clone(),
        created_at: wire.created_at,
        updated_at: wire.updated_at,
    })
}

/// Build a `PagesSnapshot` payload for every block in `page_id`.
pub fn encode_pages_snapshot(page_id: Id, blocks: &[Block]) -> Result<Vec<u8>> {
    let wire = WireSnapshot {
        page_id: page_id.to_string(),
        blocks: blocks.iter().map(to_wire).collect::<Result<Vec<_>>>()?,
    };
    Ok(serde_json::to_vec(&wire)?)
}

struct DecodedSnapshot {
    page_id: Id,
    blocks: Vec<Block>,
}

fn decode_pages_snapshot(data: &[u8]) -> Result<DecodedSnapshot> {
    let wire: WireSnapshot = serde_json::from_slice(data).map_err(|e| Error::bad_input(format!("malformed PagesSnapshot: {e}")))?;
    Ok(DecodedSnapshot {
        page_id: wire.page_id.parse()?,
        blocks: wire.blocks.iter().map(from_wire).collect::<Result<Vec<_>>>()?,
    })
}

/// Apply an incoming `PagesSnapshot`: a block absent locally is inserted
/// outright; one present locally with identical text is left alone; one
/// present locally with *different* text is reconciled with
/// [`merge_block_edit`], since a snapshot carries no common-ancestor
/// version — the empty string stands in for "no shared history", which
/// still produces deterministic conflict markers for genuinely divergent
/// edits instead of silently picking a winner.
///
/// Returns the number of blocks that required a non-clean merge, for the
/// caller to fold into a `SyncCompleted`/log line.
pub async fn apply_pages_snapshot(blocks_repo: &BlockRepository, payload: &[u8]) -> Result<usize> {
    let decoded = decode_pages_snapshot(payload)?;
    let mut conflicts = 0;
    for incoming in decoded.blocks {
        match blocks_repo.get(&incoming.id).await {
            Err(_) => {
                blocks_repo.save(&incoming).await?;
            }
            Ok(local) if local.content.text() == incoming.content.text() => {
                // Same text already; nothing to reconcile.
            }
            Ok(local) => {
                let base = empty_of_variant(&local.content);
                let outcome = merge_block_edit(&base, &local, &incoming);
                if !outcome.clean {
                    conflicts += 1;
                }
                blocks_repo.save(&outcome.block).await?;
            }
        }
    }
    Ok(conflicts)
}

fn empty_of_variant(content: &BlockContent) -> Block {
    Block {
        id: Id::nil(),
        page_id: Id::nil(),
        parent_block_id: None,
        content: content.with_text(String::new()),
        sort_key: String::new(),
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_storage::store::Store;

    fn block(id: Id, text: &str, updated_at: i64) -> Block {
        Block {
            id,
            page_id: Id::new(),
            parent_block_id: None,
            content: BlockContent::Paragraph { text: text.into() },
            sort_key: "a0".into(),
            created_at: 0,
            updated_at,
        }
    }

    async fn repo_with_page() -> (BlockRepository, Id) {
        let store = Store::open_in_memory().await.unwrap();
        let pages = zinc_storage::page::PageRepository::new(store.clone());
        let page_id = Id::new();
        pages
            .save(&zinc_storage::models::Page {
                id: page_id,
                workspace_id: Id::new(),
                parent_page_id: None,
                title: "Inbox".into(),
                sort_order: 0,
                archived: false,
                created_at: 0,
                updated_at: 0,
                crdt_doc_id: Id::new(),
            })
            .await
            .unwrap();
        (BlockRepository::new(store), page_id)
    }

    #[tokio::test]
    async fn unknown_block_is_inserted_outright() {
        let (repo, page_id) = repo_with_page().await;
        let mut b = block(Id::new(), "hello", 1);
        b.page_id = page_id;
        let payload = encode_pages_snapshot(page_id, &[b.clone()]).unwrap();

        let conflicts = apply_pages_snapshot(&repo, &payload).await.unwrap();
        assert_eq!(conflicts, 0);
        assert_eq!(repo.get(&b.id).await.unwrap().content.text(), "hello");
    }

    #[tokio::test]
    async fn divergent_edits_are_merged_not_overwritten() {
        let (repo, page_id) = repo_with_page().await;
        let id = Id::new();
        let mut local = block(id, "ours line", 5);
        local.page_id = page_id;
        repo.save(&local).await.unwrap();

        let mut incoming = block(id, "theirs line", 6);
        incoming.page_id = page_id;
        let payload = encode_pages_snapshot(page_id, &[incoming]).unwrap();

        let conflicts = apply_pages_snapshot(&repo, &payload).await.unwrap();
        assert_eq!(conflicts, 1);
        let merged = repo.get(&id).await.unwrap();
        assert!(merged.content.text().contains("<<<<<<< ours"));
        assert!(merged.content.text().contains("ours line"));
        assert!(merged.content.text().contains("theirs line"));
    }

    #[tokio::test]
    async fn identical_text_is_left_untouched() {
        let (repo, page_id) = repo_with_page().await;
        let id = Id::new();
        let mut local = block(id, "same", 1);
        local.page_id = page_id;
        repo.save(&local).await.unwrap();

        let mut incoming = block(id, "same", 99);
        incoming.page_id = page_id;
        let payload = encode_pages_snapshot(page_id, &[incoming]).unwrap();

        let conflicts = apply_pages_snapshot(&repo, &payload).await.unwrap();
        assert_eq!(conflicts, 0);
        assert_eq!(repo.get(&id).await.unwrap().updated_at, 1);
    }
}
