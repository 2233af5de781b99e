//! Block persistence.
//!
//! Grounded in `examples/original_source/src/storage/block_repository.hpp`.
//! Content variants are stored as the `(block_type, content_markdown,
//! properties_json)` triple SPEC_FULL.md §4 describes, not one table per
//! variant; [`row_to_block`] reconstructs the `BlockContent` enum from it.

use serde_json::json;
use sqlx::Row;

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

use crate::models::{Block, BlockContent};
use crate::store::{map_sqlx_error, Store};

#[derive(Clone)]
pub struct BlockRepository {
    store: Store,
}

const SELECT_COLUMNS: &str = "id, page_id, parent_block_id, block_type, content_markdown, properties_json, sort_order, created_at, updated_at";

impl BlockRepository {
    pub fn new(store: Store) -> Self {
        BlockRepository { store }
    }

    pub async fn save(&self, block: &Block) -> Result<()> {
        block.content.validate()?;
        let (block_type, content_markdown, properties_json) = encode_content(&block.content)?;
        sqlx::query(
            r#"
            INSERT INTO blocks
                (id, page_id, parent_block_id, block_type, content_markdown, properties_json, sort_order, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                parent_block_id = excluded.parent_block_id,
                block_type = excluded.block_type,
                content_markdown = excluded.content_markdown,
                properties_json = excluded.properties_json,
                sort_order = excluded.sort_order,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(block.id.to_string())
        .bind(block.page_id.to_string())
        .bind(block.parent_block_id.map(|id| id.to_string()))
        .bind(block_type)
        .bind(content_markdown)
        .bind(properties_json)
        .bind(&block.sort_key)
        .bind(block.created_at)
        .bind(block.updated_at)
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Atomically save a batch of blocks in one transaction (spec.md
    /// §4.1 `save_all`). All-or-nothing: a single bad block rolls the
    /// whole batch back.
    pub async fn save_all(&self, blocks: &[Block]) -> Result<()> {
        let mut tx = self.store.pool().begin().await.map_err(map_sqlx_error)?;
        for block in blocks {
            block.content.validate()?;
            let (block_type, content_markdown, properties_json) = encode_content(&block.content)?;
            sqlx::query(
                r#"
                INSERT INTO blocks
                    (id, page_id, parent_block_id, block_type, content_markdown, properties_json, sort_order, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    parent_block_id = excluded.parent_block_id,
                    block_type = excluded.block_type,
                    content_markdown = excluded.content_markdown,
                    properties_json = excluded.properties_json,
                    sort_order = excluded.sort_order,
                    updated_at = excluded.updated_at;
                "#,
            )
            .bind(block.id.to_string())
            .bind(block.page_id.to_string())
            .bind(block.parent_block_id.map(|id| id.to_string()))
            .bind(block_type)
            .bind(content_markdown)
            .bind(properties_json)
            .bind(&block.sort_key)
            .bind(block.created_at)
            .bind(block.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn get(&self, id: &Id) -> Result<Block> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM blocks WHERE id = ?;"))
            .bind(id.to_string())
            .fetch_optional(self.store.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| Error::not_found(format!("block {id} not found")))?;
        row_to_block(&row)
    }

    pub async fn by_page(&self, page_id: &Id) -> Result<Vec<Block>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM blocks WHERE page_id = ? ORDER BY sort_order;"
        ))
        .bind(page_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_block).collect()
    }

    pub async fn children_of(&self, parent_block_id: &Id) -> Result<Vec<Block>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM blocks WHERE parent_block_id = ? ORDER BY sort_order;"
        ))
        .bind(parent_block_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_block).collect()
    }

    pub async fn roots_of(&self, page_id: &Id) -> Result<Vec<Block>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM blocks WHERE page_id = ? AND parent_block_id IS NULL ORDER BY sort_order;"
        ))
        .bind(page_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_block).collect()
    }

    pub async fn count_by_page(&self, page_id: &Id) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM blocks WHERE page_id = ?;")
            .bind(page_id.to_string())
            .fetch_one(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.get::<i64, _>("n"))
    }

    pub async fn remove(&self, id: &Id) -> Result<()> {
        let result = sqlx::query("DELETE FROM blocks WHERE id = ?;")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("block {id} not found")));
        }
        Ok(())
    }

    pub async fn remove_by_page(&self, page_id: &Id) -> Result<()> {
        sqlx::query("DELETE FROM blocks WHERE page_id = ?;")
            .bind(page_id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn encode_content(content: &BlockContent) -> Result<(&'static str, &str, String)> {
    let block_type = content.type_name();
    let text = content.text();
    let properties = match content {
        BlockContent::Heading { level, .. } => json!({ "level": level }),
        BlockContent::Todo { checked, .. } => json!({ "checked": checked }),
        BlockContent::Code { language, .. } => json!({ "language": language }),
        BlockContent::Toggle { expanded, .. } => json!({ "expanded": expanded }),
        BlockContent::Paragraph { .. } | BlockContent::Quote { .. } | BlockContent::Divider => {
            json!({})
        }
    };
    Ok((block_type, text, properties.to_string()))
}

fn decode_content(block_type: &str, content_markdown: String, properties_json: &str) -> Result<BlockContent> {
    let properties: serde_json::Value = serde_json::from_str(properties_json)?;
    let content = match block_type {
        "paragraph" => BlockContent::Paragraph { text: content_markdown },
        "heading" => {
            let level = properties
                .get("level")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::bad_input("heading block missing level property"))? as u8;
            BlockContent::Heading { text: content_markdown, level }
        }
        "todo" => {
            let checked = properties.get("checked").and_then(|v| v.as_bool()).unwrap_or(false);
            BlockContent::Todo { text: content_markdown, checked }
        }
        "code" => {
            let language = properties
                .get("language")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            BlockContent::Code { text: content_markdown, language }
        }
        "quote" => BlockContent::Quote { text: content_markdown },
        "divider" => BlockContent::Divider,
        "toggle" => {
            let expanded = properties.get("expanded").and_then(|v| v.as_bool()).unwrap_or(false);
            BlockContent::Toggle { text: content_markdown, expanded }
        }
        other => return Err(Error::bad_input(format!("unknown block_type {other:?}"))),
    };
    content.validate()?;
    Ok(content)
}

fn row_to_block(row: &sqlx::sqlite::SqliteRow) -> Result<Block> {
    let id: String = row.get("id");
    let page_id: String = row.get("page_id");
    let parent_block_id: Option<String> = row.get("parent_block_id");
    let block_type: String = row.get("block_type");
    let content_markdown: String = row.get("content_markdown");
    let properties_json: String = row.get("properties_json");
    Ok(Block {
        id: id.parse()?,
        page_id: page_id.parse()?,
        parent_block_id: parent_block_id.map(|s| s.parse()).transpose()?,
        content: decode_content(&block_type, content_markdown, &properties_json)?,
        sort_key: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
