//! Attachment row bookkeeping (SPEC_FULL.md §4: `attachments` migration).
//!
//! Only the row bookkeeping lives here; attachment *content* (encryption,
//! placement under `ZINC_ATTACHMENTS_DIR`) is the host application's
//! concern, per spec.md §1's scope boundary.

use sqlx::Row;

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

use crate::models::Attachment;
use crate::store::{map_sqlx_error, Store};

#[derive(Clone)]
pub struct AttachmentRepository {
    store: Store,
}

const SELECT_COLUMNS: &str = "id, block_id, filename, mime_type, size_bytes, hash_sha256, external_path, created_at";

impl AttachmentRepository {
    pub fn new(store: Store) -> Self {
        AttachmentRepository { store }
    }

    pub async fn save(&self, attachment: &Attachment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attachments (id, block_id, filename, mime_type, size_bytes, hash_sha256, external_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                block_id = excluded.block_id,
                filename = excluded.filename,
                mime_type = excluded.mime_type,
                size_bytes = excluded.size_bytes,
                hash_sha256 = excluded.hash_sha256,
                external_path = excluded.external_path;
            "#,
        )
        .bind(attachment.id.to_string())
        .bind(attachment.block_id.map(|id| id.to_string()))
        .bind(&attachment.filename)
        .bind(&attachment.mime_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.hash_sha256)
        .bind(&attachment.external_path)
        .bind(attachment.created_at)
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn get(&self, id: &Id) -> Result<Attachment> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM attachments WHERE id = ?;"))
            .bind(id.to_string())
            .fetch_optional(self.store.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| Error::not_found(format!("attachment {id} not found")))?;
        row_to_attachment(&row)
    }

    pub async fn by_block(&self, block_id: &Id) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM attachments WHERE block_id = ? ORDER BY created_at;"
        ))
        .bind(block_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_attachment).collect()
    }

    pub async fn remove_by_block(&self, block_id: &Id) -> Result<()> {
        sqlx::query("DELETE FROM attachments WHERE block_id = ?;")
            .bind(block_id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn row_to_attachment(row: &sqlx::sqlite::SqliteRow) -> Result<Attachment> {
    let id: String = row.get("id");
    let block_id: Option<String> = row.get("block_id");
    Ok(Attachment {
        id: id.parse()?,
        block_id: block_id.map(|s| s.parse()).transpose()?,
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        hash_sha256: row.get("hash_sha256"),
        external_path: row.get("external_path"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(block_id: Option<Id>) -> Attachment {
        Attachment {
            id: Id::new(),
            block_id,
            filename: "photo.png".into(),
            mime_type: "image/png".into(),
            size_bytes: 1024,
            hash_sha256: "a".repeat(64),
            external_path: Some("/attachments/photo.png".into()),
            created_at: zinc_core::now_ms(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = AttachmentRepository::new(store);
        let a = sample(None);
        repo.save(&a).await.unwrap();
        assert_eq!(repo.get(&a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn by_block_and_remove_by_block() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = AttachmentRepository::new(store);
        let block_id = Id::new();
        repo.save(&sample(Some(block_id))).await.unwrap();
        repo.save(&sample(Some(block_id))).await.unwrap();
        assert_eq!(repo.by_block(&block_id).await.unwrap().len(), 2);

        repo.remove_by_block(&block_id).await.unwrap();
        assert_eq!(repo.by_block(&block_id).await.unwrap().len(), 0);
    }
}
