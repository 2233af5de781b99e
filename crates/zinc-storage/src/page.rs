//! Page (note) persistence.
//!
//! Grounded in `examples/original_source/src/storage/page_repository.hpp`.

use sqlx::Row;

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

use crate::models::Page;
use crate::store::{map_sqlx_error, Store};

#[derive(Clone)]
pub struct PageRepository {
    store: Store,
}

impl PageRepository {
    pub fn new(store: Store) -> Self {
        PageRepository { store }
    }

    pub async fn save(&self, page: &Page) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pages
                (id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                parent_page_id = excluded.parent_page_id,
                title = excluded.title,
                sort_order = excluded.sort_order,
                archived = excluded.archived,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(page.id.to_string())
        .bind(page.workspace_id.to_string())
        .bind(page.parent_page_id.map(|id| id.to_string()))
        .bind(&page.title)
        .bind(page.sort_order)
        .bind(page.archived)
        .bind(page.created_at)
        .bind(page.updated_at)
        .bind(page.crdt_doc_id.to_string())
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn get(&self, id: &Id) -> Result<Page> {
        let row = sqlx::query(
            "SELECT id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id FROM pages WHERE id = ?;",
        )
        .bind(id.to_string())
        .fetch_optional(self.store.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| Error::not_found(format!("page {id} not found")))?;
        row_to_page(&row)
    }

    pub async fn by_workspace(&self, workspace_id: &Id) -> Result<Vec<Page>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id FROM pages WHERE workspace_id = ? ORDER BY sort_order;",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_page).collect()
    }

    pub async fn children(&self, parent_page_id: &Id) -> Result<Vec<Page>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id FROM pages WHERE parent_page_id = ? ORDER BY sort_order;",
        )
        .bind(parent_page_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_page).collect()
    }

    pub async fn roots(&self, workspace_id: &Id) -> Result<Vec<Page>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id FROM pages WHERE workspace_id = ? AND parent_page_id IS NULL ORDER BY sort_order;",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_page).collect()
    }

    pub async fn search_by_title(&self, workspace_id: &Id, prefix: &str) -> Result<Vec<Page>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query(
            "SELECT id, workspace_id, parent_page_id, title, sort_order, archived, created_at, updated_at, crdt_doc_id FROM pages WHERE workspace_id = ? AND title LIKE ? ESCAPE '\\' ORDER BY title;",
        )
        .bind(workspace_id.to_string())
        .bind(pattern)
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_page).collect()
    }

    pub async fn remove(&self, id: &Id) -> Result<()> {
        let result = sqlx::query("DELETE FROM pages WHERE id = ?;")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("page {id} not found")));
        }
        Ok(())
    }
}

fn row_to_page(row: &sqlx::sqlite::SqliteRow) -> Result<Page> {
    let id: String = row.get("id");
    let workspace_id: String = row.get("workspace_id");
    let parent_page_id: Option<String> = row.get("parent_page_id");
    let crdt_doc_id: String = row.get("crdt_doc_id");
    Ok(Page {
        id: id.parse()?,
        workspace_id: workspace_id.parse()?,
        parent_page_id: parent_page_id.map(|s| s.parse()).transpose()?,
        title: row.get("title"),
        sort_order: row.get("sort_order"),
        archived: row.get("archived"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        crdt_doc_id: crdt_doc_id.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page(workspace_id: Id, parent_page_id: Option<Id>, title: &str) -> Page {
        Page {
            id: Id::new(),
            workspace_id,
            parent_page_id,
            title: title.into(),
            sort_order: 0,
            archived: false,
            created_at: zinc_core::now_ms(),
            updated_at: zinc_core::now_ms(),
            crdt_doc_id: Id::new(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = PageRepository::new(store);
        let page = sample_page(Id::new(), None, "Inbox");
        repo.save(&page).await.unwrap();
        assert_eq!(repo.get(&page.id).await.unwrap(), page);
    }

    #[tokio::test]
    async fn roots_excludes_children() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = PageRepository::new(store);
        let workspace_id = Id::new();
        let root = sample_page(workspace_id, None, "Root");
        repo.save(&root).await.unwrap();
        let child = sample_page(workspace_id, Some(root.id), "Child");
        repo.save(&child).await.unwrap();

        let roots = repo.roots(&workspace_id).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        let children = repo.children(&root.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }

    #[tokio::test]
    async fn search_by_title_is_prefix_only() {
        let store = Store::open_in_memory().await.unwrap();
        let repo = PageRepository::new(store);
        let workspace_id = Id::new();
        repo.save(&sample_page(workspace_id, None, "Project Plan")).await.unwrap();
        repo.save(&sample_page(workspace_id, None, "Project Notes")).await.unwrap();
        repo.save(&sample_page(workspace_id, None, "Groceries")).await.unwrap();

        let found = repo.search_by_title(&workspace_id, "Project").await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
