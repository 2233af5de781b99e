//! `create-page` / `delete-page`, grounded in
//! `examples/original_source/src/ui/cli/mutations.cpp`'s `create_page`/
//! `delete_page` (page == note). Every page owns a [`CrdtDocument`]
//! (spec.md §3: "CrdtDocuments live with their Page"), so creating one
//! here also creates its (empty) document row.

use zinc_core::error::{Error, Result};
use zinc_core::ids::{now_ms, Id};
use zinc_storage::models::{CrdtDocument, Page};
use zinc_storage::{CrdtRepository, PageRepository, Store, WorkspaceRepository};

pub async fn create(
    store: &Store,
    title: String,
    workspace: Option<String>,
    parent: Option<String>,
) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::bad_input("page title is required"));
    }
    if workspace.is_some() && parent.is_some() {
        return Err(Error::bad_input(
            "use either --parent or --workspace, not both",
        ));
    }

    let pages = PageRepository::new(store.clone());
    let (workspace_id, parent_page_id) = if let Some(parent) = parent {
        let parent_id: Id = parent.parse()?;
        let parent_page = pages.get(&parent_id).await?;
        (parent_page.workspace_id, Some(parent_page.id))
    } else if let Some(workspace) = workspace {
        let workspace_id: Id = workspace.parse()?;
        WorkspaceRepository::new(store.clone())
            .get_workspace(&workspace_id)
            .await?;
        (workspace_id, None)
    } else {
        return Err(Error::bad_input("one of --workspace or --parent is required"));
    };

    let now = now_ms();
    let doc_id = Id::new();
    let page = Page {
        id: Id::new(),
        workspace_id,
        parent_page_id,
        title: title.to_string(),
        sort_order: now,
        archived: false,
        created_at: now,
        updated_at: now,
        crdt_doc_id: doc_id,
    };
    pages.save(&page).await?;

    CrdtRepository::new(store.clone())
        .save_document(&CrdtDocument {
            doc_id,
            page_id: page.id,
            snapshot: Vec::new(),
            vector_clock: Default::default(),
            updated_at: now,
        })
        .await?;

    Ok(page.id.to_string())
}

pub async fn delete(store: &Store, id: String) -> Result<String> {
    let id: Id = id.parse()?;
    PageRepository::new(store.clone()).remove(&id).await?;
    Ok(String::new())
}
