//! `create-workspace` / `delete-workspace`, grounded in
//! `examples/original_source/src/ui/cli/mutations.cpp`'s `create_notebook`/
//! `delete_notebook` (workspace == notebook).

use zinc_core::error::{Error, Result};
use zinc_core::ids::now_ms;
use zinc_storage::{PageRepository, Store, WorkspaceRepository};
use zinc_storage::models::Workspace;

pub async fn create(store: &Store, name: String) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::bad_input("workspace name is required"));
    }

    let now = now_ms();
    let workspace = Workspace {
        id: zinc_core::ids::Id::new(),
        name: name.to_string(),
        key_salt: None,
        created_at: now,
        updated_at: now,
    };
    WorkspaceRepository::new(store.clone())
        .save_workspace(&workspace)
        .await?;
    Ok(workspace.id.to_string())
}

pub async fn delete(store: &Store, id: String, delete_pages: bool) -> Result<String> {
    let id: zinc_core::ids::Id = id.parse()?;
    let workspaces = WorkspaceRepository::new(store.clone());
    // Ensure it exists so callers get NotFound rather than a silent no-op.
    workspaces.get_workspace(&id).await?;

    let pages = PageRepository::new(store.clone()).by_workspace(&id).await?;
    if !pages.is_empty() && !delete_pages {
        return Err(Error::conflict(format!(
            "workspace {id} has {} page(s); pass --delete-pages to remove them",
            pages.len()
        )));
    }

    // Foreign keys cascade pages -> blocks -> crdt_documents and
    // workspaces -> devices (spec.md §3 invariants); --delete-pages is a
    // confirmation gate, not a separate code path.
    workspaces.remove_workspace(&id).await?;
    Ok(String::new())
}
