//! `list-tree` — dump the workspace/page forest as indented text or JSON,
//! grounded in `examples/original_source/src/ui/cli/list_tree.cpp`'s
//! `format_notebook_page_tree`/`format_notebook_page_tree_json`. The `path`
//! cycle guard in the original is carried over unchanged: a malformed
//! `parent_page_id` chain (which should be impossible under spec.md §3's
//! referential-integrity invariant, but migrations don't enforce
//! acyclicity) must not hang the CLI.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use zinc_core::error::Result;
use zinc_core::ids::Id;
use zinc_storage::models::{Page, Workspace};
use zinc_storage::{PageRepository, Store, WorkspaceRepository};

fn children_by_parent(pages: &[Page]) -> HashMap<Option<Id>, Vec<&Page>> {
    let mut map: HashMap<Option<Id>, Vec<&Page>> = HashMap::new();
    for page in pages {
        map.entry(page.parent_page_id).or_default().push(page);
    }
    map
}

fn render_text_subtree(
    out: &mut Vec<String>,
    children: &HashMap<Option<Id>, Vec<&Page>>,
    parent: Option<Id>,
    depth: usize,
    include_ids: bool,
    path: &mut HashSet<Id>,
) {
    for child in children.get(&parent).into_iter().flatten() {
        let indent = "  ".repeat(depth);
        let suffix = if include_ids {
            format!(" ({})", child.id)
        } else {
            String::new()
        };
        out.push(format!("{indent}- {}{suffix}", child.title));
        if path.contains(&child.id) {
            continue;
        }
        path.insert(child.id);
        render_text_subtree(out, children, Some(child.id), depth + 1, include_ids, path);
        path.remove(&child.id);
    }
}

fn render_json_subtree(
    children: &HashMap<Option<Id>, Vec<&Page>>,
    parent: Option<Id>,
    include_ids: bool,
    path: &mut HashSet<Id>,
) -> serde_json::Value {
    let mut out = Vec::new();
    for child in children.get(&parent).into_iter().flatten() {
        let mut node = json!({ "title": child.title, "children": [] });
        if include_ids {
            node["pageId"] = json!(child.id.to_string());
        }
        if !path.contains(&child.id) {
            path.insert(child.id);
            node["children"] =
                render_json_subtree(children, Some(child.id), include_ids, path);
            path.remove(&child.id);
        }
        out.push(node);
    }
    serde_json::Value::Array(out)
}

async fn pages_for(store: &Store, workspace: &Workspace) -> Result<Vec<Page>> {
    PageRepository::new(store.clone())
        .by_workspace(&workspace.id)
        .await
}

pub async fn list(
    store: &Store,
    workspace: Option<String>,
    json_output: bool,
    include_ids: bool,
) -> Result<String> {
    let workspaces_repo = WorkspaceRepository::new(store.clone());
    let workspaces = if let Some(workspace) = workspace {
        let id: Id = workspace.parse()?;
        vec![workspaces_repo.get_workspace(&id).await?]
    } else {
        workspaces_repo.list_workspaces().await?
    };

    if json_output {
        let mut workspaces_json = Vec::new();
        for workspace in &workspaces {
            let pages = pages_for(store, workspace).await?;
            let children = children_by_parent(&pages);
            let mut path = HashSet::new();
            let mut node = json!({ "name": workspace.name });
            if include_ids {
                node["workspaceId"] = json!(workspace.id.to_string());
            }
            node["pages"] = render_json_subtree(&children, None, include_ids, &mut path);
            workspaces_json.push(node);
        }
        let root = json!({ "workspaces": workspaces_json });
        return Ok(serde_json::to_string_pretty(&root)?);
    }

    let mut out = Vec::new();
    for workspace in &workspaces {
        let suffix = if include_ids {
            format!(" ({})", workspace.id)
        } else {
            String::new()
        };
        out.push(format!("{}{suffix}", workspace.name));
        let pages = pages_for(store, workspace).await?;
        let children = children_by_parent(&pages);
        let mut path = HashSet::new();
        render_text_subtree(&mut out, &children, None, 1, include_ids, &mut path);
    }
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_core::ids::now_ms;

    fn page(workspace_id: Id, parent: Option<Id>, title: &str) -> Page {
        Page {
            id: Id::new(),
            workspace_id,
            parent_page_id: parent,
            title: title.into(),
            sort_order: 0,
            archived: false,
            created_at: now_ms(),
            updated_at: now_ms(),
            crdt_doc_id: Id::new(),
        }
    }

    #[test]
    fn cycle_guard_does_not_infinite_loop() {
        let workspace_id = Id::new();
        let a = page(workspace_id, None, "A");
        let mut b = page(workspace_id, Some(a.id), "B");
        // Force an (invalid) cycle: A's parent points back to B.
        let mut a = a;
        a.parent_page_id = Some(b.id);
        b.parent_page_id = Some(a.id);
        let pages = vec![a.clone(), b.clone()];
        let children = children_by_parent(&pages);
        let mut out = Vec::new();
        let mut path = HashSet::new();
        render_text_subtree(&mut out, &children, None, 0, false, &mut path);
        // Neither root by definition (both have a parent); nothing renders
        // and, crucially, this call returns instead of recursing forever.
        assert!(out.is_empty());
    }
}
