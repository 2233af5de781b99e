//! End-to-end coverage of the `zinc` CLI commands against an in-memory
//! store, mirroring `zinc-storage`'s own `#[tokio::test]` repository tests.

use zinc_cli::commands;
use zinc_storage::Store;

#[tokio::test]
async fn workspace_and_page_lifecycle_round_trips() {
    let store = Store::open_in_memory().await.unwrap();

    let workspace_id = commands::workspace::create(&store, "Personal".into())
        .await
        .unwrap();

    let root_id = commands::page::create(&store, "Inbox".into(), Some(workspace_id.clone()), None)
        .await
        .unwrap();
    let child_id = commands::page::create(
        &store,
        "Subpage".into(),
        None,
        Some(root_id.clone()),
    )
    .await
    .unwrap();

    let text_tree = commands::tree::list(&store, Some(workspace_id.clone()), false, false)
        .await
        .unwrap();
    assert!(text_tree.contains("Personal"));
    assert!(text_tree.contains("Inbox"));
    assert!(text_tree.contains("Subpage"));

    let json_tree = commands::tree::list(&store, Some(workspace_id.clone()), true, true)
        .await
        .unwrap();
    assert!(json_tree.contains(&root_id));
    assert!(json_tree.contains(&child_id));

    commands::page::delete(&store, child_id).await.unwrap();
    commands::page::delete(&store, root_id).await.unwrap();
    commands::workspace::delete(&store, workspace_id, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn create_page_rejects_both_parent_and_workspace() {
    let store = Store::open_in_memory().await.unwrap();
    let workspace_id = commands::workspace::create(&store, "WS".into()).await.unwrap();
    let page_id = commands::page::create(&store, "Root".into(), Some(workspace_id.clone()), None)
        .await
        .unwrap();

    let err = commands::page::create(
        &store,
        "Bad".into(),
        Some(workspace_id),
        Some(page_id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, zinc_core::error::ErrorKind::BadInput);
}

#[tokio::test]
async fn delete_workspace_with_pages_requires_confirmation() {
    let store = Store::open_in_memory().await.unwrap();
    let workspace_id = commands::workspace::create(&store, "WS".into()).await.unwrap();
    commands::page::create(&store, "Root".into(), Some(workspace_id.clone()), None)
        .await
        .unwrap();

    let err = commands::workspace::delete(&store, workspace_id.clone(), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind, zinc_core::error::ErrorKind::Conflict);

    commands::workspace::delete(&store, workspace_id, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn note_renders_blocks_to_markdown_and_html() {
    use zinc_core::ids::{now_ms, Id};
    use zinc_storage::models::{Block, BlockContent};
    use zinc_storage::BlockRepository;

    let store = Store::open_in_memory().await.unwrap();
    let workspace_id = commands::workspace::create(&store, "WS".into()).await.unwrap();
    let page_id = commands::page::create(&store, "Note".into(), Some(workspace_id), None)
        .await
        .unwrap();
    let page_id: Id = page_id.parse().unwrap();

    let now = now_ms();
    BlockRepository::new(store.clone())
        .save_all(&[
            Block {
                id: Id::new(),
                page_id,
                parent_block_id: None,
                content: BlockContent::Heading {
                    text: "Title".into(),
                    level: 1,
                },
                sort_key: "a0".into(),
                created_at: now,
                updated_at: now,
            },
            Block {
                id: Id::new(),
                page_id,
                parent_block_id: None,
                content: BlockContent::Paragraph {
                    text: "hello world".into(),
                },
                sort_key: "a1".into(),
                created_at: now,
                updated_at: now,
            },
        ])
        .await
        .unwrap();

    let markdown = commands::note::render(&store, page_id.to_string(), false)
        .await
        .unwrap();
    assert!(markdown.contains("# Title"));
    assert!(markdown.contains("hello world"));

    let html = commands::note::render(&store, page_id.to_string(), true)
        .await
        .unwrap();
    assert!(html.contains("<h1>Title</h1>"));
    assert!(html.contains("<p>hello world</p>"));
}
