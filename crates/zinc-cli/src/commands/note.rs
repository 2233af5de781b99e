//! `note` — render a page's blocks to markdown or HTML, grounded in
//! `examples/original_source/src/ui/cli/note.cpp`'s `render_note`. The
//! original reads a single `contentMarkdown` column off the page row;
//! here a page's content lives in its ordered `Block`s, so this renders
//! each block's markdown form and joins them with blank lines.

use zinc_core::error::Result;
use zinc_core::ids::Id;
use zinc_storage::models::BlockContent;
use zinc_storage::{BlockRepository, PageRepository, Store};

fn block_to_markdown(content: &BlockContent) -> String {
    match content {
        BlockContent::Paragraph { text } => text.clone(),
        BlockContent::Heading { text, level } => format!("{} {text}", "#".repeat(*level as usize)),
        BlockContent::Todo { text, checked } => {
            format!("- [{}] {text}", if *checked { "x" } else { " " })
        }
        BlockContent::Code { text, language } => {
            format!("```{}\n{text}\n```", language.as_deref().unwrap_or(""))
        }
        BlockContent::Quote { text } => text
            .lines()
            .map(|line| format!("> {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
        BlockContent::Divider => "---".to_string(),
        BlockContent::Toggle { text, expanded } => {
            format!(
                "<details{}><summary>{text}</summary></details>",
                if *expanded { " open" } else { "" }
            )
        }
    }
}

async fn page_markdown(store: &Store, page_id: &Id) -> Result<String> {
    PageRepository::new(store.clone()).get(page_id).await?;
    let blocks = BlockRepository::new(store.clone()).by_page(page_id).await?;
    let mut out = blocks
        .iter()
        .map(|block| block_to_markdown(&block.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

pub async fn render(store: &Store, id: String, html: bool) -> Result<String> {
    let id: Id = id.parse()?;
    let markdown = page_markdown(store, &id).await?;
    if !html {
        return Ok(markdown);
    }

    let parser = pulldown_cmark::Parser::new(&markdown);
    let mut out = String::new();
    pulldown_cmark::html::push_html(&mut out, parser);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}
