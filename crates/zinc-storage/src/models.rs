//! Row types shared by every repository.
//!
//! Grounded in `examples/original_source/src/core/{workspace,page,block_types}.hpp`
//! and `src/storage/crdt_repository.hpp`, translated from hand-written
//! structs into `serde`-derived ones since these round-trip through
//! `properties_json`/`vector_clock` JSON columns.

use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::{Id, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Id,
    pub name: String,
    pub key_salt: Option<Vec<u8>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
    pub public_key: Vec<u8>,
    pub paired_at: Timestamp,
    pub last_seen: Timestamp,
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: Id,
    pub workspace_id: Id,
    pub parent_page_id: Option<Id>,
    pub title: String,
    pub sort_order: i64,
    pub archived: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub crdt_doc_id: Id,
}

/// Tagged-variant block body. Every variant is reducible to plain text via
/// [`BlockContent::text`] and reconstructable from it via
/// [`BlockContent::with_text`] -- that pair is what lets the three-way
/// merge fallback operate on blocks without knowing their concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockContent {
    Paragraph { text: String },
    Heading { text: String, level: u8 },
    Todo { text: String, checked: bool },
    Code { text: String, language: Option<String> },
    Quote { text: String },
    Divider,
    Toggle { text: String, expanded: bool },
}

impl BlockContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            BlockContent::Paragraph { .. } => "paragraph",
            BlockContent::Heading { .. } => "heading",
            BlockContent::Todo { .. } => "todo",
            BlockContent::Code { .. } => "code",
            BlockContent::Quote { .. } => "quote",
            BlockContent::Divider => "divider",
            BlockContent::Toggle { .. } => "toggle",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            BlockContent::Paragraph { text }
            | BlockContent::Heading { text, .. }
            | BlockContent::Todo { text, .. }
            | BlockContent::Code { text, .. }
            | BlockContent::Quote { text }
            | BlockContent::Toggle { text, .. } => text,
            BlockContent::Divider => "",
        }
    }

    pub fn with_text(&self, new_text: impl Into<String>) -> Self {
        let new_text = new_text.into();
        match self {
            BlockContent::Paragraph { .. } => BlockContent::Paragraph { text: new_text },
            BlockContent::Heading { level, .. } => BlockContent::Heading {
                text: new_text,
                level: *level,
            },
            BlockContent::Todo { checked, .. } => BlockContent::Todo {
                text: new_text,
                checked: *checked,
            },
            BlockContent::Code { language, .. } => BlockContent::Code {
                text: new_text,
                language: language.clone(),
            },
            BlockContent::Quote { .. } => BlockContent::Quote { text: new_text },
            BlockContent::Divider => BlockContent::Divider,
            BlockContent::Toggle { expanded, .. } => BlockContent::Toggle {
                text: new_text,
                expanded: *expanded,
            },
        }
    }

    /// Validate invariants that the type system alone doesn't enforce
    /// (spec.md §9: heading levels are 1..=3).
    pub fn validate(&self) -> Result<()> {
        if let BlockContent::Heading { level, .. } = self {
            if !(1..=3).contains(level) {
                return Err(Error::bad_input(format!(
                    "heading level must be 1..=3, got {level}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Id,
    pub page_id: Id,
    pub parent_block_id: Option<Id>,
    pub content: BlockContent,
    /// Fractional-index string; orders siblings under the same parent.
    pub sort_key: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtDocument {
    pub doc_id: Id,
    pub page_id: Id,
    pub snapshot: Vec<u8>,
    pub vector_clock: std::collections::BTreeMap<String, i64>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtChange {
    pub row_id: i64,
    pub doc_id: Id,
    pub change_bytes: Vec<u8>,
    pub actor_id: Id,
    pub seq_num: i64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Id,
    pub block_id: Option<Id>,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub hash_sha256: String,
    pub external_path: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLink {
    pub source_block_id: Id,
    pub target_page_id: Id,
    pub target_block_id: Option<Id>,
}
