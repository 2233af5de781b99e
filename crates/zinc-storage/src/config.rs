//! Directory and environment-variable resolution for where zinc keeps its
//! database and attachment blobs.

use std::path::PathBuf;

/// Default data directory: `<platform config dir>/zinc`.
fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zinc")
}

/// Path to the SQLite database file. Honors `ZINC_DB_PATH` (spec.md §6).
pub fn db_path() -> PathBuf {
    if let Ok(val) = std::env::var("ZINC_DB_PATH") {
        return PathBuf::from(val);
    }
    default_root().join("zinc.db")
}

/// Directory for externally-stored attachment blobs. Honors
/// `ZINC_ATTACHMENTS_DIR`.
pub fn attachments_dir() -> PathBuf {
    if let Ok(val) = std::env::var("ZINC_ATTACHMENTS_DIR") {
        return PathBuf::from(val);
    }
    default_root().join("attachments")
}
