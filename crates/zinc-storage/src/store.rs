//! The process-wide SQLite handle.
//!
//! spec.md §5 calls for "a single writer behind a mutex; readers may
//! proceed in parallel if the store supports it." SQLite's own writer lock
//! already serializes writes, so WAL mode is enough to let readers run
//! concurrently with it; repository methods that need atomicity across
//! several statements open their own transaction with `pool().begin()`.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use zinc_core::error::{Error, Result};

use crate::migrations::MigrationRunner;

/// A handle to the on-disk (or in-memory) SQLite database backing one
/// process. Cheap to clone: internally an `Arc`-wrapped connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the database at `path` and run every
    /// pending migration.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io_error(format!("creating {parent:?}: {e}")))?;
            }
        }
        let url = format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"));
        Self::open_url(&url, true).await
    }

    /// Open a private in-memory database, useful for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_url("sqlite::memory:", false).await
    }

    async fn open_url(url: &str, file_backed: bool) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::io_error(format!("invalid database url {url:?}: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal);
        if file_backed {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if file_backed { 5 } else { 1 })
            .connect_with(options)
            .await
            .map_err(|e| Error::io_error(format!("opening database: {e}")))?;

        let store = Store { pool };
        MigrationRunner::new(store.clone()).migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a `sqlx::Error` onto the shared error taxonomy (spec.md §7).
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::RowNotFound => Error::not_found("row not found"),
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                Error::conflict(db_err.message().to_string())
            } else {
                Error::io_error(db_err.message().to_string())
            }
        }
        other => Error::io_error(other.to_string()),
    }
}
