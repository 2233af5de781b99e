//! Hand-rolled up/down migration engine (spec.md §4.1).
//!
//! Schema versions are strictly increasing integers tracked in
//! `schema_migrations`. `migrate()` applies every pending migration,
//! `migrate_to`/`rollback_to` move in either direction, and the migration
//! set itself is a fixed, append-only `const` list — there is no API to
//! edit an already-applied migration.

use sqlx::Row;

use zinc_core::error::{Error, Result};

use crate::store::{map_sqlx_error, Store};

/// One schema migration: a version, a name, and up/down SQL scripts.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

/// All migrations, in ascending version order. Grounded directly in
/// `examples/original_source/src/storage/migrations.hpp`, with one
/// deliberate deviation: `crdt_changes.synced_to` is not a JSON blob
/// scanned with `NOT LIKE` (see DESIGN.md's Open Questions ledger) — it is
/// a proper join table, `change_synced_to`.
pub const ALL_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        up_sql: r#"
            CREATE TABLE workspaces (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                key_salt BLOB,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE pages (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                parent_page_id TEXT REFERENCES pages(id) ON DELETE SET NULL,
                title TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                crdt_doc_id TEXT NOT NULL
            );
            CREATE INDEX idx_pages_workspace ON pages(workspace_id);
            CREATE INDEX idx_pages_parent ON pages(parent_page_id);

            CREATE TABLE blocks (
                id TEXT PRIMARY KEY,
                page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
                parent_block_id TEXT REFERENCES blocks(id) ON DELETE SET NULL,
                block_type TEXT NOT NULL,
                content_markdown TEXT NOT NULL DEFAULT '',
                properties_json TEXT NOT NULL DEFAULT '{}',
                sort_order TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX idx_blocks_page ON blocks(page_id);
            CREATE INDEX idx_blocks_parent ON blocks(parent_block_id);

            CREATE TABLE devices (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                public_key BLOB NOT NULL,
                paired_at INTEGER NOT NULL,
                last_seen INTEGER NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_devices_workspace ON devices(workspace_id);
        "#,
        down_sql: r#"
            DROP TABLE IF EXISTS devices;
            DROP TABLE IF EXISTS blocks;
            DROP TABLE IF EXISTS pages;
            DROP TABLE IF EXISTS workspaces;
        "#,
    },
    Migration {
        version: 2,
        name: "fts5_search",
        up_sql: r#"
            CREATE VIRTUAL TABLE block_fts USING fts5(
                block_id UNINDEXED,
                page_id UNINDEXED,
                page_title,
                content,
                tokenize='porter unicode61 remove_diacritics 2'
            );

            CREATE TRIGGER blocks_ai AFTER INSERT ON blocks BEGIN
                INSERT INTO block_fts(block_id, page_id, page_title, content)
                VALUES (
                    new.id,
                    new.page_id,
                    (SELECT title FROM pages WHERE id = new.page_id),
                    new.content_markdown
                );
            END;

            CREATE TRIGGER blocks_ad AFTER DELETE ON blocks BEGIN
                DELETE FROM block_fts WHERE block_id = old.id;
            END;

            CREATE TRIGGER blocks_au AFTER UPDATE ON blocks BEGIN
                DELETE FROM block_fts WHERE block_id = old.id;
                INSERT INTO block_fts(block_id, page_id, page_title, content)
                VALUES (
                    new.id,
                    new.page_id,
                    (SELECT title FROM pages WHERE id = new.page_id),
                    new.content_markdown
                );
            END;

            CREATE TRIGGER pages_au_title AFTER UPDATE OF title ON pages BEGIN
                UPDATE block_fts SET page_title = new.title WHERE page_id = new.id;
            END;
        "#,
        down_sql: r#"
            DROP TRIGGER IF EXISTS pages_au_title;
            DROP TRIGGER IF EXISTS blocks_au;
            DROP TRIGGER IF EXISTS blocks_ad;
            DROP TRIGGER IF EXISTS blocks_ai;
            DROP TABLE IF EXISTS block_fts;
        "#,
    },
    Migration {
        version: 3,
        name: "block_links",
        up_sql: r#"
            CREATE TABLE block_links (
                source_block_id TEXT NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
                target_page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
                target_block_id TEXT REFERENCES blocks(id) ON DELETE SET NULL,
                PRIMARY KEY (source_block_id, target_page_id, target_block_id)
            );
            CREATE INDEX idx_block_links_target ON block_links(target_page_id);
            CREATE INDEX idx_block_links_target_block ON block_links(target_block_id);
        "#,
        down_sql: r#"
            DROP TABLE IF EXISTS block_links;
        "#,
    },
    Migration {
        version: 4,
        name: "crdt_storage",
        up_sql: r#"
            CREATE TABLE crdt_documents (
                doc_id TEXT PRIMARY KEY,
                page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
                snapshot BLOB NOT NULL,
                vector_clock TEXT NOT NULL DEFAULT '{}',
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX idx_crdt_documents_page ON crdt_documents(page_id);

            CREATE TABLE crdt_changes (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL REFERENCES crdt_documents(doc_id) ON DELETE CASCADE,
                change_bytes BLOB NOT NULL,
                actor_id TEXT NOT NULL,
                seq_num INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(doc_id, actor_id, seq_num)
            );
            CREATE INDEX idx_crdt_changes_doc ON crdt_changes(doc_id);

            -- Which devices have acknowledged a change row. A join table
            -- rather than a JSON blob scanned with NOT LIKE, so an
            -- unsynced-changes query is a plain anti-join.
            CREATE TABLE change_synced_to (
                change_row_id INTEGER NOT NULL REFERENCES crdt_changes(row_id) ON DELETE CASCADE,
                device_id TEXT NOT NULL,
                PRIMARY KEY (change_row_id, device_id)
            );
        "#,
        down_sql: r#"
            DROP TABLE IF EXISTS change_synced_to;
            DROP TABLE IF EXISTS crdt_changes;
            DROP TABLE IF EXISTS crdt_documents;
        "#,
    },
    Migration {
        version: 5,
        name: "attachments",
        up_sql: r#"
            CREATE TABLE attachments (
                id TEXT PRIMARY KEY,
                block_id TEXT REFERENCES blocks(id) ON DELETE SET NULL,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                hash_sha256 TEXT NOT NULL,
                external_path TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX idx_attachments_block ON attachments(block_id);
            CREATE INDEX idx_attachments_hash ON attachments(hash_sha256);
        "#,
        down_sql: r#"
            DROP TABLE IF EXISTS attachments;
        "#,
    },
];

/// Drives a [`Store`] through the migration list above.
pub struct MigrationRunner {
    store: Store,
}

impl MigrationRunner {
    pub fn new(store: Store) -> Self {
        MigrationRunner { store }
    }

    pub fn latest_version() -> i64 {
        ALL_MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn current_version(&self) -> Result<i64> {
        self.ensure_migrations_table().await?;
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_migrations;")
            .fetch_one(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.get::<i64, _>("v"))
    }

    /// Apply every migration newer than the current version, up to and
    /// including the latest available one.
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_to(Self::latest_version()).await
    }

    /// Apply every migration in `(current, target_version]`, one
    /// transaction per migration (spec.md §4.1).
    pub async fn migrate_to(&self, target_version: i64) -> Result<()> {
        let current = self.current_version().await?;
        if current >= target_version {
            return Ok(());
        }
        for migration in ALL_MIGRATIONS {
            if migration.version > current && migration.version <= target_version {
                tracing::info!(version = migration.version, name = migration.name, "applying migration");
                self.run_migration(migration).await?;
            }
        }
        Ok(())
    }

    /// Roll back every migration in `(target_version, current]`, in
    /// reverse order, one transaction per migration.
    pub async fn rollback_to(&self, target_version: i64) -> Result<()> {
        let current = self.current_version().await?;
        if current <= target_version {
            return Ok(());
        }
        for migration in ALL_MIGRATIONS.iter().rev() {
            if migration.version <= current && migration.version > target_version {
                tracing::info!(version = migration.version, name = migration.name, "rolling back migration");
                self.run_rollback(migration).await?;
            }
        }
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        let current = self.current_version().await?;
        if current == 0 {
            return Ok(());
        }
        self.rollback_to(current - 1).await
    }

    async fn run_migration(&self, migration: &Migration) -> Result<()> {
        let mut tx = self.store.pool().begin().await.map_err(map_sqlx_error)?;
        sqlx::raw_sql(migration.up_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::io_error(format!(
                    "migration {} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?);")
            .bind(migration.version)
            .bind(migration.name)
            .bind(zinc_core::now_ms())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn run_rollback(&self, migration: &Migration) -> Result<()> {
        if migration.down_sql.trim().is_empty() {
            return Err(Error::io_error(format!(
                "migration {} has no rollback SQL",
                migration.version
            )));
        }
        let mut tx = self.store.pool().begin().await.map_err(map_sqlx_error)?;
        sqlx::raw_sql(migration.down_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::io_error(format!(
                    "rollback of migration {} failed: {e}",
                    migration.version
                ))
            })?;
        sqlx::query("DELETE FROM schema_migrations WHERE version = ?;")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_store_lands_at_latest_version() {
        let store = Store::open_in_memory().await.unwrap();
        let runner = MigrationRunner::new(store);
        assert_eq!(runner.current_version().await.unwrap(), MigrationRunner::latest_version());
    }

    #[tokio::test]
    async fn rollback_to_v1_leaves_only_v1_tables() {
        let store = Store::open_in_memory().await.unwrap();
        let runner = MigrationRunner::new(store.clone());
        runner.rollback_to(1).await.unwrap();
        assert_eq!(runner.current_version().await.unwrap(), 1);

        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'crdt_documents';",
        )
        .fetch_optional(store.pool())
        .await
        .unwrap();
        assert!(row.is_none());

        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'workspaces';",
        )
        .fetch_optional(store.pool())
        .await
        .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn migrate_to_is_idempotent_past_target() {
        let store = Store::open_in_memory().await.unwrap();
        let runner = MigrationRunner::new(store);
        runner.migrate_to(2).await.unwrap();
        // current version is already 5 (Store::open runs migrate() on construction).
        assert_eq!(runner.current_version().await.unwrap(), MigrationRunner::latest_version());
    }
}
