//! Workspace and paired-device bookkeeping.
//!
//! Grounded in `examples/original_source/src/storage/workspace_repository.hpp`.

use sqlx::Row;

use zinc_core::error::{Error, Result};
use zinc_core::ids::{Id, Timestamp};

use crate::models::{Device, Workspace};
use crate::store::{map_sqlx_error, Store};

#[derive(Clone)]
pub struct WorkspaceRepository {
    store: Store,
}

impl WorkspaceRepository {
    pub fn new(store: Store) -> Self {
        WorkspaceRepository { store }
    }

    pub async fn save_workspace(&self, workspace: &Workspace) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspaces (id, name, key_salt, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                key_salt = excluded.key_salt,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(workspace.id.to_string())
        .bind(&workspace.name)
        .bind(&workspace.key_salt)
        .bind(workspace.created_at)
        .bind(workspace.updated_at)
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn get_workspace(&self, id: &Id) -> Result<Workspace> {
        let row = sqlx::query(
            "SELECT id, name, key_salt, created_at, updated_at FROM workspaces WHERE id = ?;",
        )
        .bind(id.to_string())
        .fetch_optional(self.store.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| Error::not_found(format!("workspace {id} not found")))?;
        row_to_workspace(&row)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let rows =
            sqlx::query("SELECT id, name, key_salt, created_at, updated_at FROM workspaces ORDER BY name;")
                .fetch_all(self.store.pool())
                .await
                .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_workspace).collect()
    }

    pub async fn remove_workspace(&self, id: &Id) -> Result<()> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ?;")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("workspace {id} not found")));
        }
        Ok(())
    }

    pub async fn save_device(&self, device: &Device) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (id, workspace_id, name, public_key, paired_at, last_seen, revoked)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                public_key = excluded.public_key,
                last_seen = excluded.last_seen,
                revoked = excluded.revoked;
            "#,
        )
        .bind(device.id.to_string())
        .bind(device.workspace_id.to_string())
        .bind(&device.name)
        .bind(&device.public_key)
        .bind(device.paired_at)
        .bind(device.last_seen)
        .bind(device.revoked)
        .execute(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    pub async fn get_device(&self, id: &Id) -> Result<Device> {
        let row = sqlx::query(
            "SELECT id, workspace_id, name, public_key, paired_at, last_seen, revoked FROM devices WHERE id = ?;",
        )
        .bind(id.to_string())
        .fetch_optional(self.store.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| Error::not_found(format!("device {id} not found")))?;
        row_to_device(&row)
    }

    pub async fn devices_for_workspace(&self, workspace_id: &Id) -> Result<Vec<Device>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, name, public_key, paired_at, last_seen, revoked FROM devices WHERE workspace_id = ? ORDER BY name;",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.store.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_device).collect()
    }

    pub async fn active_devices(&self, workspace_id: &Id) -> Result<Vec<Device>> {
        Ok(self
            .devices_for_workspace(workspace_id)
            .await?
            .into_iter()
            .filter(|d| !d.revoked)
            .collect())
    }

    pub async fn revoke_device(&self, id: &Id) -> Result<()> {
        let result = sqlx::query("UPDATE devices SET revoked = 1 WHERE id = ?;")
            .bind(id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("device {id} not found")));
        }
        Ok(())
    }

    pub async fn touch_last_seen(&self, id: &Id, at: Timestamp) -> Result<()> {
        let result = sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?;")
            .bind(at)
            .bind(id.to_string())
            .execute(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("device {id} not found")));
        }
        Ok(())
    }
}

fn row_to_workspace(row: &sqlx::sqlite::SqliteRow) -> Result<Workspace> {
    let id: String = row.get("id");
    Ok(Workspace {
        id: id.parse()?,
        name: row.get("name"),
        key_salt: row.get("key_salt"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device> {
    let id: String = row.get("id");
    let workspace_id: String = row.get("workspace_id");
    Ok(Device {
        id: id.parse()?,
        workspace_id: workspace_id.parse()?,
        name: row.get("name"),
        public_key: row.get("public_key"),
        paired_at: row.get("paired_at"),
        last_seen: row.get("last_seen"),
        revoked: row.get("revoked"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> WorkspaceRepository {
        let store = Store::open_in_memory().await.unwrap();
        WorkspaceRepository::new(store)
    }

    fn sample_workspace() -> Workspace {
        Workspace {
            id: Id::new(),
            name: "personal notes".into(),
            key_salt: Some(vec![1, 2, 3]),
            created_at: zinc_core::now_ms(),
            updated_at: zinc_core::now_ms(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let repo = repo().await;
        let ws = sample_workspace();
        repo.save_workspace(&ws).await.unwrap();
        let fetched = repo.get_workspace(&ws.id).await.unwrap();
        assert_eq!(fetched, ws);
    }

    #[tokio::test]
    async fn missing_workspace_is_not_found() {
        let repo = repo().await;
        let err = repo.get_workspace(&Id::new()).await.unwrap_err();
        assert_eq!(err.kind, zinc_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn revoked_device_is_excluded_from_active_list() {
        let repo = repo().await;
        let ws = sample_workspace();
        repo.save_workspace(&ws).await.unwrap();

        let device = Device {
            id: Id::new(),
            workspace_id: ws.id,
            name: "laptop".into(),
            public_key: vec![9; 32],
            paired_at: zinc_core::now_ms(),
            last_seen: zinc_core::now_ms(),
            revoked: false,
        };
        repo.save_device(&device).await.unwrap();
        assert_eq!(repo.active_devices(&ws.id).await.unwrap().len(), 1);

        repo.revoke_device(&device.id).await.unwrap();
        assert_eq!(repo.active_devices(&ws.id).await.unwrap().len(), 0);
        assert_eq!(repo.devices_for_workspace(&ws.id).await.unwrap().len(), 1);
    }
}
