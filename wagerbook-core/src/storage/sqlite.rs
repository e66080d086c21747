use crate::error::{Result, WagerbookError};
use crate::storage::{decode, encode, Snapshot, SnapshotStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::sync::Mutex;

/// Snapshot kept as a single row, replaced inside a transaction.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WagerbookError::internal(format!("Failed to create directory: {}", e))
            })?;
        }

        Self::with_connection(Connection::open(db_path)?).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                version INTEGER NOT NULL,
                saved_at INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for SqliteSnapshotStore
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Option<Snapshot<T>>> {
        let conn = self.conn.lock().await;

        let body: Option<String> = conn
            .query_row("SELECT body FROM snapshots WHERE slot = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        body.map(|b| decode(&b)).transpose()
    }

    async fn save(&self, state: &T) -> Result<()> {
        let (saved_at, body) = encode(state)?;
        let conn = self.conn.lock().await;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshots (slot, version, saved_at, body)
             VALUES (1, ?1, ?2, ?3)",
            params![super::SNAPSHOT_VERSION, saved_at.timestamp_millis(), body],
        )?;
        tx.commit()?;

        tracing::debug!("Saved snapshot ({} bytes)", body.len());
        Ok(())
    }
}
