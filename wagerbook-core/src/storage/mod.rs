pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileSnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

/// A complete, self-describing copy of persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: T,
}

/// Whole-state persistence. `save` either replaces the previous snapshot
/// entirely or leaves it untouched.
#[async_trait]
pub trait SnapshotStore<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Option<Snapshot<T>>>;

    async fn save(&self, state: &T) -> Result<()>;
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<(DateTime<Utc>, String)> {
    let saved_at = Utc::now();
    let body = serde_json::to_string(&Snapshot {
        version: SNAPSHOT_VERSION,
        saved_at,
        state,
    })?;
    Ok((saved_at, body))
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<Snapshot<T>> {
    let snapshot: Snapshot<T> = serde_json::from_str(body)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(crate::error::WagerbookError::persistence(format!(
            "Unsupported snapshot version {}",
            snapshot.version
        )));
    }
    Ok(snapshot)
}
