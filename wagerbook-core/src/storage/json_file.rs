use crate::error::{Result, WagerbookError};
use crate::storage::{decode, encode, Snapshot, SnapshotStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot as a JSON file, written to a temp file beside the
/// target and renamed over it.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(body)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| WagerbookError::persistence(format!("Failed to replace snapshot: {}", e)))?;
    Ok(())
}

#[async_trait]
impl<T> SnapshotStore<T> for JsonFileSnapshotStore
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Option<Snapshot<T>>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let body = tokio::fs::read_to_string(&self.path).await?;
        decode(&body).map(Some)
    }

    async fn save(&self, state: &T) -> Result<()> {
        let (_, body) = encode(state)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, body.as_bytes()))
            .await
            .map_err(|e| WagerbookError::persistence(format!("Snapshot writer panicked: {}", e)))??;

        tracing::debug!("Wrote snapshot to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        label: String,
    }

    #[tokio::test]
    async fn test_round_trip_and_no_leftover_temp_files() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(temp_dir.path().join("state.json"));

        store.save(&Doc { label: "one".into() }).await.unwrap();
        store.save(&Doc { label: "two".into() }).await.unwrap();

        let loaded = SnapshotStore::<Doc>::load(&store).await.unwrap().unwrap();
        assert_eq!(loaded.state.label, "two");

        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(temp_dir.path().join("absent.json"));
        let loaded = SnapshotStore::<Doc>::load(&store).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"version":99,"saved_at":"2024-01-01T00:00:00Z","state":{"label":"x"}}"#,
        )
        .unwrap();

        let store = JsonFileSnapshotStore::new(path);
        let loaded = SnapshotStore::<Doc>::load(&store).await;
        assert!(loaded.is_err());
    }
}
