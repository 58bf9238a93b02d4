// src/sync/state.rs
// Atomic load/save of the persisted `SyncState` singleton. Writes go to a
// sibling temp file and are renamed into place so a crash mid-write never
// leaves a truncated or partially-written state file behind.

use std::path::Path;

use crate::model::SyncState;

use super::error::SyncResult;

pub async fn load(path: &Path) -> SyncResult<SyncState> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn save(path: &Path, state: &SyncState) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let serialized = serde_json::to_string_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, serialized).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_default_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&dir.path().join("sync_state.json")).await.unwrap();
        assert_eq!(state.total_issues_indexed, 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        let mut state = SyncState::default();
        state.total_issues_indexed = 42;
        state.projects_synced.push("PROJ".to_string());
        save(&path, &state).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.total_issues_indexed, 42);
        assert_eq!(loaded.projects_synced, vec!["PROJ".to_string()]);
    }

    #[tokio::test]
    async fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        save(&path, &SyncState::default()).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());
    }
}
