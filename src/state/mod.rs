//! Durable debounce bookkeeping, stored as a small JSON document
//!
//! The file is the only state that survives a restart. Reads never fail:
//! a missing or unreadable file yields [`PersistedState::default`], which
//! makes the next observation look like a change. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! reader sees either the old document or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::traits::StateStore;

/// Everything the decision engine and publisher need across cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(alias = "lastHash")]
    pub last_published_fingerprint: String,
    #[serde(alias = "messageId")]
    pub last_message_id: Option<String>,
    pub pending_fingerprint: Option<String>,
    pub pending_count: u32,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl PersistedState {
    /// No change is waiting for confirmation
    pub fn is_stable(&self) -> bool {
        self.pending_count == 0
    }

    pub fn cleared_pending(mut self) -> Self {
        self.pending_fingerprint = None;
        self.pending_count = 0;
        self
    }
}

/// [`StateStore`] backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> PersistedState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return PersistedState::default();
            }
            Err(e) => {
                warn!("Could not read state file {}: {}", self.path.display(), e);
                return PersistedState::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(
                "State file {} is corrupt ({}), falling back to empty state",
                self.path.display(),
                e
            );
            PersistedState::default()
        })
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let payload = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &payload)).await??;
        Ok(())
    }
}

fn write_atomically(path: &Path, payload: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating state directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replacing state file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));

        assert_eq!(store.load().await, PersistedState::default());
    }

    #[tokio::test]
    async fn corrupt_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(JsonStateStore::new(path).load().await, PersistedState::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested/data/state.json"));
        let state = PersistedState {
            last_published_fingerprint: "abc".to_string(),
            last_message_id: Some("1234".to_string()),
            pending_fingerprint: Some("def".to_string()),
            pending_count: 1,
            last_change_at: Some(Utc.with_ymd_and_hms(2026, 1, 15, 16, 0, 0).unwrap()),
        };

        store.save(&state).await.unwrap();

        assert_eq!(store.load().await, state);
        let leftovers: Vec<_> = std::fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn legacy_keys_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"lastHash":"abc","lastChangeAt":"2026-01-15T16:00:00Z","messageId":"99"}"#,
        )
        .unwrap();

        let state = JsonStateStore::new(path).load().await;

        assert_eq!(state.last_published_fingerprint, "abc");
        assert_eq!(state.last_message_id.as_deref(), Some("99"));
        assert!(state.is_stable());
    }
}
