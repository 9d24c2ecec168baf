//! Knowledge persistence: JSON on disk next to the game file.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::KnowledgeStore;
use crate::KnowledgeError;

/// Directory, relative to the game file, that holds knowledge files.
pub const KNOWLEDGE_DIR: &str = "knowledge";

/// Persist knowledge every this many turns by default.
pub const DEFAULT_PERSIST_EVERY: u32 = 10;

impl KnowledgeStore {
    /// Encode as pretty-printed JSON.
    pub fn serialize(&self) -> Result<String, KnowledgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON.
    ///
    /// Missing keys default to empty and unknown keys are ignored. Malformed
    /// input yields an empty store and a warning.
    pub fn deserialize(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "malformed knowledge data, starting empty");
                Self::default()
            }
        }
    }

    /// Default knowledge path for a game:
    /// `<game dir>/knowledge/<stem>_knowledge.json`.
    pub fn knowledge_path_for(game_file: &Path) -> PathBuf {
        let stem = game_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "game".to_string());
        let dir = game_file.parent().unwrap_or_else(|| Path::new("."));
        dir.join(KNOWLEDGE_DIR).join(format!("{stem}_knowledge.json"))
    }

    /// Load a knowledge file, failing on any read or parse error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let load_error = |reason: String| KnowledgeError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read(path).await.map_err(|e| load_error(e.to_string()))?;
        serde_json::from_slice(&content).map_err(|e| load_error(e.to_string()))
    }

    /// Load a knowledge file, falling back to an empty store.
    ///
    /// A missing file is the normal first-run case and is only logged at
    /// debug level. Anything else is a warning.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no knowledge file yet");
            return Self::default();
        }
        match Self::load(path).await {
            Ok(store) => {
                info!(
                    path = %path.display(),
                    facts = store.facts().len(),
                    locations = store.visited_locations().len(),
                    "loaded knowledge"
                );
                store
            }
            Err(e) => {
                warn!(error = %e, "starting with empty knowledge");
                Self::default()
            }
        }
    }

    /// Write the store to `path`, creating parent directories.
    ///
    /// The data goes to a sibling temporary file first and is renamed over
    /// `path`, so an interrupted write never leaves a truncated file.
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<(), KnowledgeError> {
        let path = path.as_ref();
        let persist_error = |e: std::io::Error| KnowledgeError::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let content = self.serialize()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(persist_error)?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, content).await.map_err(persist_error)?;
        fs::rename(&temp, path).await.map_err(persist_error)?;
        debug!(path = %path.display(), "persisted knowledge");
        Ok(())
    }
}

/// Turn cadence for periodic knowledge persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceSchedule {
    every: u32,
}

impl Default for PersistenceSchedule {
    fn default() -> Self {
        Self::every(DEFAULT_PERSIST_EVERY)
    }
}

impl PersistenceSchedule {
    /// Persist every `turns` turns. Zero disables periodic persistence.
    pub fn every(turns: u32) -> Self {
        Self { every: turns }
    }

    /// A schedule that never persists.
    pub fn disabled() -> Self {
        Self::every(0)
    }

    /// Whether to persist after completing `turn` (1-based).
    pub fn should_persist(&self, turn: u32) -> bool {
        self.every > 0 && turn > 0 && turn % self.every == 0
    }
}
