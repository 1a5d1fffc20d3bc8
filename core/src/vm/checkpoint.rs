//! Checkpoints
//!
//! A checkpoint is a versioned envelope around a serialized `State`. The store
//! writes one file per process instance; writes go to a temporary file first and
//! are renamed into place so a crash never leaves a truncated checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::state::State;

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/* ===================== Errors ===================== */

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode checkpoint: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),

    #[error("State was created from definition {expected}, but the loaded definition is {actual}")]
    DefinitionMismatch { expected: String, actual: String },

    #[error("No checkpoint for instance {0}")]
    NotFound(Uuid),
}

/* ===================== Checkpoint ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Events the process is waiting for
    #[serde(default)]
    pub events: Vec<String>,
    pub state: State,
}

impl Checkpoint {
    pub fn new(state: State) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            events: state.suspended_events(),
            state,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.state.instance_id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec_pretty(self).map_err(CheckpointError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint =
            serde_json::from_slice(bytes).map_err(CheckpointError::Decode)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(checkpoint.version));
        }
        Ok(checkpoint)
    }
}

/* ===================== File Store ===================== */

/// Checkpoints stored as `<dir>/<instance id>.json`
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, instance_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", instance_id))
    }

    pub async fn save(&self, state: &State) -> Result<PathBuf, CheckpointError> {
        let checkpoint = Checkpoint::new(state.clone());
        let bytes = checkpoint.to_bytes()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(state.instance_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(instance_id = %state.instance_id, path = %path.display(), "Checkpoint saved");
        Ok(path)
    }

    pub async fn load(&self, instance_id: Uuid) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(instance_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(instance_id))
            }
            Err(e) => return Err(e.into()),
        };
        Checkpoint::from_bytes(&bytes)
    }

    /// Remove a checkpoint; missing checkpoints are ignored
    pub async fn delete(&self, instance_id: Uuid) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.path_for(instance_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Instance ids with a stored checkpoint, sorted
    pub async fn list(&self) -> Result<Vec<Uuid>, CheckpointError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
