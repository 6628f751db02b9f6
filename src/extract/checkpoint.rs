//! Checkpointed extraction state for crash recovery
//!
//! Before a batch runs, the full candidate list plus a cursor is persisted
//! under a key derived from the session identifier. The cursor advances after
//! each candidate and the file is removed on completion, so a crash replays
//! at most one candidate on resume, and that replay is guarded by the dedup
//! engine's similarity check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{MnemonError, Result};
use crate::types::CandidateMemory;

/// Persisted state of one in-progress extraction batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCheckpoint {
    pub session_key: String,
    pub user_tag: String,
    /// Immutable ordered candidate list; the original free text is not
    /// needed for resume since extraction already happened
    pub candidates: Vec<CandidateMemory>,
    /// Index of the last successfully processed candidate, -1 before any
    pub cursor: i64,
    pub created_at: DateTime<Utc>,
}

impl ExtractionCheckpoint {
    pub fn new(session_key: &str, user_tag: &str, candidates: Vec<CandidateMemory>) -> Self {
        Self {
            session_key: session_key.to_string(),
            user_tag: user_tag.to_string(),
            candidates,
            cursor: -1,
            created_at: Utc::now(),
        }
    }

    /// Whether every candidate has been processed
    pub fn is_complete(&self) -> bool {
        self.cursor + 1 >= self.candidates.len() as i64
    }
}

/// File-backed checkpoint persistence
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        // Session keys are caller-supplied free text; hash them into a safe
        // fixed-width file name
        let digest = Sha256::digest(session_key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Persist a checkpoint, replacing any previous state for the session
    pub fn save(&self, checkpoint: &ExtractionCheckpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&checkpoint.session_key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(checkpoint)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove the checkpoint for a completed session
    pub fn delete(&self, session_key: &str) -> Result<()> {
        let path = self.path_for(session_key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load one checkpoint file, treating corruption as absence
    fn load(path: &Path) -> Option<ExtractionCheckpoint> {
        let bytes = fs::read(path).ok()?;
        match serde_json::from_slice::<ExtractionCheckpoint>(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping corrupt checkpoint");
                None
            }
        }
    }

    /// All checkpoints whose batches did not run to completion
    pub fn scan_pending(&self) -> Result<Vec<ExtractionCheckpoint>> {
        let mut pending = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pending),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(checkpoint) = Self::load(&path) {
                if !checkpoint.is_complete() {
                    pending.push(checkpoint);
                }
            }
        }

        // Oldest first, so interrupted sessions replay in the order they ran
        pending.sort_by_key(|c| c.created_at);
        Ok(pending)
    }

    /// Validate a session key is usable before deriving state from it
    pub fn validate_session_key(session_key: &str) -> Result<()> {
        if session_key.trim().is_empty() {
            return Err(MnemonError::Checkpoint(
                "session key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
