//! Resume-state persistence
//!
//! Tracks `(index, resume_from)` across a batch run so it can be continued
//! after an interruption, via `serde_json` read/write wrapped in
//! `.context(...)`. A corrupt or missing state file is not fatal — the run
//! simply starts fresh, with a warning.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::model::ResumeState;

pub struct ResumeController {
    path: PathBuf,
}

impl ResumeController {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The well-known state file for a given output target, so concurrent
    /// runs against different outputs don't collide.
    pub fn default_path(output: Option<&Path>) -> PathBuf {
        match output {
            Some(path) => path.with_extension("resume.json"),
            None => std::env::temp_dir().join("swarmdns.resume.json"),
        }
    }

    /// Loads the persisted state. Returns the default (fresh) state on any
    /// read or parse failure, logging a warning rather than aborting the
    /// run.
    pub async fn load(&self) -> ResumeState {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(
                    "resume file at {} is corrupt ({}), starting fresh",
                    self.path.display(),
                    e
                );
                ResumeState::default()
            }),
            Err(_) => ResumeState::default(),
        }
    }

    /// Atomically-enough persists `state` by writing then renaming a
    /// temporary file in the same directory.
    pub async fn save(&self, state: &ResumeState) -> Result<()> {
        let bytes = serde_json::to_vec(state).context("failed to serialize resume state")?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .with_context(|| format!("failed to write resume state to {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to finalize resume state at {}", self.path.display()))?;
        Ok(())
    }
}
