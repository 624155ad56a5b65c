//! Local JSON file prompt source.
//!
//! The file holds either a bare array of prompt records or an object with
//! a `prompts` array. Successful runs are written back into the same file
//! by replacing it atomically (write to a sibling temp file, then rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_core::prompt::Prompt;
use relay_core::types::PromptId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SourceError;
use crate::PromptSource;

/// Prompt source backed by a JSON file on disk.
pub struct FileSource {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

/// On-disk layout, preserved when the file is rewritten.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PromptFile {
    Wrapped { prompts: Vec<Prompt> },
    Bare(Vec<Prompt>),
}

impl PromptFile {
    fn prompts(&self) -> &[Prompt] {
        match self {
            Self::Wrapped { prompts } | Self::Bare(prompts) => prompts,
        }
    }

    fn prompts_mut(&mut self) -> &mut Vec<Prompt> {
        match self {
            Self::Wrapped { prompts } | Self::Bare(prompts) => prompts,
        }
    }
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<PromptFile, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn store(&self, file: &PromptFile) -> Result<(), SourceError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let body = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PromptSource for FileSource {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Prompt>, SourceError> {
        let file = self.load().await?;
        let prompts: Vec<Prompt> = file
            .prompts()
            .iter()
            .filter(|p| p.is_pending())
            .take(limit)
            .cloned()
            .collect();

        tracing::info!(
            path = %self.path.display(),
            count = prompts.len(),
            "Loaded pending prompts from file",
        );
        Ok(prompts)
    }

    async fn mark_success(&self, id: PromptId) -> Result<(), SourceError> {
        let _guard = self.write_lock.lock().await;

        let mut file = self.load().await?;
        let prompt = file
            .prompts_mut()
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SourceError::UnknownPrompt(id))?;
        prompt.successful_runs += 1;
        let successful_runs = prompt.successful_runs;

        self.store(&file).await?;

        tracing::debug!(prompt_id = id, successful_runs, "Recorded successful run in file");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local file at {}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
