//! Prompt records and backlog validation.
//!
//! A [`Prompt`] is created by a prompt source at fetch time and mutated
//! only by the scheduler when a run is confirmed successful. The JSON
//! field names match the records served by the prompt API and stored in
//! local prompt files.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::PromptId;

/// Maximum length of a prompt label in log lines before it is truncated.
pub const MAX_LABEL_LEN: usize = 80;

/// A generative-image prompt and its run bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The prompt text submitted to the rendering surface.
    #[serde(rename = "prompt")]
    pub text: String,
    /// Free-form keywords carried along from the source; never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    /// How many successful renders this prompt should eventually have.
    #[serde(default)]
    pub expected_runs: u32,
    /// How many renders have been confirmed so far.
    #[serde(default)]
    pub successful_runs: u32,
}

impl Prompt {
    /// Create a prompt with no title or keywords.
    pub fn new(id: PromptId, text: impl Into<String>, expected_runs: u32) -> Self {
        Self {
            id,
            title: None,
            text: text.into(),
            keywords: None,
            expected_runs,
            successful_runs: 0,
        }
    }

    /// A prompt is pending while it still owes successful runs.
    pub fn is_pending(&self) -> bool {
        self.successful_runs < self.expected_runs
    }

    /// Number of runs still owed (zero once the prompt is done).
    pub fn remaining_runs(&self) -> u32 {
        self.expected_runs.saturating_sub(self.successful_runs)
    }

    /// Short label for status lines: the title when present, otherwise the
    /// prompt text, trimmed and truncated to [`MAX_LABEL_LEN`] characters.
    pub fn label(&self) -> String {
        let raw = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.text.trim());

        if raw.chars().count() > MAX_LABEL_LEN {
            let head: String = raw.chars().take(MAX_LABEL_LEN - 3).collect();
            format!("{head}...")
        } else {
            raw.to_string()
        }
    }
}

/// Sum of the runs still owed across a backlog.
pub fn remaining_runs(prompts: &[Prompt]) -> u64 {
    prompts.iter().map(|p| u64::from(p.remaining_runs())).sum()
}

/// Validate a backlog before any job is started.
///
/// Rules:
/// - The backlog must not be empty.
/// - Every prompt text must contain non-whitespace characters.
/// - Prompt ids must be unique (reservations are keyed by id).
pub fn validate_prompts(prompts: &[Prompt]) -> Result<(), CoreError> {
    if prompts.is_empty() {
        return Err(CoreError::Validation(
            "Prompt backlog must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(prompts.len());
    for prompt in prompts {
        if prompt.text.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Prompt {} has empty text",
                prompt.id
            )));
        }
        if !seen.insert(prompt.id) {
            return Err(CoreError::Validation(format!(
                "Duplicate prompt id: {}",
                prompt.id
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
