//! Read-only wrapper around another prompt source.

use async_trait::async_trait;
use relay_core::prompt::Prompt;
use relay_core::types::PromptId;

use crate::error::SourceError;
use crate::PromptSource;

/// Forwards fetches to the wrapped source but never records successes.
///
/// Used when jobs run against a simulated surface: the renders are not
/// real, so the source of truth must not be told they happened.
pub struct DryRunSource<S> {
    inner: S,
}

impl<S: PromptSource> DryRunSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: PromptSource> PromptSource for DryRunSource<S> {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Prompt>, SourceError> {
        self.inner.fetch_pending(limit).await
    }

    async fn mark_success(&self, id: PromptId) -> Result<(), SourceError> {
        tracing::info!(prompt_id = id, "Dry run: not recording successful run");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (dry run)", self.inner.describe())
    }
}
