//! Prompt source selection.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{ApiSource, DryRunSource, FileSource, PromptSource};

/// Which backing store to read prompts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// The remote prompt API.
    Api { url: String, secret: Option<String> },
    /// A local JSON file.
    File { path: PathBuf },
}

impl SourceConfig {
    /// Construct the configured source.
    ///
    /// With `dry_run` set the source is wrapped in [`DryRunSource`] so that
    /// successes are never written back.
    pub fn build(&self, dry_run: bool) -> Arc<dyn PromptSource> {
        match (self, dry_run) {
            (Self::Api { url, secret }, false) => Arc::new(ApiSource::new(url.clone(), secret.clone())),
            (Self::Api { url, secret }, true) => {
                Arc::new(DryRunSource::new(ApiSource::new(url.clone(), secret.clone())))
            }
            (Self::File { path }, false) => Arc::new(FileSource::new(path.clone())),
            (Self::File { path }, true) => Arc::new(DryRunSource::new(FileSource::new(path.clone()))),
        }
    }
}
