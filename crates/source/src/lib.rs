//! Prompt sources: where the backlog comes from and where confirmed runs
//! are recorded.
//!
//! Two interchangeable implementations are provided, a remote prompt API
//! ([`ApiSource`]) and a local JSON file ([`FileSource`]). The scheduler
//! only sees the [`PromptSource`] trait. [`DryRunSource`] wraps either one
//! so that nothing is written back.

pub mod api;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod file;

use async_trait::async_trait;
use relay_core::prompt::Prompt;
use relay_core::types::PromptId;

pub use api::ApiSource;
pub use config::SourceConfig;
pub use dry_run::DryRunSource;
pub use error::SourceError;
pub use file::FileSource;

/// Default number of prompts requested per fetch.
pub const DEFAULT_FETCH_LIMIT: usize = 20;

/// The backing store of prompt records.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Fetch up to `limit` prompts that still owe runs, in source order.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Prompt>, SourceError>;

    /// Record one confirmed successful run for `id`.
    async fn mark_success(&self, id: PromptId) -> Result<(), SourceError>;

    /// Human-readable description for startup logs.
    fn describe(&self) -> String;
}
