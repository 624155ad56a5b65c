use relay_core::error::CoreError;
use relay_source::SourceError;

/// Run-level failures surfaced to the caller of the scheduler.
///
/// Per-job problems never appear here; they are folded into the
/// [`RunSummary`](crate::scheduler::RunSummary) instead.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Bad input or configuration. Nothing was dispatched.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The prompt backlog could not be fetched.
    #[error("Prompt source error: {0}")]
    Source(#[from] SourceError),
}
