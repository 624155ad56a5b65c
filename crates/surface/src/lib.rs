//! The chat-based rendering surface, as seen by the scheduler.
//!
//! The scheduler never touches markup. It drives the surface through the
//! narrow [`ActionSurface`] capability: submit a prompt, probe for the
//! artifact carrying a correlation key, click finalizing controls, and
//! check whether a control reports itself activated.
//!
//! [`SimulatedSurface`] is a scripted in-memory implementation used for
//! dry runs and tests.

pub mod error;
pub mod probe;
pub mod simulated;

use async_trait::async_trait;

pub use error::SurfaceError;
pub use probe::ProbeResult;
pub use simulated::{SimulatedSurface, SimulationScript};

/// One prompt submission.
///
/// Implementations perform the full submission action set: clear the
/// input, enter the invocation `marker`, pick the first suggested option,
/// paste `text`, and confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Command that opens the generation form, e.g. `/imagine`.
    pub marker: String,
    /// Prompt text including its seed parameter.
    pub text: String,
}

/// Mutating and read-only operations against a live rendering surface.
///
/// Any method may fail with [`SurfaceError`] when the underlying element
/// is gone or the interaction was refused. Callers treat such failures
/// like "not found yet" and retry within their own budget.
#[async_trait]
pub trait ActionSurface: Send + Sync {
    /// Submit a prompt. Mutating.
    async fn submit(&self, submission: &Submission) -> Result<(), SurfaceError>;

    /// Look up the artifact whose text carries `correlation_key`.
    ///
    /// `Ok(None)` means no matching artifact is visible yet.
    async fn probe(&self, correlation_key: &str) -> Result<Option<ProbeResult>, SurfaceError>;

    /// Click the control labelled `control` on the artifact. Mutating.
    async fn click(&self, correlation_key: &str, control: &str) -> Result<(), SurfaceError>;

    /// Whether the control labelled `control` reports its activated state.
    async fn is_control_activated(
        &self,
        correlation_key: &str,
        control: &str,
    ) -> Result<bool, SurfaceError>;
}
