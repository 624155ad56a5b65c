//! Prompt scheduling pipeline.
//!
//! Turns a backlog of [`Prompt`](relay_core::prompt::Prompt) records into
//! a bounded set of concurrently running jobs:
//!
//! - [`Scheduler`] reserves prompts, enforces the worker limit and the
//!   pause flag, and folds job outcomes back into the backlog.
//! - [`JobRunner`] drives one job through submission, progress polling
//!   and the finalizing control sequence.
//! - [`ActionGate`] serializes every mutating surface action across jobs.

pub mod config;
pub mod error;
pub mod gate;
pub mod job;
pub mod scheduler;

pub use config::{JobConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use gate::ActionGate;
pub use job::{ActivationWarning, Job, JobError, JobPhase, JobRunner, JobSuccess};
pub use scheduler::{RunOutcome, RunSummary, Scheduler};
