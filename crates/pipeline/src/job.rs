//! Job state machine.
//!
//! One [`JobRunner::run`] call drives one reserved prompt through
//!
//! ```text
//! Submitting -> AwaitingFirstSignal -> Queued -> Rendering(p) -> Finalizing -> Succeeded
//!      \______________\__________________\__________\_______________\______> Failed / TimedOut
//! ```
//!
//! Phases only move forward. The sole loop is the bounded progress poll
//! between `AwaitingFirstSignal` and `Finalizing`. Every failure is caught
//! here and returned as a [`JobError`]; nothing escapes to the scheduler
//! as a panic.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use relay_core::polling::{poll_until, PollPolicy, PollStep};
use relay_core::prompt::Prompt;
use relay_core::seed::{correlation_key, generate_seed, seeded_text};
use relay_core::types::PromptId;
use relay_events::StatsControl;
use relay_surface::{ActionSurface, ProbeResult, Submission, SurfaceError};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::JobConfig;
use crate::gate::ActionGate;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Submitting,
    AwaitingFirstSignal,
    Queued,
    Rendering(u8),
    Finalizing,
    Succeeded,
    Failed(String),
    TimedOut,
}

impl JobPhase {
    fn rank(&self) -> u8 {
        match self {
            Self::Submitting => 0,
            Self::AwaitingFirstSignal => 1,
            Self::Queued => 2,
            Self::Rendering(_) => 3,
            Self::Finalizing => 4,
            Self::Succeeded | Self::Failed(_) | Self::TimedOut => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::TimedOut)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(&self, next: &JobPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed(_) | Self::TimedOut) => true,
            (Self::Finalizing, Self::Succeeded) => true,
            (_, Self::Succeeded) => false,
            (Self::Rendering(_), Self::Rendering(_)) => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// Short status label for progress events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::AwaitingFirstSignal => "awaiting",
            Self::Queued => "queued",
            Self::Rendering(_) => "rendering",
            Self::Finalizing => "finalizing",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timed out",
        }
    }

    /// Progress percentage for observers.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Rendering(p) => *p,
            Self::Finalizing | Self::Succeeded => 100,
            _ => 0,
        }
    }
}

/// A live job bound to one reserved prompt.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub prompt_id: PromptId,
    pub seed: u64,
    phase: JobPhase,
}

impl Job {
    pub fn new(id: Uuid, prompt_id: PromptId, seed: u64) -> Self {
        Self {
            id,
            prompt_id,
            seed,
            phase: JobPhase::Submitting,
        }
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&mut self, next: JobPhase) -> bool {
        if self.phase == next || !self.phase.can_transition(&next) {
            return false;
        }
        self.phase = next;
        true
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A finalizing control that never reported itself activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationWarning {
    pub control: String,
    pub attempts: u32,
    pub last_observation: String,
}

/// A job that reached `Succeeded`, possibly with activation warnings.
#[derive(Debug, Clone)]
pub struct JobSuccess {
    pub job_id: Uuid,
    pub seed: u64,
    pub warnings: Vec<ActivationWarning>,
    pub elapsed: Duration,
}

impl JobSuccess {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Why a job did not reach `Succeeded`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("Submission failed: {0}")]
    Submission(SurfaceError),

    #[error("Timed out after {elapsed:?}: {last_diagnostic}")]
    TimedOut {
        elapsed: Duration,
        last_diagnostic: String,
    },
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Drives jobs against the shared surface, gate and control sink.
pub struct JobRunner {
    surface: Arc<dyn ActionSurface>,
    gate: Arc<ActionGate>,
    control: Arc<dyn StatsControl>,
    config: JobConfig,
}

impl JobRunner {
    pub fn new(
        surface: Arc<dyn ActionSurface>,
        gate: Arc<ActionGate>,
        control: Arc<dyn StatsControl>,
        config: JobConfig,
    ) -> Self {
        Self {
            surface,
            gate,
            control,
            config,
        }
    }

    pub fn gate(&self) -> &Arc<ActionGate> {
        &self.gate
    }

    /// Run one job for `prompt` to a terminal phase.
    pub async fn run(&self, job_id: Uuid, prompt: &Prompt) -> Result<JobSuccess, JobError> {
        let started = Instant::now();
        let seed = generate_seed();
        let key = correlation_key(seed);
        let job = Mutex::new(Job::new(job_id, prompt.id, seed));
        self.report(&job);

        // -- Submitting --

        let submission = Submission {
            marker: self.config.invocation_marker.clone(),
            text: seeded_text(&prompt.text, seed, self.config.prompt_suffix.as_deref()),
        };
        let submitted = self
            .gate
            .with_exclusive(|| {
                tokio::time::timeout(self.config.job_timeout, self.surface.submit(&submission))
            })
            .await;
        match submitted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(%job_id, prompt_id = prompt.id, error = %e, "Submission failed");
                self.transition(&job, JobPhase::Failed(e.to_string()));
                return Err(JobError::Submission(e));
            }
            Err(_) => {
                tracing::warn!(%job_id, prompt_id = prompt.id, "Submission did not complete");
                self.transition(&job, JobPhase::TimedOut);
                return Err(JobError::TimedOut {
                    elapsed: started.elapsed(),
                    last_diagnostic: "submission did not complete".to_string(),
                });
            }
        }
        tracing::debug!(%job_id, prompt_id = prompt.id, seed, "Prompt submitted");
        self.transition(&job, JobPhase::AwaitingFirstSignal);

        // -- Awaiting / Queued / Rendering --

        let policy = PollPolicy::with_timeout(self.config.poll_interval, self.config.job_timeout);
        let surface = self.surface.as_ref();
        let key_ref = key.as_str();
        let job_ref = &job;
        let polled = poll_until(policy, move |_| async move {
            let observed = surface.probe(key_ref).await;
            self.observe(job_ref, key_ref, observed)
        })
        .await;

        let controls = match polled {
            Ok(ready) => ready.value,
            Err(exhausted) => {
                tracing::warn!(
                    %job_id,
                    prompt_id = prompt.id,
                    attempts = exhausted.attempts,
                    last = %exhausted.last_observation,
                    "Job timed out waiting for render",
                );
                self.transition(&job, JobPhase::TimedOut);
                return Err(JobError::TimedOut {
                    elapsed: started.elapsed(),
                    last_diagnostic: exhausted.last_observation,
                });
            }
        };

        // -- Finalizing --

        self.transition(&job, JobPhase::Finalizing);
        let warnings = self
            .gate
            .with_exclusive(|| self.finalize(key_ref, &controls))
            .await;

        self.transition(&job, JobPhase::Succeeded);
        tracing::info!(
            %job_id,
            prompt_id = prompt.id,
            warnings = warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job succeeded",
        );

        Ok(JobSuccess {
            job_id,
            seed,
            warnings,
            elapsed: started.elapsed(),
        })
    }

    /// Fold one probe observation into the job phase.
    ///
    /// Absence and probe errors count as "still propagating". A ready
    /// artifact only ends the poll once it shows the full control set.
    fn observe(
        &self,
        job: &Mutex<Job>,
        key: &str,
        observed: Result<Option<ProbeResult>, SurfaceError>,
    ) -> PollStep<Vec<String>> {
        match observed {
            Err(e) => PollStep::Pending(format!("probe failed: {e}")),
            Ok(None) => PollStep::Pending(format!("no artifact for {key} yet")),
            Ok(Some(result)) => {
                let diagnostic = result.describe();
                match result {
                    ProbeResult::Waiting => {
                        self.transition(job, JobPhase::Queued);
                        PollStep::Pending(diagnostic)
                    }
                    ProbeResult::Progress { percent } => {
                        self.transition(job, JobPhase::Rendering(percent));
                        PollStep::Pending(diagnostic)
                    }
                    ProbeResult::ReadyWithControls { controls }
                        if controls.len() == self.config.expected_controls =>
                    {
                        PollStep::Ready(controls)
                    }
                    ProbeResult::ReadyWithControls { .. } => PollStep::Pending(format!(
                        "{diagnostic}, expected {}",
                        self.config.expected_controls
                    )),
                }
            }
        }
    }

    /// Click every control in order and wait for each to activate.
    ///
    /// Runs under the gate. A click error or a click that overruns the
    /// activation budget is treated as "not activated yet"; a control
    /// that never activates becomes a warning and the sequence continues.
    async fn finalize(&self, key: &str, controls: &[String]) -> Vec<ActivationWarning> {
        let mut warnings = Vec::new();
        let surface = self.surface.as_ref();
        let click_budget = self.config.activation_budget();

        for control in controls {
            match tokio::time::timeout(click_budget, surface.click(key, control)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(key, control = %control, error = %e, "Click failed");
                }
                Err(_) => {
                    tracing::debug!(key, control = %control, "Click did not complete");
                }
            }
            tokio::time::sleep(self.config.click_settle).await;

            let policy = PollPolicy::with_attempts(
                self.config.activation_interval,
                self.config.activation_retries,
            );
            let control_ref = control.as_str();
            let activated = poll_until(policy, move |_| async move {
                match surface.is_control_activated(key, control_ref).await {
                    Ok(true) => PollStep::Ready(()),
                    Ok(false) => PollStep::Pending(format!("{control_ref} not activated")),
                    Err(e) => PollStep::Pending(format!("{control_ref}: {e}")),
                }
            })
            .await;

            if let Err(exhausted) = activated {
                tracing::warn!(
                    key,
                    control = %control,
                    attempts = exhausted.attempts,
                    "Control did not activate",
                );
                warnings.push(ActivationWarning {
                    control: control.clone(),
                    attempts: exhausted.attempts,
                    last_observation: exhausted.last_observation,
                });
            }
        }

        warnings
    }

    fn transition(&self, job: &Mutex<Job>, next: JobPhase) {
        let moved = job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance(next);
        if moved {
            self.report(job);
        }
    }

    fn report(&self, job: &Mutex<Job>) {
        let snapshot = job.lock().unwrap_or_else(PoisonError::into_inner).clone();
        self.control.publish_job_progress(
            snapshot.id,
            snapshot.prompt_id,
            snapshot.phase.label(),
            snapshot.phase.percent(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
