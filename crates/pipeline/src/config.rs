//! Scheduler and job tuning.
//!
//! Every retry count, interval and timeout is a parameter with a
//! documented default. The worker binary fills these from the
//! environment; tests build them directly with short values.

use std::time::Duration;

use relay_core::error::CoreError;
use relay_core::worker_limit::{DEFAULT_WORKER_MAX, DEFAULT_WORKER_MIN};

/// Default delay between progress probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default total time a job may spend waiting for its render.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Default delay between control-activation checks.
pub const DEFAULT_ACTIVATION_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of control-activation checks per control.
pub const DEFAULT_ACTIVATION_RETRIES: u32 = 20;

/// Default pause after a click before checking activation.
pub const DEFAULT_CLICK_SETTLE: Duration = Duration::from_secs(1);

/// Number of finalizing controls a finished render exposes.
pub const DEFAULT_EXPECTED_CONTROLS: usize = 4;

/// Command that opens the generation form.
pub const DEFAULT_INVOCATION_MARKER: &str = "/imagine";

/// Default delay between pause-flag checks while paused.
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(600);

/// Default number of failed jobs after which a prompt is set aside.
pub const DEFAULT_MAX_FAILURES_PER_PROMPT: u32 = 3;

/// Settings for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub activation_interval: Duration,
    pub activation_retries: u32,
    pub click_settle: Duration,
    pub expected_controls: usize,
    pub invocation_marker: String,
    /// Appended after the seed parameter, e.g. `--ar 8:3`.
    pub prompt_suffix: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            activation_interval: DEFAULT_ACTIVATION_INTERVAL,
            activation_retries: DEFAULT_ACTIVATION_RETRIES,
            click_settle: DEFAULT_CLICK_SETTLE,
            expected_controls: DEFAULT_EXPECTED_CONTROLS,
            invocation_marker: DEFAULT_INVOCATION_MARKER.to_string(),
            prompt_suffix: None,
        }
    }
}

impl JobConfig {
    /// Total time allowed for one control to activate. A single click is
    /// also cut off after this long so it cannot hold the gate.
    pub fn activation_budget(&self) -> Duration {
        self.activation_interval
            .saturating_mul(self.activation_retries)
    }
}

/// Settings for a scheduling run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_min: u32,
    pub worker_max: u32,
    /// Worker count requested at start, clamped into `[min, max]`.
    pub initial_workers: i64,
    pub pause_poll_interval: Duration,
    /// `None` retries a failing prompt for as long as the run lasts.
    pub max_failures_per_prompt: Option<u32>,
    pub job: JobConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_min: DEFAULT_WORKER_MIN,
            worker_max: DEFAULT_WORKER_MAX,
            initial_workers: i64::from(DEFAULT_WORKER_MIN),
            pause_poll_interval: DEFAULT_PAUSE_POLL,
            max_failures_per_prompt: Some(DEFAULT_MAX_FAILURES_PER_PROMPT),
            job: JobConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.worker_min == 0 {
            return Err(CoreError::Validation(
                "worker_min must be at least 1".into(),
            ));
        }
        if self.worker_min > self.worker_max {
            return Err(CoreError::Validation(format!(
                "worker_min ({}) exceeds worker_max ({})",
                self.worker_min, self.worker_max
            )));
        }
        let intervals = [
            ("pause_poll_interval", self.pause_poll_interval),
            ("poll_interval", self.job.poll_interval),
            ("activation_interval", self.job.activation_interval),
            ("job_timeout", self.job.job_timeout),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(CoreError::Validation(format!("{name} must be non-zero")));
        }
        if self.job.expected_controls == 0 {
            return Err(CoreError::Validation(
                "expected_controls must be at least 1".into(),
            ));
        }
        if self.job.activation_retries == 0 {
            return Err(CoreError::Validation(
                "activation_retries must be at least 1".into(),
            ));
        }
        if self.max_failures_per_prompt == Some(0) {
            return Err(CoreError::Validation(
                "max_failures_per_prompt must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn activation_budget_spans_every_check() {
        assert_eq!(JobConfig::default().activation_budget(), Duration::from_secs(40));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_worker_bounds() {
        let config = SchedulerConfig {
            worker_min: 3,
            worker_max: 2,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(CoreError::Validation(msg)) if msg.contains("exceeds"));
    }

    #[test]
    fn rejects_zero_min() {
        let config = SchedulerConfig {
            worker_min: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = SchedulerConfig::default();
        config.job.poll_interval = Duration::ZERO;
        assert_matches!(config.validate(), Err(CoreError::Validation(msg)) if msg.contains("poll_interval"));
    }

    #[test]
    fn rejects_zero_expected_controls() {
        let mut config = SchedulerConfig::default();
        config.job.expected_controls = 0;
        assert!(config.validate().is_err());
    }
}
