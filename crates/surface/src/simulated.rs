//! Scripted in-memory rendering surface.
//!
//! [`SimulatedSurface`] plays back a [`SimulationScript`] for every
//! submitted prompt: a number of probes where nothing is visible, a
//! number of "waiting" probes, a sequence of progress percentages, then a
//! ready artifact with finalizing controls. Clicked controls activate
//! after a configurable number of checks unless listed as stuck. Scripts
//! can also make early probes or individual clicks fail.
//!
//! It also records every mutation and the peak number of mutations that
//! overlapped in time, which makes it the reference fake for exercising
//! the scheduler without a live page.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::SurfaceError;
use crate::probe::ProbeResult;
use crate::{ActionSurface, Submission};

static SEED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--seed \d+").expect("valid regex"));

/// Playback script for one submitted prompt.
#[derive(Debug, Clone)]
pub struct SimulationScript {
    /// Probes that find nothing before the artifact appears.
    pub absent_probes: u32,
    /// Probes that report the render as queued.
    pub waiting_probes: u32,
    /// Progress percentages reported by consecutive probes.
    pub progress: Vec<u8>,
    /// Finalizing controls shown once the render is done.
    pub controls: Vec<String>,
    /// Controls that never report activation.
    pub stuck_controls: HashSet<String>,
    /// Activation checks after a click that still report "not activated".
    pub activation_lag: u32,
    /// The artifact never appears at all.
    pub never_appears: bool,
    /// Submissions are refused.
    pub reject_submission: bool,
    /// Probes that fail with an error before playback starts.
    pub probe_errors: u32,
    /// Controls whose clicks are refused.
    pub failing_clicks: HashSet<String>,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            absent_probes: 1,
            waiting_probes: 1,
            progress: vec![15, 46, 78],
            controls: ["U1", "U2", "U3", "U4"].map(String::from).to_vec(),
            stuck_controls: HashSet::new(),
            activation_lag: 1,
            never_appears: false,
            reject_submission: false,
            probe_errors: 0,
            failing_clicks: HashSet::new(),
        }
    }
}

impl SimulationScript {
    /// A render that is ready on the first probe and whose controls
    /// activate immediately.
    pub fn instant() -> Self {
        Self {
            absent_probes: 0,
            waiting_probes: 0,
            progress: Vec::new(),
            activation_lag: 0,
            ..Self::default()
        }
    }

    fn observe(&self, probe_index: u32) -> Option<ProbeResult> {
        if self.never_appears {
            return None;
        }
        let mut idx = probe_index;
        if idx < self.absent_probes {
            return None;
        }
        idx -= self.absent_probes;
        if idx < self.waiting_probes {
            return Some(ProbeResult::Waiting);
        }
        idx -= self.waiting_probes;
        match self.progress.get(idx as usize) {
            Some(&percent) => Some(ProbeResult::Progress { percent }),
            None => Some(ProbeResult::ReadyWithControls {
                controls: self.controls.clone(),
            }),
        }
    }
}

/// Per-artifact playback state.
#[derive(Debug)]
struct Artifact {
    script: SimulationScript,
    probes: u32,
    /// Control label -> activation checks made since it was clicked.
    clicked: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct State {
    artifacts: HashMap<String, Artifact>,
    submissions: Vec<Submission>,
    clicks: Vec<(String, String)>,
}

/// Scripted surface for dry runs and tests.
pub struct SimulatedSurface {
    default_script: SimulationScript,
    /// Scripts chosen by substring of the submitted text, first match wins.
    overrides: Vec<(String, SimulationScript)>,
    /// Time each mutation takes, so overlapping mutations are observable.
    mutation_delay: Duration,
    state: Mutex<State>,
    mutations_in_flight: AtomicUsize,
    peak_mutations: AtomicUsize,
}

impl SimulatedSurface {
    pub fn new(default_script: SimulationScript) -> Self {
        Self {
            default_script,
            overrides: Vec::new(),
            mutation_delay: Duration::from_millis(50),
            state: Mutex::new(State::default()),
            mutations_in_flight: AtomicUsize::new(0),
            peak_mutations: AtomicUsize::new(0),
        }
    }

    /// Use `script` for submissions whose text contains `needle`.
    pub fn with_override(mut self, needle: impl Into<String>, script: SimulationScript) -> Self {
        self.overrides.push((needle.into(), script));
        self
    }

    pub fn with_mutation_delay(mut self, delay: Duration) -> Self {
        self.mutation_delay = delay;
        self
    }

    /// Every submission received, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Every `(correlation_key, control)` click, in order.
    pub fn clicks(&self) -> Vec<(String, String)> {
        self.lock().clicks.clone()
    }

    /// Highest number of mutations ever observed running at once.
    pub fn peak_concurrent_mutations(&self) -> usize {
        self.peak_mutations.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain bookkeeping behind;
        // keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn script_for(&self, text: &str) -> SimulationScript {
        self.overrides
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| self.default_script.clone())
    }

    async fn mutate(&self) {
        let now = self.mutations_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_mutations.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.mutation_delay).await;
        self.mutations_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for SimulatedSurface {
    fn default() -> Self {
        Self::new(SimulationScript::default())
    }
}

#[async_trait]
impl ActionSurface for SimulatedSurface {
    async fn submit(&self, submission: &Submission) -> Result<(), SurfaceError> {
        self.mutate().await;

        let script = self.script_for(&submission.text);
        if script.reject_submission {
            return Err(SurfaceError::Interaction(
                "submission was not accepted".to_string(),
            ));
        }

        let key = SEED_KEY_RE
            .find(&submission.text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SurfaceError::Interaction("submission carries no seed".to_string()))?;

        tracing::debug!(key = %key, "Simulated submission accepted");

        let mut state = self.lock();
        state.submissions.push(submission.clone());
        state.artifacts.insert(
            key,
            Artifact {
                script,
                probes: 0,
                clicked: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn probe(&self, correlation_key: &str) -> Result<Option<ProbeResult>, SurfaceError> {
        let mut state = self.lock();
        let Some(artifact) = state.artifacts.get_mut(correlation_key) else {
            return Ok(None);
        };
        let index = artifact.probes;
        artifact.probes += 1;
        let errors = artifact.script.probe_errors;
        if index < errors {
            return Err(SurfaceError::Unavailable(format!(
                "probe {} of {correlation_key} failed",
                index + 1
            )));
        }
        Ok(artifact.script.observe(index - errors))
    }

    async fn click(&self, correlation_key: &str, control: &str) -> Result<(), SurfaceError> {
        self.mutate().await;

        let mut state = self.lock();
        let artifact = state
            .artifacts
            .get_mut(correlation_key)
            .ok_or_else(|| SurfaceError::ElementMissing(correlation_key.to_string()))?;
        if !artifact.script.controls.iter().any(|c| c == control) {
            return Err(SurfaceError::ElementMissing(format!(
                "control {control} on {correlation_key}"
            )));
        }
        if artifact.script.failing_clicks.contains(control) {
            return Err(SurfaceError::Interaction(format!(
                "click on {control} was not registered"
            )));
        }
        artifact.clicked.entry(control.to_string()).or_insert(0);
        state
            .clicks
            .push((correlation_key.to_string(), control.to_string()));
        Ok(())
    }

    async fn is_control_activated(
        &self,
        correlation_key: &str,
        control: &str,
    ) -> Result<bool, SurfaceError> {
        let mut state = self.lock();
        let artifact = state
            .artifacts
            .get_mut(correlation_key)
            .ok_or_else(|| SurfaceError::ElementMissing(correlation_key.to_string()))?;
        if artifact.script.stuck_controls.contains(control) {
            return Ok(false);
        }
        let lag = artifact.script.activation_lag;
        match artifact.clicked.get_mut(control) {
            Some(checks) => {
                *checks += 1;
                Ok(*checks > lag)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
