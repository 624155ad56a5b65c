//! Shared harness for scheduler integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::prompt::Prompt;
use relay_core::types::PromptId;
use relay_events::{ControlPanel, EventBus, RunEvent, RunEventKind};
use relay_pipeline::{JobConfig, Scheduler, SchedulerConfig};
use relay_source::{PromptSource, SourceError};
use relay_surface::{SimulatedSurface, SimulationScript};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

// ---------------------------------------------------------------------------
// In-memory prompt source
// ---------------------------------------------------------------------------

/// Prompt source backed by a vector, recording every mark.
#[derive(Default)]
pub struct MemorySource {
    prompts: Mutex<Vec<Prompt>>,
    marks: Mutex<Vec<PromptId>>,
    pub fail_fetch: bool,
    pub fail_marks: bool,
}

impl MemorySource {
    pub fn new(prompts: Vec<Prompt>) -> Self {
        Self {
            prompts: Mutex::new(prompts),
            ..Self::default()
        }
    }

    pub fn marks(&self) -> Vec<PromptId> {
        self.marks.lock().unwrap().clone()
    }

    pub fn successful_runs(&self, id: PromptId) -> u32 {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.successful_runs)
            .unwrap_or_default()
    }
}

#[async_trait]
impl PromptSource for MemorySource {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Prompt>, SourceError> {
        if self.fail_fetch {
            return Err(SourceError::Api {
                status: 503,
                body: "maintenance".into(),
            });
        }
        Ok(self
            .prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_success(&self, id: PromptId) -> Result<(), SourceError> {
        if self.fail_marks {
            return Err(SourceError::Rejected("read-only".into()));
        }
        let mut prompts = self.prompts.lock().unwrap();
        let prompt = prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(SourceError::UnknownPrompt(id))?;
        prompt.successful_runs += 1;
        self.marks.lock().unwrap().push(id);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory backlog".into()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Short intervals so paused-clock tests finish quickly.
pub fn fast_config(initial_workers: i64) -> SchedulerConfig {
    SchedulerConfig {
        worker_min: 1,
        worker_max: 2,
        initial_workers,
        pause_poll_interval: Duration::from_millis(100),
        max_failures_per_prompt: Some(2),
        job: JobConfig {
            poll_interval: Duration::from_millis(100),
            job_timeout: Duration::from_secs(5),
            activation_interval: Duration::from_millis(50),
            activation_retries: 3,
            click_settle: Duration::from_millis(10),
            ..JobConfig::default()
        },
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub surface: Arc<SimulatedSurface>,
    pub source: Arc<MemorySource>,
    pub panel: Arc<ControlPanel>,
    pub events: Receiver<RunEvent>,
}

impl Harness {
    pub fn new(surface: SimulatedSurface, source: MemorySource, config: SchedulerConfig) -> Self {
        let bus = Arc::new(EventBus::new(16 * 1024));
        let events = bus.subscribe();
        let panel = Arc::new(ControlPanel::new(bus, config.initial_workers));
        let surface = Arc::new(surface);
        let source = Arc::new(source);
        let scheduler = Scheduler::new(surface.clone(), source.clone(), panel.clone(), config)
            .expect("valid config");
        Self {
            scheduler,
            surface,
            source,
            panel,
            events,
        }
    }

    /// Harness over a default simulated surface.
    pub fn simple(prompts: Vec<Prompt>, initial_workers: i64) -> Self {
        Self::new(
            SimulatedSurface::new(SimulationScript::default()),
            MemorySource::new(prompts),
            fast_config(initial_workers),
        )
    }

    /// Every event published so far, in order.
    pub fn drain(&mut self) -> Vec<RunEventKind> {
        let mut kinds = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => kinds.push(event.kind),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        kinds
    }
}

pub fn logs(events: &[RunEventKind]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEventKind::Log { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn statuses(events: &[RunEventKind]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEventKind::Status { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

pub fn active_counts(events: &[RunEventKind]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEventKind::Stats(stats) => Some(stats.active),
            _ => None,
        })
        .collect()
}

/// Highest number of simultaneously live jobs per prompt, derived from
/// job progress events.
pub fn max_live_jobs_per_prompt(events: &[RunEventKind]) -> HashMap<PromptId, usize> {
    let mut live: HashMap<PromptId, usize> = HashMap::new();
    let mut peak: HashMap<PromptId, usize> = HashMap::new();
    for event in events {
        if let RunEventKind::JobProgress {
            prompt_id, status, ..
        } = event
        {
            let count = live.entry(*prompt_id).or_default();
            match status.as_str() {
                "submitting" => *count += 1,
                "succeeded" | "failed" | "timed out" => *count -= 1,
                _ => {}
            }
            let top = peak.entry(*prompt_id).or_default();
            *top = (*top).max(*count);
        }
    }
    peak
}

pub fn prompts(ids: &[PromptId], expected_runs: u32) -> Vec<Prompt> {
    ids.iter()
        .map(|&id| Prompt::new(id, format!("prompt number {id}"), expected_runs))
        .collect()
}
