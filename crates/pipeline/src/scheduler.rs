//! Prompt scheduler.
//!
//! Each iteration of the run loop reads the pause flag, adopts the
//! requested worker limit, and either dispatches the first pending,
//! unreserved prompt or waits for an in-flight job to finish. Jobs run on
//! a [`JoinSet`]; their outcomes are folded back into the backlog one at a
//! time on the scheduler task, so the backlog, the reservation set and the
//! counters never need a lock.
//!
//! Invariants held at every observation point:
//!
//! - a prompt id is reserved by at most one in-flight job;
//! - the in-flight count never exceeds the worker limit at dispatch time;
//! - `successful_runs` is incremented only after the source confirmed the
//!   run with `mark_success`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use relay_core::prompt::{remaining_runs, validate_prompts, Prompt};
use relay_core::types::PromptId;
use relay_core::worker_limit::WorkerLimit;
use relay_events::{QueueStats, StatsControl, Tone};
use relay_source::PromptSource;
use relay_surface::ActionSurface;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::gate::ActionGate;
use crate::job::{JobError, JobRunner, JobSuccess};

type JobOutcome = Result<JobSuccess, JobError>;
type Joined = Result<(task::Id, JobOutcome), JoinError>;

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every prompt reached its expected run count.
    Completed,
    /// Prompts are still pending: shutdown was requested, or the remaining
    /// prompts hit their failure ceiling.
    StoppedEarly,
}

/// Totals reported when a run returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub succeeded_runs: usize,
    pub failed_jobs: usize,
    /// Jobs that rendered but whose success the source did not record.
    pub unmarked_runs: usize,
    pub completed_prompts: usize,
    pub warnings: usize,
    /// Highest number of jobs in flight at once.
    pub peak_in_flight: usize,
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn empty() -> Self {
        Self {
            dispatched: 0,
            succeeded_runs: 0,
            failed_jobs: 0,
            unmarked_runs: 0,
            completed_prompts: 0,
            warnings: 0,
            peak_in_flight: 0,
            outcome: RunOutcome::Completed,
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Dispatched {
    prompt_id: PromptId,
    job_id: Uuid,
}

/// State owned by one call to [`Scheduler::run_with_shutdown`].
struct RunContext {
    backlog: Vec<Prompt>,
    reserved: HashSet<PromptId>,
    failures: HashMap<PromptId, u32>,
    in_flight: JoinSet<JobOutcome>,
    tasks: HashMap<task::Id, Dispatched>,
    limit: WorkerLimit,
    paused: bool,
    last_status: Option<String>,
    summary: RunSummary,
}

impl RunContext {
    fn new(backlog: Vec<Prompt>, limit: WorkerLimit) -> Self {
        Self {
            backlog,
            reserved: HashSet::new(),
            failures: HashMap::new(),
            in_flight: JoinSet::new(),
            tasks: HashMap::new(),
            limit,
            paused: false,
            last_status: None,
            summary: RunSummary::empty(),
        }
    }

    /// Index of the first prompt that may be dispatched now.
    fn next_candidate(&self, max_failures: Option<u32>) -> Option<usize> {
        self.backlog.iter().position(|p| {
            p.is_pending()
                && !self.reserved.contains(&p.id)
                && !self.is_set_aside(p.id, max_failures)
        })
    }

    fn is_set_aside(&self, id: PromptId, max_failures: Option<u32>) -> bool {
        match (max_failures, self.failures.get(&id)) {
            (Some(max), Some(&count)) => count >= max,
            _ => false,
        }
    }

    fn prompt_mut(&mut self, id: PromptId) -> Option<&mut Prompt> {
        self.backlog.iter_mut().find(|p| p.id == id)
    }

    fn stats(&self) -> QueueStats {
        QueueStats::compute(
            self.in_flight.len(),
            remaining_runs(&self.backlog),
            self.summary.completed_prompts,
        )
    }

    fn has_pending(&self) -> bool {
        self.backlog.iter().any(Prompt::is_pending)
    }
}

/// What ended a wait.
enum Wake {
    Joined(Joined),
    Tick,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Dispatches prompts to jobs under a worker limit and operator controls.
pub struct Scheduler {
    runner: Arc<JobRunner>,
    source: Arc<dyn PromptSource>,
    control: Arc<dyn StatsControl>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        surface: Arc<dyn ActionSurface>,
        source: Arc<dyn PromptSource>,
        control: Arc<dyn StatsControl>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let runner = JobRunner::new(
            surface,
            Arc::new(ActionGate::new()),
            Arc::clone(&control),
            config.job.clone(),
        );
        Ok(Self {
            runner: Arc::new(runner),
            source,
            control,
            config,
        })
    }

    /// Fetch the backlog from the prompt source and run it.
    ///
    /// A failed fetch aborts the run before anything is dispatched.
    pub async fn run_from_source(
        &self,
        limit: usize,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, SchedulerError> {
        self.control.publish_log(
            &format!(
                "Fetching up to {limit} prompt(s) from {}.",
                self.source.describe()
            ),
            Tone::Info,
        );

        let prompts = match self.source.fetch_pending(limit).await {
            Ok(prompts) => prompts,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch prompts");
                self.control
                    .publish_log(&format!("Failed to fetch prompts: {e}"), Tone::Error);
                self.control
                    .publish_status("Prompt source unavailable", Tone::Error);
                return Err(e.into());
            }
        };

        if prompts.is_empty() {
            return Ok(self.finish_empty());
        }
        self.run_with_shutdown(prompts, shutdown).await
    }

    /// Run `prompts` until none is pending and no job is in flight.
    pub async fn run(&self, prompts: Vec<Prompt>) -> Result<RunSummary, SchedulerError> {
        self.run_with_shutdown(prompts, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but stops dispatching once `shutdown` is
    /// cancelled. In-flight jobs are always drained before returning.
    pub async fn run_with_shutdown(
        &self,
        prompts: Vec<Prompt>,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, SchedulerError> {
        if let Err(e) = validate_prompts(&prompts) {
            self.control.publish_log(&e.to_string(), Tone::Error);
            self.control
                .publish_status("Invalid prompt backlog", Tone::Error);
            return Err(e.into());
        }
        if !prompts.iter().any(Prompt::is_pending) {
            return Ok(self.finish_empty());
        }

        let limit = WorkerLimit::new(
            self.config.worker_min,
            self.config.worker_max,
            self.config.initial_workers,
        )?;
        let mut ctx = RunContext::new(prompts, limit);

        self.control
            .publish_worker_limit(self.control.requested_worker_count(), &ctx.limit);
        self.control.publish_log(
            &format!(
                "Worker limit set to {} (range {}-{}).",
                ctx.limit.count(),
                ctx.limit.min(),
                ctx.limit.max()
            ),
            Tone::Info,
        );
        self.control.publish_log(
            &format!(
                "Starting automation: {} pending prompt(s), {} run(s) to go.",
                ctx.backlog.iter().filter(|p| p.is_pending()).count(),
                remaining_runs(&ctx.backlog)
            ),
            Tone::Info,
        );
        self.set_status(&mut ctx, "Active", Tone::Running);
        self.publish_stats(&ctx);

        self.run_loop(&mut ctx, &shutdown).await;

        // Drain whatever is still running.
        while let Some(joined) = ctx.in_flight.join_next_with_id().await {
            self.settle(&mut ctx, joined).await;
        }

        Ok(self.finish(ctx))
    }

    async fn run_loop(&self, ctx: &mut RunContext, shutdown: &CancellationToken) {
        let max_failures = self.config.max_failures_per_prompt;

        loop {
            if shutdown.is_cancelled() {
                self.control.publish_log(
                    "Shutdown requested. Waiting for in-flight jobs.",
                    Tone::Warn,
                );
                return;
            }

            // 1. Pause flag.
            if self.control.is_paused() {
                if !ctx.paused {
                    ctx.paused = true;
                    self.control
                        .publish_log("Pause enabled. Holding new prompts.", Tone::Warn);
                    self.set_status(ctx, "Paused", Tone::Idle);
                    self.publish_stats(ctx);
                }
                let tick = Some(self.config.pause_poll_interval);
                if let Wake::Joined(joined) = self.wait(ctx, shutdown, tick).await {
                    self.settle(ctx, joined).await;
                }
                continue;
            }
            if ctx.paused {
                ctx.paused = false;
                self.control
                    .publish_log("Resuming job queue.", Tone::Success);
                self.set_status(ctx, "Active", Tone::Running);
                self.publish_stats(ctx);
            }

            // 2. Worker limit.
            self.sync_worker_limit(ctx);

            // 3. Candidate selection.
            let Some(index) = ctx.next_candidate(max_failures) else {
                if ctx.in_flight.is_empty() {
                    return;
                }
                self.set_status(ctx, "Waiting for active renderings...", Tone::Running);
                if let Wake::Joined(joined) = self.wait(ctx, shutdown, None).await {
                    self.settle(ctx, joined).await;
                }
                continue;
            };

            // 4. Capacity.
            let capacity = ctx.limit.count() as usize;
            if ctx.in_flight.len() >= capacity {
                self.set_status(
                    ctx,
                    &format!("Worker limit reached ({capacity}) - waiting..."),
                    Tone::Running,
                );
                // Tick so a raised limit or a pause is noticed without
                // waiting for a completion.
                let tick = Some(self.config.pause_poll_interval);
                if let Wake::Joined(joined) = self.wait(ctx, shutdown, tick).await {
                    self.settle(ctx, joined).await;
                }
                continue;
            }

            // 5. Dispatch.
            self.dispatch(ctx, index);
        }
    }

    /// Wait for a job to finish, the optional tick, or shutdown.
    async fn wait(
        &self,
        ctx: &mut RunContext,
        shutdown: &CancellationToken,
        tick: Option<Duration>,
    ) -> Wake {
        let has_jobs = !ctx.in_flight.is_empty();
        tokio::select! {
            _ = shutdown.cancelled() => Wake::Shutdown,
            Some(joined) = ctx.in_flight.join_next_with_id(), if has_jobs => Wake::Joined(joined),
            _ = tokio::time::sleep(tick.unwrap_or_default()), if tick.is_some() => Wake::Tick,
        }
    }

    fn sync_worker_limit(&self, ctx: &mut RunContext) {
        let requested = self.control.requested_worker_count();
        if ctx.limit.adopt(requested) {
            tracing::info!(count = ctx.limit.count(), requested, "Worker limit adjusted");
            self.control.publish_log(
                &format!(
                    "Worker limit adjusted to {} concurrent job(s).",
                    ctx.limit.count()
                ),
                Tone::Info,
            );
            self.control.publish_worker_limit(requested, &ctx.limit);
            self.publish_stats(ctx);
        } else if requested != i64::from(ctx.limit.count()) {
            // Out-of-range request that clamps to the current count.
            self.control.publish_worker_limit(requested, &ctx.limit);
        }
    }

    fn dispatch(&self, ctx: &mut RunContext, index: usize) {
        let prompt = ctx.backlog[index].clone();
        let job_id = Uuid::now_v7();

        let newly_reserved = ctx.reserved.insert(prompt.id);
        debug_assert!(newly_reserved, "prompt {} reserved twice", prompt.id);

        self.control.publish_log(
            &format!("Starting prompt #{}: {}", prompt.id, prompt.label()),
            Tone::Info,
        );
        tracing::debug!(%job_id, prompt_id = prompt.id, "Dispatching job");

        let prompt_id = prompt.id;
        let runner = Arc::clone(&self.runner);
        let handle = ctx
            .in_flight
            .spawn(async move { runner.run(job_id, &prompt).await });
        ctx.tasks
            .insert(handle.id(), Dispatched { prompt_id, job_id });

        ctx.summary.dispatched += 1;
        ctx.summary.peak_in_flight = ctx.summary.peak_in_flight.max(ctx.in_flight.len());
        self.set_status(ctx, "Active", Tone::Running);
        self.publish_stats(ctx);
    }

    /// Fold a finished job back into the backlog and release its prompt.
    async fn settle(&self, ctx: &mut RunContext, joined: Joined) {
        let (task_id, outcome) = match joined {
            Ok((id, outcome)) => (id, Ok(outcome)),
            Err(e) => (e.id(), Err(e)),
        };
        let Some(Dispatched { prompt_id, job_id }) = ctx.tasks.remove(&task_id) else {
            tracing::error!(%task_id, "Finished task was never dispatched");
            return;
        };

        match outcome {
            Ok(Ok(success)) => self.record_success(ctx, prompt_id, success).await,
            Ok(Err(e)) => self.record_failure(ctx, prompt_id, job_id, &e.to_string()),
            Err(e) => self.record_failure(ctx, prompt_id, job_id, &format!("job task ended abnormally: {e}")),
        }

        ctx.reserved.remove(&prompt_id);
        self.publish_stats(ctx);
    }

    async fn record_success(&self, ctx: &mut RunContext, prompt_id: PromptId, success: JobSuccess) {
        ctx.summary.warnings += success.warnings.len();
        for warning in &success.warnings {
            self.control.publish_log(
                &format!(
                    "Prompt #{prompt_id}: control {} did not activate after {} check(s).",
                    warning.control, warning.attempts
                ),
                Tone::Warn,
            );
        }

        // The source of truth is updated before the in-memory counter.
        if let Err(e) = self.source.mark_success(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to record successful run");
            self.control.publish_log(
                &format!("Prompt #{prompt_id} rendered but could not be recorded: {e}. Leaving it pending."),
                Tone::Warn,
            );
            ctx.summary.unmarked_runs += 1;
            *ctx.failures.entry(prompt_id).or_insert(0) += 1;
            return;
        }

        let Some(prompt) = ctx.prompt_mut(prompt_id) else {
            return;
        };
        prompt.successful_runs += 1;
        let finished = !prompt.is_pending();
        let (done, expected) = (prompt.successful_runs, prompt.expected_runs);

        ctx.summary.succeeded_runs += 1;
        if finished {
            ctx.summary.completed_prompts += 1;
            self.control
                .publish_log(&format!("Prompt #{prompt_id} completed."), Tone::Success);
        } else {
            self.control.publish_log(
                &format!("Prompt #{prompt_id} run {done}/{expected} finished."),
                Tone::Success,
            );
        }
    }

    fn record_failure(&self, ctx: &mut RunContext, prompt_id: PromptId, job_id: Uuid, reason: &str) {
        ctx.summary.failed_jobs += 1;
        let failures = ctx.failures.entry(prompt_id).or_insert(0);
        *failures += 1;
        let failures = *failures;

        tracing::warn!(%job_id, prompt_id, failures, reason, "Job failed");
        self.control.publish_log(
            &format!("Prompt #{prompt_id} failed: {reason}"),
            Tone::Error,
        );
        if self
            .config
            .max_failures_per_prompt
            .is_some_and(|max| failures >= max)
        {
            self.control.publish_log(
                &format!("Prompt #{prompt_id} failed {failures} time(s). Skipping it for the rest of this run."),
                Tone::Warn,
            );
        }
    }

    fn finish(&self, mut ctx: RunContext) -> RunSummary {
        ctx.summary.outcome = if ctx.has_pending() {
            RunOutcome::StoppedEarly
        } else {
            RunOutcome::Completed
        };

        match ctx.summary.outcome {
            RunOutcome::Completed => {
                self.set_status(&mut ctx, "All prompts completed", Tone::Success);
                self.control
                    .publish_log("Automation finished.", Tone::Success);
            }
            RunOutcome::StoppedEarly => {
                self.set_status(&mut ctx, "Automation stopped", Tone::Idle);
                self.control.publish_log(
                    &format!(
                        "Automation stopped with {} run(s) still pending.",
                        remaining_runs(&ctx.backlog)
                    ),
                    Tone::Warn,
                );
            }
        }
        self.publish_stats(&ctx);

        let summary = ctx.summary;
        tracing::info!(
            dispatched = summary.dispatched,
            succeeded = summary.succeeded_runs,
            failed = summary.failed_jobs,
            completed_prompts = summary.completed_prompts,
            warnings = summary.warnings,
            outcome = ?summary.outcome,
            "Run finished",
        );
        summary
    }

    fn finish_empty(&self) -> RunSummary {
        self.control.publish_status("No pending prompts", Tone::Success);
        self.control.publish_log(
            "No pending prompts. Automation finished.",
            Tone::Info,
        );
        self.control.publish_stats(QueueStats::default());
        RunSummary::empty()
    }

    fn set_status(&self, ctx: &mut RunContext, text: &str, tone: Tone) {
        if ctx.last_status.as_deref() == Some(text) {
            return;
        }
        ctx.last_status = Some(text.to_string());
        self.control.publish_status(text, tone);
    }

    fn publish_stats(&self, ctx: &RunContext) {
        self.control.publish_stats(ctx.stats());
    }
}
