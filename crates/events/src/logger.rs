//! Tracing sink for run events.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and renders every [`RunEvent`] as a structured tracing line. It runs as
//! a long-lived background task and exits when the bus is dropped.

use tokio::sync::broadcast;

use crate::bus::{RunEvent, RunEventKind, Tone};

/// Background service that writes run events to the log.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the channel is closed.
    pub async fn run(mut receiver: broadcast::Receiver<RunEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => Self::render(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, logger shutting down");
                    break;
                }
            }
        }
    }

    fn render(event: &RunEvent) {
        match &event.kind {
            RunEventKind::Stats(stats) => {
                tracing::info!(
                    active = stats.active,
                    queued = stats.queued,
                    completed = stats.completed_total,
                    "Queue stats",
                );
            }
            RunEventKind::Status { text, tone } => match tone {
                Tone::Warn => tracing::warn!(status = %text, "Status"),
                Tone::Error => tracing::error!(status = %text, "Status"),
                _ => tracing::info!(status = %text, "Status"),
            },
            RunEventKind::Log { message, tone } => match tone {
                Tone::Warn => tracing::warn!("{message}"),
                Tone::Error => tracing::error!("{message}"),
                _ => tracing::info!("{message}"),
            },
            RunEventKind::JobProgress {
                job_id,
                prompt_id,
                status,
                percent,
            } => {
                tracing::debug!(%job_id, prompt_id, percent, "{status}");
            }
            RunEventKind::WorkerLimit { count, min, max } => {
                tracing::info!(count, min, max, "Worker limit");
            }
        }
    }
}
