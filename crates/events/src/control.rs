//! Operator controls and the scheduler-facing collaborator interface.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use relay_core::types::PromptId;
use relay_core::worker_limit::WorkerLimit;
use uuid::Uuid;

use crate::bus::{EventBus, RunEvent, RunEventKind, Tone};
use crate::stats::QueueStats;

/// What the scheduler reads from, and reports to, the operator side.
///
/// The two reads are the only inputs that influence scheduling decisions.
/// Everything else is fire-and-forget narration.
pub trait StatsControl: Send + Sync {
    /// Whether dispatch of new jobs is currently held.
    fn is_paused(&self) -> bool;

    /// The worker count the operator asked for, unclamped.
    fn requested_worker_count(&self) -> i64;

    fn publish_stats(&self, stats: QueueStats);

    fn publish_status(&self, text: &str, tone: Tone);

    fn publish_log(&self, message: &str, tone: Tone);

    fn publish_job_progress(&self, job_id: Uuid, prompt_id: PromptId, status: &str, percent: u8);

    /// Report the effective worker limit after clamping.
    ///
    /// `requested` is the value read from [`requested_worker_count`]
    /// that produced `limit`. The clamped count replaces it only if no
    /// newer request arrived in the meantime.
    ///
    /// [`requested_worker_count`]: StatsControl::requested_worker_count
    fn publish_worker_limit(&self, requested: i64, limit: &WorkerLimit);
}

/// Standard [`StatsControl`]: atomically readable controls plus an
/// [`EventBus`] for notifications.
///
/// Cloned cheaply via `Arc`; the operator console writes the controls and
/// the scheduler reads them once per iteration.
pub struct ControlPanel {
    paused: AtomicBool,
    requested_workers: AtomicI64,
    bus: Arc<EventBus>,
}

impl ControlPanel {
    pub fn new(bus: Arc<EventBus>, initial_workers: i64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            requested_workers: AtomicI64::new(initial_workers),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    /// Ask for a different worker count. The scheduler clamps it.
    pub fn request_workers(&self, count: i64) {
        self.requested_workers.store(count, Ordering::SeqCst);
    }

    fn emit(&self, kind: RunEventKind) {
        self.bus.publish(RunEvent::new(kind));
    }
}

impl StatsControl for ControlPanel {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn requested_worker_count(&self) -> i64 {
        self.requested_workers.load(Ordering::SeqCst)
    }

    fn publish_stats(&self, stats: QueueStats) {
        self.emit(RunEventKind::Stats(stats));
    }

    fn publish_status(&self, text: &str, tone: Tone) {
        self.emit(RunEventKind::Status {
            text: text.to_string(),
            tone,
        });
    }

    fn publish_log(&self, message: &str, tone: Tone) {
        self.emit(RunEventKind::Log {
            message: message.to_string(),
            tone,
        });
    }

    fn publish_job_progress(&self, job_id: Uuid, prompt_id: PromptId, status: &str, percent: u8) {
        self.emit(RunEventKind::JobProgress {
            job_id,
            prompt_id,
            status: status.to_string(),
            percent,
        });
    }

    fn publish_worker_limit(&self, requested: i64, limit: &WorkerLimit) {
        // Write the clamped value back so the control shows what is in effect.
        let _ = self.requested_workers.compare_exchange(
            requested,
            i64::from(limit.count()),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.emit(RunEventKind::WorkerLimit {
            count: limit.count(),
            min: limit.min(),
            max: limit.max(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> ControlPanel {
        ControlPanel::new(Arc::new(EventBus::default()), 1)
    }

    #[test]
    fn toggle_pause_flips_and_reports() {
        let panel = panel();
        assert!(!panel.is_paused());
        assert!(panel.toggle_pause());
        assert!(panel.is_paused());
        assert!(!panel.toggle_pause());
        assert!(!panel.is_paused());
    }

    #[test]
    fn requested_workers_are_stored_unclamped() {
        let panel = panel();
        panel.request_workers(9);
        assert_eq!(panel.requested_worker_count(), 9);
    }

    #[tokio::test]
    async fn worker_limit_is_written_back_and_published() {
        let panel = panel();
        let mut rx = panel.bus().subscribe();
        panel.request_workers(9);

        let mut limit = WorkerLimit::new(1, 2, 1).unwrap();
        let requested = panel.requested_worker_count();
        limit.adopt(requested);
        panel.publish_worker_limit(requested, &limit);

        assert_eq!(panel.requested_worker_count(), 2);
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.kind,
            RunEventKind::WorkerLimit {
                count: 2,
                min: 1,
                max: 2
            }
        );
    }

    #[tokio::test]
    async fn newer_request_survives_write_back() {
        let panel = panel();
        let mut rx = panel.bus().subscribe();
        panel.request_workers(9);

        let mut limit = WorkerLimit::new(1, 2, 1).unwrap();
        let requested = panel.requested_worker_count();
        limit.adopt(requested);
        // The operator changes their mind before the clamp is written back.
        panel.request_workers(1);
        panel.publish_worker_limit(requested, &limit);

        assert_eq!(panel.requested_worker_count(), 1);
        assert_eq!(
            rx.recv().await.unwrap().kind,
            RunEventKind::WorkerLimit {
                count: 2,
                min: 1,
                max: 2
            }
        );
    }

    #[tokio::test]
    async fn notifications_reach_the_bus() {
        let panel = panel();
        let mut rx = panel.bus().subscribe();

        panel.publish_status("Paused", Tone::Idle);
        panel.publish_log("Pause enabled", Tone::Warn);

        assert_eq!(
            rx.recv().await.unwrap().kind,
            RunEventKind::Status {
                text: "Paused".into(),
                tone: Tone::Idle
            }
        );
        assert_eq!(
            rx.recv().await.unwrap().kind,
            RunEventKind::Log {
                message: "Pause enabled".into(),
                tone: Tone::Warn
            }
        );
    }
}
