//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries the user-facing narration of a scheduling run:
//! queue stats, status line, log feed, and per-job progress. It is shared
//! via `Arc<EventBus>` between the scheduler and any number of sinks.

use chrono::Utc;
use relay_core::types::{PromptId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::stats::QueueStats;

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// Visual weight of a status or log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Idle,
    Running,
    Info,
    Success,
    Warn,
    Error,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    /// Queue metrics changed.
    Stats(QueueStats),
    /// The one-line run status changed.
    Status { text: String, tone: Tone },
    /// A line for the run log.
    Log { message: String, tone: Tone },
    /// A job moved through its phases.
    JobProgress {
        job_id: Uuid,
        prompt_id: PromptId,
        status: String,
        /// Completion percentage (0-100).
        percent: u8,
    },
    /// The effective worker limit, after clamping.
    WorkerLimit { count: u32, min: u32, max: u32 },
}

/// An event on the bus, stamped with the time it was published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    #[serde(flatten)]
    pub kind: RunEventKind,
    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl RunEvent {
    pub fn new(kind: RunEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use relay_events::bus::{EventBus, RunEvent, RunEventKind, Tone};
///
/// let bus = EventBus::default();
/// let _rx = bus.subscribe();
///
/// bus.publish(RunEvent::new(RunEventKind::Log {
///     message: "Starting".into(),
///     tone: Tone::Info,
/// }));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: RunEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
