//! Run narration and operator controls.
//!
//! This crate is the scheduler's Stats/Control collaborator:
//!
//! - [`EventBus`]: in-process publish/subscribe hub for [`RunEvent`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`StatsControl`]: the narrow interface the scheduler talks to: two
//!   reads (pause flag, requested worker count) and fire-and-forget
//!   notifications.
//! - [`ControlPanel`]: the standard [`StatsControl`]: atomic control
//!   state plus an [`EventBus`].
//! - [`EventLogger`]: background sink that renders every event as a
//!   tracing line.

pub mod bus;
pub mod control;
pub mod logger;
pub mod stats;

pub use bus::{EventBus, RunEvent, RunEventKind, Tone};
pub use control::{ControlPanel, StatsControl};
pub use logger::EventLogger;
pub use stats::QueueStats;
