//! Bounded concurrency cap for the scheduler.
//!
//! The operator may request any worker count; the scheduler only ever
//! adopts values clamped into `[min, max]`.

use serde::Serialize;

use crate::error::CoreError;

/// Default lower bound on concurrent jobs.
pub const DEFAULT_WORKER_MIN: u32 = 1;

/// Default upper bound on concurrent jobs.
pub const DEFAULT_WORKER_MAX: u32 = 2;

/// Current concurrency cap plus its bounds.
///
/// Invariant: `1 <= min <= count <= max` whenever the value is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerLimit {
    count: u32,
    min: u32,
    max: u32,
}

impl WorkerLimit {
    /// Build a limit from bounds and an initial request.
    ///
    /// The initial value is clamped like any later request. Bounds with
    /// `min == 0` or `min > max` are rejected.
    pub fn new(min: u32, max: u32, initial: i64) -> Result<Self, CoreError> {
        if min == 0 {
            return Err(CoreError::Validation(
                "Worker minimum must be at least 1".to_string(),
            ));
        }
        if min > max {
            return Err(CoreError::Validation(format!(
                "Worker minimum ({min}) must not exceed maximum ({max})"
            )));
        }

        let mut limit = Self {
            count: min,
            min,
            max,
        };
        limit.count = limit.clamp(initial);
        Ok(limit)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Clamp an arbitrary requested count into `[min, max]`.
    pub fn clamp(&self, requested: i64) -> u32 {
        requested.clamp(i64::from(self.min), i64::from(self.max)) as u32
    }

    /// Adopt a requested count after clamping it.
    ///
    /// Returns `true` if the effective cap changed.
    pub fn adopt(&mut self, requested: i64) -> bool {
        let next = self.clamp(requested);
        let changed = next != self.count;
        self.count = next;
        changed
    }
}

impl Default for WorkerLimit {
    fn default() -> Self {
        Self {
            count: DEFAULT_WORKER_MIN,
            min: DEFAULT_WORKER_MIN,
            max: DEFAULT_WORKER_MAX,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
