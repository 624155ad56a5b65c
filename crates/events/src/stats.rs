use serde::{Deserialize, Serialize};

/// Live queue metrics published by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs currently in flight.
    pub active: usize,
    /// Runs still owed that are not currently in flight.
    pub queued: u64,
    /// Prompts that reached their expected run count during this run.
    pub completed_total: usize,
}

impl QueueStats {
    /// Derive the published figures from the scheduler's raw counters.
    ///
    /// `queued` is `remaining_runs - active`, floored at zero.
    pub fn compute(active: usize, remaining_runs: u64, completed_total: usize) -> Self {
        Self {
            active,
            queued: remaining_runs.saturating_sub(active as u64),
            completed_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_excludes_active() {
        let stats = QueueStats::compute(2, 5, 1);
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.completed_total, 1);
    }

    #[test]
    fn queued_never_negative() {
        assert_eq!(QueueStats::compute(3, 1, 0).queued, 0);
    }
}
