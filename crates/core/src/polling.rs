//! Retry-with-timeout combinator shared by every polling loop.
//!
//! [`poll_until`] repeatedly runs a check on a fixed interval until it
//! reports [`PollStep::Ready`] or the [`PollPolicy`] budget (total time,
//! and optionally attempt count) is spent. Both the render-progress poll
//! and the control-activation poll go through here so their timeout
//! semantics stay identical.
//!
//! Each check is itself bounded by the time left in the budget, so a
//! check that never resolves cannot hold the loop past its timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Interval and budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between consecutive checks.
    pub interval: Duration,
    /// Total time allowed, measured from the first check.
    pub timeout: Duration,
    /// Optional cap on the number of checks.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// A policy bounded only by total elapsed time.
    pub fn with_timeout(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_attempts: None,
        }
    }

    /// A policy bounded by a number of checks spaced `interval` apart.
    pub fn with_attempts(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            timeout: interval.saturating_mul(attempts),
            max_attempts: Some(attempts),
        }
    }
}

/// Observation recorded for a check cut short by the remaining budget.
pub const CHECK_TIMED_OUT: &str = "check timed out";

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// The awaited condition holds.
    Ready(T),
    /// Not yet; the string describes what was observed instead.
    Pending(String),
}

/// Successful completion of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReady<T> {
    pub value: T,
    /// Number of checks performed, including the successful one.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// The budget ran out before the condition held.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Gave up after {attempts} attempts in {elapsed:?}: {last_observation}")]
pub struct PollExhausted {
    pub attempts: u32,
    pub elapsed: Duration,
    /// The diagnostic from the last pending check.
    pub last_observation: String,
}

/// Run `check` until it is ready or the policy budget is spent.
///
/// The first check runs immediately. Each check may run for at most the
/// time left in the budget; one that overruns counts as pending with
/// [`CHECK_TIMED_OUT`]. After each pending check the loop gives up if the
/// attempt cap is reached or the elapsed time has reached the timeout;
/// otherwise it sleeps for `policy.interval` and tries again.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    mut check: F,
) -> Result<PollReady<T>, PollExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        let step = tokio::time::timeout(remaining, check(attempts))
            .await
            .unwrap_or_else(|_| PollStep::Pending(CHECK_TIMED_OUT.to_string()));
        let last_observation = match step {
            PollStep::Ready(value) => {
                return Ok(PollReady {
                    value,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            PollStep::Pending(observation) => observation,
        };

        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        if out_of_attempts || start.elapsed() >= policy.timeout {
            return Err(PollExhausted {
                attempts,
                elapsed: start.elapsed(),
                last_observation,
            });
        }

        tokio::time::sleep(policy.interval).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
