//! Operator controls observed by a running scheduler: pause, worker
//! limit changes and shutdown.

mod common;

use std::time::Duration;

use common::{active_counts, logs, prompts, statuses, Harness};
use relay_events::StatsControl;
use relay_pipeline::RunOutcome;
use tokio_util::sync::CancellationToken;

fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

// ---------------------------------------------------------------------------
// Test: nothing is dispatched while paused
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn paused_before_start_dispatches_nothing() {
    let backlog = prompts(&[1, 2], 1);
    let mut h = Harness::simple(backlog.clone(), 2);
    h.panel.set_paused(true);

    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, Duration::from_secs(2));
    let summary = h
        .scheduler
        .run_with_shutdown(backlog, shutdown)
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.outcome, RunOutcome::StoppedEarly);
    assert!(h.surface.submissions().is_empty());

    let events = h.drain();
    assert!(active_counts(&events).iter().all(|&active| active == 0));
    assert!(logs(&events)
        .iter()
        .any(|l| l == "Pause enabled. Holding new prompts."));
    assert!(statuses(&events).contains(&"Paused".to_string()));
}

#[tokio::test(start_paused = true)]
async fn resuming_continues_the_queue() {
    let backlog = prompts(&[1], 1);
    let mut h = Harness::simple(backlog.clone(), 1);
    h.panel.set_paused(true);

    let panel = h.panel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        panel.set_paused(false);
    });
    let summary = h.scheduler.run(backlog).await.unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.outcome, RunOutcome::Completed);

    let events = h.drain();
    assert!(logs(&events).iter().any(|l| l == "Resuming job queue."));
    let status_lines = statuses(&events);
    let paused_at = status_lines.iter().position(|s| s == "Paused").unwrap();
    assert_eq!(status_lines[paused_at + 1], "Active");
}

#[tokio::test(start_paused = true)]
async fn pause_does_not_interrupt_running_jobs() {
    let backlog = prompts(&[1, 2], 1);
    let mut h = Harness::simple(backlog.clone(), 1);

    let panel = h.panel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        panel.set_paused(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        panel.set_paused(false);
    });
    let summary = h.scheduler.run(backlog).await.unwrap();

    assert_eq!(summary.dispatched, 2);
    let log_lines = logs(&h.drain());
    let first_done = log_lines
        .iter()
        .position(|l| l == "Prompt #1 completed.")
        .unwrap();
    let resumed = log_lines
        .iter()
        .position(|l| l == "Resuming job queue.")
        .unwrap();
    let second_started = log_lines
        .iter()
        .position(|l| l.starts_with("Starting prompt #2"))
        .unwrap();
    assert!(first_done < resumed);
    assert!(resumed < second_started);
}

// ---------------------------------------------------------------------------
// Test: worker limit changes take effect mid-run
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn raised_worker_limit_allows_more_jobs() {
    let backlog = prompts(&[1, 2, 3, 4], 1);
    let mut h = Harness::simple(backlog.clone(), 1);

    let panel = h.panel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        panel.request_workers(2);
    });
    let summary = h.scheduler.run(backlog).await.unwrap();

    assert_eq!(summary.peak_in_flight, 2);
    assert!(logs(&h.drain())
        .iter()
        .any(|l| l == "Worker limit adjusted to 2 concurrent job(s)."));
}

#[tokio::test(start_paused = true)]
async fn out_of_range_request_is_clamped_and_written_back() {
    let backlog = prompts(&[1, 2, 3], 1);
    let mut h = Harness::simple(backlog.clone(), 1);

    let panel = h.panel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        panel.request_workers(7);
    });
    let summary = h.scheduler.run(backlog).await.unwrap();

    assert_eq!(summary.peak_in_flight, 2);
    assert_eq!(h.panel.requested_worker_count(), 2);
    let events = h.drain();
    assert!(active_counts(&events).iter().all(|&active| active <= 2));
}

// ---------------------------------------------------------------------------
// Test: shutdown stops dispatch and drains in-flight jobs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_drains_in_flight_jobs() {
    let backlog = prompts(&[1, 2, 3], 1);
    let mut h = Harness::simple(backlog.clone(), 1);

    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, Duration::from_millis(300));
    let summary = h
        .scheduler
        .run_with_shutdown(backlog, shutdown)
        .await
        .unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.succeeded_runs, 1);
    assert_eq!(summary.outcome, RunOutcome::StoppedEarly);
    assert_eq!(h.source.marks(), vec![1]);

    let events = h.drain();
    assert!(logs(&events)
        .iter()
        .any(|l| l == "Shutdown requested. Waiting for in-flight jobs."));
    assert_eq!(
        statuses(&events).last().map(String::as_str),
        Some("Automation stopped")
    );
}
