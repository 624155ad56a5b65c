//! `relay-worker` -- runs the prompt scheduler from the command line.
//!
//! Fetches pending prompts from the configured source, runs them against
//! the simulated rendering surface, and narrates the run through tracing.
//! Operator commands are read from stdin (see [`relay_worker::console`]).
//!
//! No browser-driving surface is linked into this binary, so every run is
//! a dry run: the prompt source is wrapped so that successes are logged
//! but never written back.
//!
//! Configuration comes from the environment (and `.env`); see
//! [`WorkerConfig::from_env`] for the full table.

use std::sync::Arc;

use relay_events::{ControlPanel, EventBus, EventLogger};
use relay_pipeline::{RunOutcome, Scheduler};
use relay_surface::{SimulatedSurface, SimulationScript};
use relay_worker::config::WorkerConfig;
use relay_worker::console;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_worker=info,relay_pipeline=info,relay_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let source = config.source.build(true);
    tracing::info!(
        source = %source.describe(),
        workers = config.scheduler.initial_workers,
        fetch_limit = config.fetch_limit,
        "Starting relay-worker (dry run)",
    );

    // --- Event bus and operator controls ---

    let bus = Arc::new(EventBus::default());
    let logger = tokio::spawn(EventLogger::run(bus.subscribe()));
    let panel = Arc::new(ControlPanel::new(
        Arc::clone(&bus),
        config.scheduler.initial_workers,
    ));

    let surface = Arc::new(SimulatedSurface::new(SimulationScript::default()));
    let scheduler = Scheduler::new(surface, source, panel.clone(), config.scheduler.clone())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to create scheduler");
            std::process::exit(1);
        });

    let shutdown = CancellationToken::new();
    tokio::spawn(console::run_console(
        tokio::io::BufReader::new(tokio::io::stdin()),
        panel.clone(),
        shutdown.clone(),
    ));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, draining in-flight jobs");
            shutdown.cancel();
        });
    }

    // --- Run ---

    let result = scheduler
        .run_from_source(config.fetch_limit, shutdown.clone())
        .await;

    // Stop the console and let the logger flush what is left on the bus.
    shutdown.cancel();
    drop(scheduler);
    drop(panel);
    drop(bus);
    let _ = logger.await;

    let code = match result {
        Ok(summary) => {
            tracing::info!(
                dispatched = summary.dispatched,
                succeeded = summary.succeeded_runs,
                failed = summary.failed_jobs,
                warnings = summary.warnings,
                outcome = ?summary.outcome,
                "Run summary",
            );
            match summary.outcome {
                RunOutcome::Completed => 0,
                RunOutcome::StoppedEarly => 2,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            1
        }
    };

    // Exit explicitly: a pending stdin read would otherwise hold up runtime
    // shutdown.
    std::process::exit(code);
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
