//! Operator console: line commands on stdin that drive the control panel.
//!
//! | Command              | Effect                                  |
//! |----------------------|-----------------------------------------|
//! | `pause`              | hold new dispatches                     |
//! | `resume`             | release the hold                        |
//! | `toggle`, `p`        | flip the pause flag                     |
//! | `workers N`, `w N`   | request `N` concurrent jobs (clamped)   |
//! | `stop`, `quit`, `q`  | stop dispatching and drain running jobs |

use std::sync::Arc;

use relay_events::{ControlPanel, StatsControl, Tone};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Toggle,
    Workers(i64),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Expected a worker count, got {0:?}")]
    InvalidCount(String),
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "toggle" | "p" => ConsoleCommand::Toggle,
        "stop" | "quit" | "q" => ConsoleCommand::Stop,
        "workers" | "w" => {
            let raw = words.next().unwrap_or_default();
            let count = raw
                .parse()
                .map_err(|_| CommandError::InvalidCount(raw.to_string()))?;
            ConsoleCommand::Workers(count)
        }
        _ => return Err(CommandError::Unknown(head.to_string())),
    };
    Ok(Some(command))
}

/// Apply a parsed command to the panel.
pub fn apply(command: ConsoleCommand, panel: &ControlPanel, shutdown: &CancellationToken) {
    match command {
        ConsoleCommand::Pause => panel.set_paused(true),
        ConsoleCommand::Resume => panel.set_paused(false),
        ConsoleCommand::Toggle => {
            let paused = panel.toggle_pause();
            tracing::info!(paused, "Pause toggled");
        }
        ConsoleCommand::Workers(count) => {
            panel.request_workers(count);
            tracing::info!(requested = count, "Worker count requested");
        }
        ConsoleCommand::Stop => {
            panel.publish_log("Stop requested from console.", Tone::Warn);
            shutdown.cancel();
        }
    }
}

/// Read commands from `reader` until it closes or `shutdown` fires.
pub async fn run_console<R>(reader: R, panel: Arc<ControlPanel>, shutdown: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match parse_command(&line) {
                Ok(Some(command)) => apply(command, &panel, &shutdown),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Ignoring console input"),
            },
            Ok(None) => {
                tracing::debug!("Console input closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read console input");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_events::EventBus;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_command("pause"), Ok(Some(ConsoleCommand::Pause)));
        assert_eq!(parse_command(" RESUME "), Ok(Some(ConsoleCommand::Resume)));
        assert_eq!(parse_command("p"), Ok(Some(ConsoleCommand::Toggle)));
        assert_eq!(parse_command("w 3"), Ok(Some(ConsoleCommand::Workers(3))));
        assert_eq!(parse_command("workers -1"), Ok(Some(ConsoleCommand::Workers(-1))));
        assert_eq!(parse_command("q"), Ok(Some(ConsoleCommand::Stop)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert_matches!(parse_command("launch"), Err(CommandError::Unknown(cmd)) if cmd == "launch");
        assert_matches!(parse_command("workers"), Err(CommandError::InvalidCount(_)));
        assert_matches!(parse_command("w many"), Err(CommandError::InvalidCount(raw)) if raw == "many");
    }

    #[tokio::test]
    async fn console_drives_the_panel() {
        let panel = Arc::new(ControlPanel::new(Arc::new(EventBus::default()), 1));
        let shutdown = CancellationToken::new();
        let input: &[u8] = b"pause\nworkers 2\nbogus\n";

        run_console(input, panel.clone(), shutdown.clone()).await;

        assert!(panel.is_paused());
        assert_eq!(panel.requested_worker_count(), 2);
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn stop_cancels_the_run() {
        let panel = Arc::new(ControlPanel::new(Arc::new(EventBus::default()), 1));
        let shutdown = CancellationToken::new();
        let input: &[u8] = b"toggle\nstop\nresume\n";

        run_console(input, panel.clone(), shutdown.clone()).await;

        assert!(shutdown.is_cancelled());
        // Lines after `stop` are not processed.
        assert!(panel.is_paused());
    }
}
