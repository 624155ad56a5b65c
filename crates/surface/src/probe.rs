//! Observable states of a rendered artifact.
//!
//! [`ProbeResult`] is the closed set of states the scheduler interprets.
//! [`classify_content`] turns the raw text and control labels scraped
//! from an artifact into one of them, for surface implementations that
//! read text rather than structured state.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Marker text shown while the render is queued on the remote side.
pub const WAITING_MARKER: &str = "Waiting";

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)%").expect("valid regex"));

static FINALIZING_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^U[1-4]$").expect("valid regex"));

/// What a probe observed for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeResult {
    /// The artifact exists but rendering has not started.
    Waiting,
    /// Rendering is under way.
    Progress { percent: u8 },
    /// Rendering finished; these finalizing controls are available, in
    /// on-screen order.
    ReadyWithControls { controls: Vec<String> },
}

impl ProbeResult {
    /// Short description used in job diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Waiting => "waiting to start".to_string(),
            Self::Progress { percent } => format!("rendering {percent}%"),
            Self::ReadyWithControls { controls } => {
                format!("ready with {} control(s): {}", controls.len(), controls.join(", "))
            }
        }
    }
}

/// Extract the first `N%` from `text`.
///
/// No match yields `0`; values above 100 are clamped, including digit
/// runs too long for any integer type.
pub fn parse_percent(text: &str) -> u8 {
    PERCENT_RE
        .captures(text)
        // The capture is all digits, so a parse error can only be overflow.
        .map(|caps| caps[1].parse::<u32>().map_or(100, |p| p.min(100)) as u8)
        .unwrap_or(0)
}

/// Whether `label` names one of the finalizing (upscale) controls.
pub fn is_finalizing_label(label: &str) -> bool {
    FINALIZING_LABEL_RE.is_match(label.trim())
}

/// Classify an artifact from its visible text and control labels.
///
/// - text containing [`WAITING_MARKER`] is [`ProbeResult::Waiting`];
/// - text containing `%` is [`ProbeResult::Progress`];
/// - anything else is ready, with only the finalizing labels kept.
pub fn classify_content<S: AsRef<str>>(content: &str, control_labels: &[S]) -> ProbeResult {
    if content.contains(WAITING_MARKER) {
        return ProbeResult::Waiting;
    }
    if content.contains('%') {
        return ProbeResult::Progress {
            percent: parse_percent(content),
        };
    }

    let controls = control_labels
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| is_finalizing_label(l))
        .map(str::to_string)
        .collect();
    ProbeResult::ReadyWithControls { controls }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
