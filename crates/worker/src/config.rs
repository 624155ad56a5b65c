//! Worker configuration loaded from environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use relay_core::error::CoreError;
use relay_pipeline::{JobConfig, SchedulerConfig};
use relay_source::{SourceConfig, DEFAULT_FETCH_LIMIT};

/// Default prompt file when no API is configured.
pub const DEFAULT_PROMPTS_FILE: &str = "prompts.json";

/// A variable was present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid scheduler settings: {0}")]
    Scheduler(#[from] CoreError),
}

/// Everything the worker needs to start a run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
    /// Maximum number of prompts fetched for one run.
    pub fetch_limit: usize,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default        |
    /// |---------------------------|----------------|
    /// | `WORKER_MIN`              | `1`            |
    /// | `WORKER_MAX`              | `2`            |
    /// | `WORKERS`                 | `1`            |
    /// | `PAUSE_POLL_MS`           | `600`          |
    /// | `POLL_INTERVAL_MS`        | `2000`         |
    /// | `JOB_TIMEOUT_SECS`        | `600`          |
    /// | `ACTIVATION_INTERVAL_MS`  | `2000`         |
    /// | `ACTIVATION_RETRIES`      | `20`           |
    /// | `CLICK_SETTLE_MS`         | `1000`         |
    /// | `INVOCATION_MARKER`       | `/imagine`     |
    /// | `PROMPT_SUFFIX`           | (none)         |
    /// | `MAX_FAILURES_PER_PROMPT` | `3` (`0` = unlimited) |
    /// | `FETCH_LIMIT`             | `20`           |
    /// | `PROMPT_SOURCE`           | `api` if `API` is set, else `file` |
    /// | `API`                     | (none)         |
    /// | `API_SECRET`              | (none)         |
    /// | `PROMPTS_FILE`            | `prompts.json` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let defaults = SchedulerConfig::default();
        let job_defaults = JobConfig::default();

        let job = JobConfig {
            poll_interval: millis(&get, "POLL_INTERVAL_MS", job_defaults.poll_interval)?,
            job_timeout: Duration::from_secs(parse(
                &get,
                "JOB_TIMEOUT_SECS",
                job_defaults.job_timeout.as_secs(),
            )?),
            activation_interval: millis(
                &get,
                "ACTIVATION_INTERVAL_MS",
                job_defaults.activation_interval,
            )?,
            activation_retries: parse(&get, "ACTIVATION_RETRIES", job_defaults.activation_retries)?,
            click_settle: millis(&get, "CLICK_SETTLE_MS", job_defaults.click_settle)?,
            invocation_marker: get("INVOCATION_MARKER")
                .map(str::to_string)
                .unwrap_or(job_defaults.invocation_marker),
            prompt_suffix: get("PROMPT_SUFFIX").map(str::to_string),
            expected_controls: job_defaults.expected_controls,
        };

        let max_failures: u32 = parse(
            &get,
            "MAX_FAILURES_PER_PROMPT",
            defaults.max_failures_per_prompt.unwrap_or(0),
        )?;

        let scheduler = SchedulerConfig {
            worker_min: parse(&get, "WORKER_MIN", defaults.worker_min)?,
            worker_max: parse(&get, "WORKER_MAX", defaults.worker_max)?,
            initial_workers: parse(&get, "WORKERS", defaults.initial_workers)?,
            pause_poll_interval: millis(&get, "PAUSE_POLL_MS", defaults.pause_poll_interval)?,
            max_failures_per_prompt: (max_failures > 0).then_some(max_failures),
            job,
        };
        scheduler.validate()?;

        let source = match get("PROMPT_SOURCE").map(str::to_ascii_lowercase).as_deref() {
            Some("api") => api_source(&get)?,
            Some("file") => file_source(&get),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PROMPT_SOURCE",
                    value: other.to_string(),
                    reason: "expected `api` or `file`".into(),
                })
            }
            None if get("API").is_some() => api_source(&get)?,
            None => file_source(&get),
        };

        Ok(Self {
            scheduler,
            source,
            fetch_limit: parse(&get, "FETCH_LIMIT", DEFAULT_FETCH_LIMIT)?,
        })
    }
}

fn api_source<'a>(get: &impl Fn(&str) -> Option<&'a str>) -> Result<SourceConfig, ConfigError> {
    let url = get("API").ok_or(ConfigError::Missing("API"))?;
    Ok(SourceConfig::Api {
        url: url.to_string(),
        secret: get("API_SECRET").map(str::to_string),
    })
}

fn file_source<'a>(get: &impl Fn(&str) -> Option<&'a str>) -> SourceConfig {
    SourceConfig::File {
        path: PathBuf::from(get("PROMPTS_FILE").unwrap_or(DEFAULT_PROMPTS_FILE)),
    }
}

fn parse<'a, T>(
    get: &impl Fn(&str) -> Option<&'a str>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn millis<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let ms = parse(get, var, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_variables() {
        let config = WorkerConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.scheduler.worker_min, 1);
        assert_eq!(config.scheduler.worker_max, 2);
        assert_eq!(config.scheduler.initial_workers, 1);
        assert_eq!(config.scheduler.max_failures_per_prompt, Some(3));
        assert_eq!(config.scheduler.job.job_timeout, Duration::from_secs(600));
        assert_eq!(config.scheduler.job.activation_retries, 20);
        assert_eq!(config.scheduler.job.invocation_marker, "/imagine");
        assert_eq!(config.fetch_limit, 20);
        assert_eq!(
            config.source,
            SourceConfig::File {
                path: PathBuf::from("prompts.json")
            }
        );
    }

    #[test]
    fn api_is_chosen_when_url_is_set() {
        let config = WorkerConfig::from_vars(&vars(&[
            ("API", "https://prompts.example"),
            ("API_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(
            config.source,
            SourceConfig::Api {
                url: "https://prompts.example".into(),
                secret: Some("s3cret".into())
            }
        );
    }

    #[test]
    fn explicit_api_source_requires_url() {
        let result = WorkerConfig::from_vars(&vars(&[("PROMPT_SOURCE", "api")]));
        assert_matches!(result, Err(ConfigError::Missing("API")));
    }

    #[test]
    fn explicit_file_source_wins_over_api() {
        let config = WorkerConfig::from_vars(&vars(&[
            ("PROMPT_SOURCE", "file"),
            ("API", "https://prompts.example"),
            ("PROMPTS_FILE", "backlog.json"),
        ]))
        .unwrap();

        assert_eq!(
            config.source,
            SourceConfig::File {
                path: PathBuf::from("backlog.json")
            }
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = WorkerConfig::from_vars(&vars(&[
            ("WORKERS", "2"),
            ("POLL_INTERVAL_MS", "250"),
            ("JOB_TIMEOUT_SECS", "60"),
            ("ACTIVATION_RETRIES", "100"),
            ("PROMPT_SUFFIX", "--ar 8:3"),
            ("MAX_FAILURES_PER_PROMPT", "0"),
            ("FETCH_LIMIT", "5"),
        ]))
        .unwrap();

        assert_eq!(config.scheduler.initial_workers, 2);
        assert_eq!(config.scheduler.job.poll_interval, Duration::from_millis(250));
        assert_eq!(config.scheduler.job.job_timeout, Duration::from_secs(60));
        assert_eq!(config.scheduler.job.activation_retries, 100);
        assert_eq!(config.scheduler.job.prompt_suffix.as_deref(), Some("--ar 8:3"));
        assert_eq!(config.scheduler.max_failures_per_prompt, None);
        assert_eq!(config.fetch_limit, 5);
    }

    #[test]
    fn malformed_number_is_an_error() {
        let result = WorkerConfig::from_vars(&vars(&[("WORKER_MAX", "two")]));
        assert_matches!(
            result,
            Err(ConfigError::Invalid { var: "WORKER_MAX", value, .. }) if value == "two"
        );
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let result = WorkerConfig::from_vars(&vars(&[("WORKER_MIN", "3"), ("WORKER_MAX", "2")]));
        assert_matches!(result, Err(ConfigError::Scheduler(_)));
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let result = WorkerConfig::from_vars(&vars(&[("PROMPT_SOURCE", "ftp")]));
        assert_matches!(result, Err(ConfigError::Invalid { var: "PROMPT_SOURCE", .. }));
    }
}
