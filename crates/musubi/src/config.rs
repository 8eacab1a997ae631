//! Engine-wide execution limits.

use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Execution limits applied to every run of a workflow.
///
/// Deserializable from any serde format; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use musubi::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.step_timeout(), Duration::from_secs(30));
/// assert_eq!(config.run_timeout(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for a step invocation unless the step sets its own.
    pub step_timeout_seconds: u64,
    /// Timeout for a whole run. `None` means unbounded.
    pub run_timeout_seconds: Option<u64>,
    /// Upper bound on step bodies running at the same time. `None` means unbounded.
    pub max_concurrent_steps: Option<usize>,
    /// Upper bound on step launches per run.
    pub max_dispatches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_seconds: 30,
            run_timeout_seconds: None,
            max_concurrent_steps: None,
            max_dispatches: 10_000,
        }
    }
}

impl EngineConfig {
    /// Loads the defaults and applies environment variable overrides.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `MUSUBI_*` environment variable overrides.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(seconds) = parse_env::<u64>("MUSUBI_STEP_TIMEOUT_SECS") {
            self.step_timeout_seconds = seconds;
            info!("Step timeout override: {}s", seconds);
        }
        if let Some(seconds) = parse_env::<u64>("MUSUBI_RUN_TIMEOUT_SECS") {
            self.run_timeout_seconds = Some(seconds);
            info!("Run timeout override: {}s", seconds);
        }
        if let Some(limit) = parse_env::<usize>("MUSUBI_MAX_CONCURRENT_STEPS") {
            self.max_concurrent_steps = Some(limit);
            info!("Max concurrent steps override: {}", limit);
        }
        if let Some(limit) = parse_env::<usize>("MUSUBI_MAX_DISPATCHES") {
            self.max_dispatches = limit;
            info!("Max dispatches override: {}", limit);
        }
        self
    }

    /// Returns the default step timeout.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }

    /// Returns the run timeout, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable configuration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_dispatches, 10_000);
        assert!(config.max_concurrent_steps.is_none());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"step_timeout_seconds": 5, "run_timeout_seconds": 60}"#)
                .expect("valid config");
        assert_eq!(config.step_timeout(), Duration::from_secs(5));
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.max_dispatches, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        // Only this test touches MUSUBI_* variables.
        env::set_var("MUSUBI_MAX_DISPATCHES", "42");
        env::set_var("MUSUBI_MAX_CONCURRENT_STEPS", "not-a-number");
        let config = EngineConfig::from_env();
        env::remove_var("MUSUBI_MAX_DISPATCHES");
        env::remove_var("MUSUBI_MAX_CONCURRENT_STEPS");

        assert_eq!(config.max_dispatches, 42);
        assert!(config.max_concurrent_steps.is_none());
    }
}
