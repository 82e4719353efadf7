//! Runtime configuration from the process environment.
//!
//! Every tunable has a compiled-in default matching the documented
//! contract; `DENV_*` variables override them per invocation. The snapshot
//! is taken once per command so a value cannot change mid-run.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.var(key)?.trim().parse().ok()
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Self { vars }
    }
}

/// Effective engine tunables for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_count: usize,
    pub command_timeout: Duration,
    pub engine_timeout: Duration,
    /// Explicit interpreter override; discovery runs when unset.
    pub python_override: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 10,
            command_timeout: Duration::from_secs(30),
            engine_timeout: Duration::from_secs(300),
            python_override: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            worker_count: snapshot
                .parsed::<usize>("DENV_WORKERS")
                .filter(|count| *count >= 1)
                .unwrap_or(defaults.worker_count),
            command_timeout: snapshot
                .parsed::<u64>("DENV_COMMAND_TIMEOUT_SECS")
                .filter(|secs| *secs >= 1)
                .map_or(defaults.command_timeout, Duration::from_secs),
            engine_timeout: snapshot
                .parsed::<u64>("DENV_ENGINE_TIMEOUT_SECS")
                .filter(|secs| *secs >= 1)
                .map_or(defaults.engine_timeout, Duration::from_secs),
            python_override: snapshot
                .var("DENV_PYTHON")
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]));
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.engine_timeout, Duration::from_secs(300));
        assert!(config.python_override.is_none());
    }

    #[test]
    fn environment_overrides_apply() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[
            ("DENV_WORKERS", "4"),
            ("DENV_COMMAND_TIMEOUT_SECS", "5"),
            ("DENV_ENGINE_TIMEOUT_SECS", "60"),
            ("DENV_PYTHON", "/opt/python/bin/python3"),
        ]));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.engine_timeout, Duration::from_secs(60));
        assert_eq!(
            config.python_override.as_deref(),
            Some("/opt/python/bin/python3")
        );
    }

    #[test]
    fn nonsense_values_fall_back_to_defaults() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[
            ("DENV_WORKERS", "0"),
            ("DENV_COMMAND_TIMEOUT_SECS", "soon"),
            ("DENV_ENGINE_TIMEOUT_SECS", ""),
        ]));
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.engine_timeout, Duration::from_secs(300));
    }
}
