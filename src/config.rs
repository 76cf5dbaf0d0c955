//! Runtime configuration.
//!
//! These values drive the reference interpreter. In most cases the defaults
//! are right; tests occasionally tighten `max_steps` to catch runaway loops.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `ops_budget` | 128 primitives per fiber turn |
//! | `default_mailbox_capacity` | 64 |
//! | `max_steps` | 1,000,000 |
//!
//! Environment overrides (highest precedence) use the `CHOREO_` prefix:
//! `CHOREO_OPS_BUDGET`, `CHOREO_MAILBOX_CAPACITY`, `CHOREO_MAX_STEPS`.

use serde::Deserialize;

/// Configuration for the reference interpreter.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// How many primitives one fiber may execute per scheduling turn before
    /// it yields to its siblings. Keeps non-suspending loops fair.
    pub ops_budget: u32,
    /// Mailbox capacity for processes that do not declare one.
    pub default_mailbox_capacity: usize,
    /// Safety valve: `run_until_quiescent` gives up after this many turns.
    /// `0` means unlimited.
    pub max_steps: u64,
}

impl RuntimeConfig {
    /// The default per-turn primitive budget.
    pub const DEFAULT_OPS_BUDGET: u32 = 128;
    /// The default mailbox capacity.
    pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;
    /// The default step limit.
    pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops_budget: Self::DEFAULT_OPS_BUDGET,
            default_mailbox_capacity: Self::DEFAULT_MAILBOX_CAPACITY,
            max_steps: Self::DEFAULT_MAX_STEPS,
        }
    }

    /// Sets the per-turn primitive budget.
    #[must_use]
    pub fn with_ops_budget(mut self, budget: u32) -> Self {
        self.ops_budget = budget;
        self
    }

    /// Sets the default mailbox capacity.
    #[must_use]
    pub fn with_default_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.default_mailbox_capacity = capacity;
        self
    }

    /// Sets the step limit (`0` = unlimited).
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Normalizes configuration values to safe minimums.
    pub fn normalize(&mut self) {
        if self.ops_budget == 0 {
            self.ops_budget = 1;
        }
        if self.default_mailbox_capacity == 0 {
            self.default_mailbox_capacity = 1;
        }
    }

    /// Applies `CHOREO_*` environment overrides on top of `self`.
    ///
    /// Unset variables leave the current value; malformed values are
    /// reported rather than silently ignored.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = read_env("CHOREO_OPS_BUDGET")? {
            self.ops_budget = v;
        }
        if let Some(v) = read_env("CHOREO_MAILBOX_CAPACITY")? {
            self.default_mailbox_capacity = v;
        }
        if let Some(v) = read_env("CHOREO_MAX_STEPS")? {
            self.max_steps = v;
        }
        self.normalize();
        Ok(self)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn read_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { name }),
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that failed to parse.
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidValue {
        /// The variable name.
        name: &'static str,
        /// The raw value found.
        value: String,
    },
    /// An environment variable held non-unicode data.
    #[error("environment variable {name} is not valid unicode")]
    NotUnicode {
        /// The variable name.
        name: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env mutation is process-global; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.ops_budget, RuntimeConfig::DEFAULT_OPS_BUDGET);
        assert_eq!(
            cfg.default_mailbox_capacity,
            RuntimeConfig::DEFAULT_MAILBOX_CAPACITY
        );
        assert_eq!(cfg.max_steps, RuntimeConfig::DEFAULT_MAX_STEPS);
    }

    #[test]
    fn builder_and_normalize() {
        let mut cfg = RuntimeConfig::new()
            .with_ops_budget(0)
            .with_default_mailbox_capacity(0)
            .with_max_steps(10);
        cfg.normalize();
        assert_eq!(cfg.ops_budget, 1);
        assert_eq!(cfg.default_mailbox_capacity, 1);
        assert_eq!(cfg.max_steps, 10);
    }

    #[test]
    fn env_override_applies() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::set_var("CHOREO_OPS_BUDGET", "7");
        let cfg = RuntimeConfig::new().apply_env().expect("env should parse");
        assert_eq!(cfg.ops_budget, 7);
        std::env::remove_var("CHOREO_OPS_BUDGET");
    }

    #[test]
    fn env_override_rejects_garbage() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::set_var("CHOREO_MAX_STEPS", "not-a-number");
        let err = RuntimeConfig::new().apply_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("CHOREO_MAX_STEPS");
    }
}
