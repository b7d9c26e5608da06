//! Defines the tunables of the trigger engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde` and the `config` crate, with
//! `CADENCE__`-prefixed environment variables layered on top. Every field has
//! a default, so an empty file is a valid configuration.

use crate::error::{CadenceError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration shared by every trigger of a `Task`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CadenceConfig {
    /// Tuning of the point-in-time convergence loop.
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// Tick spacing used by `repeat_where` when the caller gives none.
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Capacity of the broadcast channel carrying `TriggerEvent`s.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Controls how `fire_after` and `fire_at` close in on their target.
///
/// While `remaining` time units are left, the loop sleeps for
/// `remaining ^ exponent` units. With an exponent below one each sleep is
/// shorter than the true remaining time, so wake-ups get denser only near the
/// target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConvergenceConfig {
    /// Must lie strictly between 0 and 1.
    #[serde(default = "default_exponent")]
    pub exponent: f64,

    /// Length of one time unit, in milliseconds.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
}

impl CadenceConfig {
    /// Loads a configuration from `path`, then applies `CADENCE__*` overrides
    /// (e.g. `CADENCE__CONVERGENCE__EXPONENT=0.5`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()?;
        let parsed: CadenceConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parses a TOML document. Useful for embedded defaults and tests.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let parsed: CadenceConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Rejects values the trigger algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        let exponent = self.convergence.exponent;
        if !(exponent > 0.0 && exponent < 1.0) {
            return Err(CadenceError::InvalidConfig {
                reason: format!("convergence.exponent must be in (0, 1), got {exponent}"),
            });
        }
        if self.convergence.unit_ms == 0 {
            return Err(CadenceError::InvalidConfig {
                reason: "convergence.unit_ms must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(CadenceError::InvalidConfig {
                reason: "event_capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// The tick spacing `repeat_where` falls back to.
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }
}

impl ConvergenceConfig {
    /// One convergence time unit as a duration.
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms)
    }
}

// --- Default value functions for serde ---

fn default_exponent() -> f64 {
    0.6
}

fn default_unit_ms() -> u64 {
    1
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    64
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            exponent: default_exponent(),
            unit_ms: default_unit_ms(),
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            convergence: ConvergenceConfig::default(),
            default_interval_ms: default_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}
