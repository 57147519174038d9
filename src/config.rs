//! Engine configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (one worker per CPU, fatigue factors in `[0.5, 1.5)`)
//! 2. An optional TOML file (`lae.toml`)
//! 3. `LAE_*` environment variables
//!
//! ## TOML Format
//!
//! ```toml
//! threads = 4
//! min_fatigue_factor = 0.5
//! max_fatigue_factor = 1.5
//! seed = 42
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::scheduling::{DEFAULT_MAX_FATIGUE_FACTOR, DEFAULT_MIN_FATIGUE_FACTOR};

/// Environment variable overriding [`EngineConfig::threads`].
pub const THREADS_ENV: &str = "LAE_THREADS";
/// Environment variable overriding [`EngineConfig::seed`].
pub const SEED_ENV: &str = "LAE_FATIGUE_SEED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a [`LinearAlgebraEngine`](crate::LinearAlgebraEngine).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of worker threads
    pub threads: usize,
    /// Lower bound (inclusive) of the per-worker fatigue factor
    pub min_fatigue_factor: f64,
    /// Upper bound (exclusive) of the per-worker fatigue factor
    pub max_fatigue_factor: f64,
    /// Seed for drawing fatigue factors; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            threads: num_cpus::get(),
            min_fatigue_factor: DEFAULT_MIN_FATIGUE_FACTOR,
            max_fatigue_factor: DEFAULT_MAX_FATIGUE_FACTOR,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Defaults with the given thread count.
    pub fn with_threads(threads: usize) -> Self {
        EngineConfig {
            threads,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `LAE_THREADS` and `LAE_FATIGUE_SEED` overrides.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(THREADS_ENV).ok().as_deref(),
            std::env::var(SEED_ENV).ok().as_deref(),
        );
    }

    fn apply_overrides(&mut self, threads: Option<&str>, seed: Option<&str>) {
        if let Some(raw) = threads {
            match raw.trim().parse() {
                Ok(threads) => self.threads = threads,
                Err(_) => warn!(var = THREADS_ENV, value = raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = seed {
            match raw.trim().parse() {
                Ok(seed) => self.seed = Some(seed),
                Err(_) => warn!(var = SEED_ENV, value = raw, "ignoring invalid override"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }
        let (min, max) = (self.min_fatigue_factor, self.max_fatigue_factor);
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
            return Err(ConfigError::Invalid(format!(
                "fatigue factor range [{}, {}) is empty or negative",
                min, max
            )));
        }
        Ok(())
    }
}
