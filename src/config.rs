//! Configuration management for ipthrottle.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThrottleError};
use crate::ratelimit::{FailurePolicy, LimiterSettings, WindowAlignment};

/// Prefix for environment variable overrides, e.g.
/// `IPTHROTTLE__RATE_LIMITING__LIMIT=50`.
pub const ENV_PREFIX: &str = "IPTHROTTLE";

/// Longest accepted window, one hundred years.
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Main configuration for ipthrottle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Window store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per client per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Answer given while the store is unavailable
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// How window end times are chosen
    #[serde(default)]
    pub alignment: WindowAlignment,

    /// Number of lock stripes serializing same-client checks
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            failure_policy: FailurePolicy::default(),
            alignment: WindowAlignment::default(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    3600
}

fn default_lock_stripes() -> usize {
    64
}

/// Window store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Interval between sweeps of expired windows in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line, taking precedence over file and
/// environment settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub limit: Option<u64>,
    pub window_secs: Option<u64>,
    pub json_logs: bool,
}

impl ConfigOverrides {
    fn apply(&self, mut config: ThrottleConfig) -> ThrottleConfig {
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if self.json_logs {
            config.logging.json = true;
        }
        config
    }
}

impl ThrottleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: ThrottleConfig = serde_yaml::from_str(contents)
            .map_err(|e| ThrottleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply `IPTHROTTLE__*`
    /// environment overrides on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_overrides(path, &ConfigOverrides::default())
    }

    /// Like [`load`](Self::load), with command-line overrides applied last.
    /// Validation runs once, on the merged result.
    pub fn load_with_overrides(path: Option<&str>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(Path::new(path)));
        }

        let config: ThrottleConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let config = overrides.apply(config);
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.limit == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.limit must be greater than zero".to_string(),
            ));
        }
        if rl.window_secs == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        if rl.window_secs > MAX_WINDOW_SECS {
            return Err(ThrottleError::Config(format!(
                "rate_limiting.window_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }
        if rl.lock_stripes == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.lock_stripes must be greater than zero".to_string(),
            ));
        }
        if self.store.sweep_interval_secs == 0 {
            return Err(ThrottleError::Config(
                "store.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The limiter settings described by this configuration.
    pub fn limiter_settings(&self) -> LimiterSettings {
        let rl = &self.rate_limiting;
        LimiterSettings {
            limit: rl.limit,
            window: Duration::from_secs(rl.window_secs),
            failure_policy: rl.failure_policy,
            alignment: rl.alignment,
            lock_stripes: rl.lock_stripes,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.store.sweep_interval_secs)
    }
}
