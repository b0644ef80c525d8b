//! Pipeline-core configuration, loaded from TOML with environment-variable
//! overrides — following the shape of `xchecker-config`'s `Config` struct.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for an embedding of the pipeline core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgeConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Retry engine defaults (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff schedule applied before each retried attempt, in
    /// milliseconds. Defaults to `[0, 500, 1500]`; attempts beyond the
    /// schedule's length reuse its last entry.
    pub backoff_schedule_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_schedule_ms: vec![0, 500, 1500],
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        self.backoff_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// Static per-model pricing table; unknown models cost 0 (`spec.md` §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub pricing_per_1k_tokens: HashMap<String, f64>,
}

impl ForgeConfig {
    /// Load configuration from a TOML string, falling back to defaults for
    /// any missing section.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
