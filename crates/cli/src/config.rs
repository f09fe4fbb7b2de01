//! Subatomic configuration.
//!
//! One explicit struct, loaded once at process start and passed by
//! reference into everything that needs it. There is no global config
//! singleton.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use provision::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Full process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubatomicConfig {
    /// Chat gateway settings.
    pub chat: ChatConfig,
    /// Platform CLI settings.
    pub platform: PlatformConfig,
    /// Rollout polling policy.
    pub rollout: RetrySettings,
    /// Run-level deadline in minutes; 0 disables it.
    pub run_deadline_minutes: u64,
}

/// Chat gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Gateway base URL; when unset, progress goes to the console.
    pub webhook_url: Option<String>,
    /// Channel the status board is addressed to.
    pub channel: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            channel: "platform-ops".to_string(),
        }
    }
}

/// Platform CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Name or path of the `oc` binary.
    pub oc_binary: String,
    /// Explicit kubeconfig, if not using the ambient one.
    pub kubeconfig: Option<PathBuf>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            oc_binary: "oc".to_string(),
            kubeconfig: None,
        }
    }
}

/// Retry settings for rollout polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum polling attempts.
    pub max_attempts: u32,
    /// Delay between attempts, in seconds.
    pub delay_secs: u64,
    /// Backoff factor; 1.0 keeps the delay fixed.
    pub backoff_factor: f64,
    /// Ceiling for any single delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        // ~20 minutes of rollout patience at 20s spacing.
        Self {
            max_attempts: 60,
            delay_secs: 20,
            backoff_factor: 1.0,
            max_delay_secs: 120,
        }
    }
}

impl RetrySettings {
    /// Convert into the core retry policy.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_secs(self.delay_secs),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

impl SubatomicConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Run-level deadline, if configured.
    #[must_use]
    pub fn run_deadline(&self) -> Option<Duration> {
        if self.run_deadline_minutes == 0 {
            None
        } else {
            Some(Duration::from_secs(self.run_deadline_minutes * 60))
        }
    }
}
