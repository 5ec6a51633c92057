use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CaptureError, Result};
use crate::filter::DEFAULT_IGNORED_ORIGINS;
use crate::layout::{DEFAULT_LAYOUT, PatternLayout};
use crate::registry::DEFAULT_PARENT_SCOPE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Layout template applied to every process log call
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Prefix of every process logger name
    #[serde(default = "default_parent_scope")]
    pub parent_scope: String,
    /// Channel used when a step does not name one, without extension
    #[serde(default = "default_channel")]
    pub default_channel: String,
    #[serde(default = "default_channel_extension")]
    pub channel_extension: String,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

fn default_layout() -> String {
    DEFAULT_LAYOUT.into()
}
fn default_parent_scope() -> String {
    DEFAULT_PARENT_SCOPE.into()
}
fn default_channel() -> String {
    "OPERATION".into()
}
fn default_channel_extension() -> String {
    ".log".into()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            layout: default_layout(),
            parent_scope: default_parent_scope(),
            default_channel: default_channel(),
            channel_extension: default_channel_extension(),
            filter: FilterConfig::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Checks value ranges and that the layout parses.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::InvalidConfig` or `CaptureError::InvalidLayout`.
    pub fn validate(&self) -> Result<()> {
        PatternLayout::parse(&self.layout)?;
        if self.parent_scope.is_empty() {
            return Err(CaptureError::invalid_config("parent_scope must not be empty"));
        }
        if self.default_channel.is_empty() {
            return Err(CaptureError::invalid_config("default_channel must not be empty"));
        }
        if self.reaper.interval_secs == 0 {
            return Err(CaptureError::invalid_config("reaper.interval_secs must be > 0"));
        }
        if self.reaper.idle_threshold_secs == 0 {
            return Err(CaptureError::invalid_config(
                "reaper.idle_threshold_secs must be > 0",
            ));
        }
        Ok(())
    }

    /// Channel name for a step-supplied log name, e.g. `deploy` -> `deploy.log`.
    pub fn channel_name(&self, log_name: &str) -> String {
        format!("{log_name}{}", self.channel_extension)
    }

    /// The default channel with its extension, e.g. `OPERATION.log`.
    pub fn default_channel_name(&self) -> String {
        self.channel_name(&self.default_channel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Origin prefixes whose calls are never recorded
    #[serde(default = "default_ignored_origins")]
    pub ignored_origins: Vec<String>,
}

fn default_ignored_origins() -> Vec<String> {
    DEFAULT_IGNORED_ORIGINS.iter().map(|s| s.to_string()).collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignored_origins: default_ignored_origins(),
        }
    }
}

/// What the reaper does with the buffer of an idle logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReapPolicy {
    /// Evict and discard the buffered text.
    #[default]
    Drop,
    /// Write the buffered text as a regular flush, then evict.
    Persist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_enabled")]
    pub enabled: bool,
    /// Time between sweeps
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    /// A logger not written for this long is reaped
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    #[serde(default)]
    pub policy: ReapPolicy,
}

fn default_reaper_enabled() -> bool {
    true
}
fn default_reaper_interval_secs() -> u64 {
    300
}
fn default_idle_threshold_secs() -> u64 {
    300
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_reaper_enabled(),
            interval_secs: default_reaper_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
            policy: ReapPolicy::default(),
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}
