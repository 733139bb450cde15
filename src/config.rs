//! Configuration types for course-loader

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue generation and bulk download sizing
///
/// Groups the window sizes the [`ProgressiveLoader`](crate::ProgressiveLoader)
/// uses when building its task queue and when running offline downloads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Units covered by the blocking (priority 0) window, and by each
    /// skip-protection window (default: 5)
    #[serde(default = "default_blocking_window")]
    pub blocking_window: u32,

    /// Number of upcoming tiers that get shallow skip protection (default: 5)
    #[serde(default = "default_skip_protection_tiers")]
    pub skip_protection_tiers: usize,

    /// Leading units of a tier that must be cached before the tier counts as
    /// ready (default: 5)
    #[serde(default = "default_tier_ready_depth")]
    pub tier_ready_depth: u32,

    /// Units fetched by `expand_from_seed` (default: 21, i.e. `[p, p + 20]`)
    #[serde(default = "default_expand_window")]
    pub expand_window: u32,

    /// Units requested per script fetch during offline downloads (default: 20)
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: u32,

    /// Audio files per preload call during offline downloads (default: 10)
    #[serde(default = "default_audio_batch_size")]
    pub audio_batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            blocking_window: default_blocking_window(),
            skip_protection_tiers: default_skip_protection_tiers(),
            tier_ready_depth: default_tier_ready_depth(),
            expand_window: default_expand_window(),
            download_chunk_size: default_download_chunk_size(),
            audio_batch_size: default_audio_batch_size(),
        }
    }
}

/// Playback buffer maintenance settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    /// Look-ahead the maintainer tries to keep ready, in minutes (default: 5.0)
    #[serde(default = "default_target_minutes")]
    pub target_minutes: f64,

    /// Maximum units staged per prefetch run (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallel resource fetches per prefetch run (default: 3)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Estimated playback length of one unit, in seconds (default: 12.0)
    #[serde(default = "default_average_unit_seconds")]
    pub average_unit_seconds: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            target_minutes: default_target_minutes(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            average_unit_seconds: default_average_unit_seconds(),
        }
    }
}

/// Retry configuration for content source calls
///
/// Sources usually carry their own timeout and retry policy, so retries are
/// disabled by default. Only [`Error::Transient`] failures are retried.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 250ms)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 5 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Every field has a serde default, so an empty JSON object deserializes to
/// the same value as [`Config::default()`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Queue generation and offline download sizing
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Playback buffer maintenance
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Retry policy applied to content source calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl BufferConfig {
    /// Check the buffer settings on their own
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_minutes.is_finite() && self.target_minutes >= 0.0) {
            return Err(Error::config(
                "target_minutes",
                "must be a non-negative number",
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }
        if !(self.average_unit_seconds.is_finite() && self.average_unit_seconds > 0.0) {
            return Err(Error::config(
                "average_unit_seconds",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every window, batch and duration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let loader = &self.loader;
        if loader.blocking_window == 0 {
            return Err(Error::config("blocking_window", "must be at least 1"));
        }
        if loader.tier_ready_depth == 0 {
            return Err(Error::config("tier_ready_depth", "must be at least 1"));
        }
        if loader.expand_window == 0 {
            return Err(Error::config("expand_window", "must be at least 1"));
        }
        if loader.download_chunk_size == 0 {
            return Err(Error::config("download_chunk_size", "must be at least 1"));
        }
        if loader.audio_batch_size == 0 {
            return Err(Error::config("audio_batch_size", "must be at least 1"));
        }

        self.buffer.validate()?;

        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config("backoff_multiplier", "must be >= 1.0"));
        }

        Ok(())
    }
}

fn default_blocking_window() -> u32 {
    5
}

fn default_skip_protection_tiers() -> usize {
    5
}

fn default_tier_ready_depth() -> u32 {
    5
}

fn default_expand_window() -> u32 {
    21
}

fn default_download_chunk_size() -> u32 {
    20
}

fn default_audio_batch_size() -> usize {
    10
}

fn default_target_minutes() -> f64 {
    5.0
}

fn default_batch_size() -> usize {
    5
}

fn default_concurrency() -> usize {
    3
}

fn default_average_unit_seconds() -> f64 {
    12.0
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole milliseconds
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
