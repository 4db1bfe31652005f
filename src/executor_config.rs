//! Executor tuning knobs.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and progress settings for [`ProcessingPipeline`](crate::ProcessingPipeline).
///
/// Durations are (de)serialized as milliseconds so the struct can be read
/// from a JSON or YAML settings file.
///
/// # Example
///
/// ```
/// use docflow::ExecutorConfig;
/// use std::time::Duration;
///
/// let config = ExecutorConfig::default()
///     .with_tick_interval(Duration::from_millis(1))
///     .with_ticks_per_step(3);
/// assert_eq!(config.progress_cap, 95);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How long to sleep between dependency checks.
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Give up on a step whose dependencies have not completed after this long.
    #[serde(with = "millis", rename = "dependency_timeout_ms")]
    pub dependency_timeout: Duration,
    /// Pause between progress updates of the simulated step bodies.
    #[serde(with = "millis", rename = "tick_interval_ms")]
    pub tick_interval: Duration,
    /// Number of progress updates a simulated step body emits.
    pub ticks_per_step: u32,
    /// Highest progress a running step may report before it completes.
    pub progress_cap: u8,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            dependency_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_millis(20),
            ticks_per_step: 5,
            progress_cap: 95,
        }
    }
}

impl ExecutorConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_ticks_per_step(mut self, ticks: u32) -> Self {
        self.ticks_per_step = ticks.max(1);
        self
    }

    /// Cap is clamped to 0..=99 so only completion reports 100.
    pub fn with_progress_cap(mut self, cap: u8) -> Self {
        self.progress_cap = cap.min(99);
        self
    }

    /// Settings for tests and demos: no real waiting.
    pub fn fast() -> Self {
        Self::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_tick_interval(Duration::from_millis(1))
            .with_ticks_per_step(3)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        Ok(config.normalized())
    }

    fn normalized(self) -> Self {
        let ticks = self.ticks_per_step;
        let cap = self.progress_cap;
        self.with_ticks_per_step(ticks).with_progress_cap(cap)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
