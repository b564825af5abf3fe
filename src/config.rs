//! Batching cache configuration

use serde::Deserialize;
use std::time::Duration;

/// Configuration for per-collection batching caches
///
/// Deserializable so services can embed it in their own config files:
///
/// ```rust
/// use pleme_global_id::LoaderConfig;
///
/// let config = LoaderConfig::default()
///     .with_batch_delay(std::time::Duration::from_millis(2))
///     .with_max_batch_size(500);
/// assert_eq!(config.max_batch_size, Some(500));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How long a batch stays open after its first key, in milliseconds.
    ///
    /// Zero means one scheduler turn.
    pub batch_delay_ms: u64,

    /// Maximum number of keys per bulk fetch. `None` means unbounded.
    pub max_batch_size: Option<usize>,
}

impl LoaderConfig {
    /// Sets the batch window, saturating at `u64::MAX` milliseconds
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum batch size; zero is treated as one
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = Some(max.max(1));
        self
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}
