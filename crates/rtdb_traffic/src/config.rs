use std::time::Duration;

use crate::error::ConfigError;

/// Heuristic wire-size model. The numbers are estimates meant for comparing paths against each
/// other, not exact byte counts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WireSizeModel {
    /// Added to every message's payload length.
    pub message_overhead: u64,
    /// Added, together with the tag length, to reads that carry a message-type tag.
    pub type_tag_overhead: u64,
}

impl Default for WireSizeModel {
    fn default() -> Self {
        Self {
            message_overhead: 16,
            type_tag_overhead: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FlushPolicy {
    /// Flush as soon as the buffered size reaches this many bytes.
    pub size_threshold_bytes: u64,
    /// Forced flush period when the size trigger has not fired.
    pub forced_flush_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            size_threshold_bytes: 100_000,
            forced_flush_interval: Duration::from_millis(60_000),
        }
    }
}

impl FlushPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_threshold_bytes == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.forced_flush_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Where batches land: a dataset plus a per-day table named `<prefix><y><m><d>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DestinationConfig {
    pub dataset: String,
    pub table_prefix: String,
}

impl DestinationConfig {
    pub const DEFAULT_TABLE_PREFIX: &'static str = "raw";

    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table_prefix: Self::DEFAULT_TABLE_PREFIX.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.trim().is_empty() {
            return Err(ConfigError::EmptyDataset);
        }
        let prefix_ok = self
            .table_prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !prefix_ok {
            return Err(ConfigError::InvalidTablePrefix {
                prefix: self.table_prefix.clone(),
            });
        }
        Ok(())
    }
}

pub struct CollectorConfig {
    pub destination: DestinationConfig,
    pub flush: FlushPolicy,
    pub wire_size: WireSizeModel,
    /// Identifies the traffic source on every row produced by one collector.
    pub tag: Option<String>,
}

impl CollectorConfig {
    pub fn new(destination: DestinationConfig) -> Self {
        Self {
            destination,
            flush: FlushPolicy::default(),
            wire_size: WireSizeModel::default(),
            tag: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.destination.validate()?;
        self.flush.validate()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LineLimits {
    pub max_line_bytes: usize,
}

impl Default for LineLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024 * 1024,
        }
    }
}
