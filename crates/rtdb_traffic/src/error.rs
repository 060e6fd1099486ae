use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to prepare sink directory {path:?}: {source}")]
    PrepareDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed writing rows to {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize row: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink rejected batch for {table}: {reason}")]
    Rejected { table: String, reason: String },
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    #[error("flush threshold must be greater than zero")]
    ZeroThreshold,
    #[error("forced flush interval must be greater than zero")]
    ZeroInterval,
    #[error("dataset id must not be empty")]
    EmptyDataset,
    #[error("invalid table prefix {prefix:?}: only ASCII letters, digits and `_` are allowed")]
    InvalidTablePrefix { prefix: String },
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ClockError {
    #[error("system clock is {behind:?} before the Unix epoch")]
    BeforeEpoch { behind: Duration },
    #[error("system clock is out of range")]
    OutOfRange,
}
