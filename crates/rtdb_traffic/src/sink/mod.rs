use std::{future::Future, pin::Pin};

use time::{Date, OffsetDateTime};

use crate::config::DestinationConfig;
use crate::error::SinkError;
use crate::event::EventRow;

mod jsonl;
mod memory;

pub use jsonl::JsonlDirSink;
pub use memory::MemorySink;

/// Type-erased future returned by [`EventSink::insert`].
pub type DynInsert = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send>>;

/// Analytics backend that accepts batches of rows.
///
/// Implementations own their retry policy for transient failures; callers never retry.
pub trait EventSink: Send + Sync + 'static {
    /// Starts inserting `rows`, in order, into `destination`.
    fn insert(&self, destination: Destination, rows: Vec<EventRow>) -> DynInsert;
}

/// A dataset plus the per-day table inside it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Destination {
    pub dataset: String,
    pub table: String,
}

impl Destination {
    /// Table names concatenate the prefix with the unpadded year, month and day
    /// (`raw2024315` for 2024-03-15).
    pub fn for_date(config: &DestinationConfig, date: Date) -> Self {
        Self {
            dataset: config.dataset.clone(),
            table: format!(
                "{}{}{}{}",
                config.table_prefix,
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
        }
    }

    pub fn today(config: &DestinationConfig) -> Self {
        Self::for_date(config, OffsetDateTime::now_utc().date())
    }
}
