use std::sync::{Arc, Mutex, PoisonError};

use super::{Destination, DynInsert, EventSink};
use crate::error::SinkError;
use crate::event::EventRow;

/// Keeps every batch in memory. Clones share the same storage.
///
/// Batches are recorded when `insert` is called, so they are visible as soon as a flush
/// returns. With [`MemorySink::failing`] batches are still recorded but every insert resolves to
/// an error.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<(Destination, Vec<EventRow>)>>>,
    reject_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            batches: Arc::default(),
            reject_with: Some(reason.into()),
        }
    }

    pub fn batches(&self) -> Vec<(Destination, Vec<EventRow>)> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn row_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, rows)| rows.len())
            .sum()
    }
}

impl EventSink for MemorySink {
    fn insert(&self, destination: Destination, rows: Vec<EventRow>) -> DynInsert {
        let table = destination.table.clone();
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination, rows));

        let reject_with = self.reject_with.clone();
        Box::pin(async move {
            match reject_with {
                Some(reason) => Err(SinkError::Rejected { table, reason }),
                None => Ok(()),
            }
        })
    }
}
