use std::sync::Arc;

use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, error, warn};

use crate::config::{DestinationConfig, FlushPolicy};
use crate::event::{Event, EventRow};
use crate::sink::{Destination, EventSink};

/// Accumulates events and hands them to an [`EventSink`] in batches.
///
/// A batch goes out when the buffered size reaches the policy threshold (checked on every
/// [`push`](Self::push)) or when [`flush_if_late`](Self::flush_if_late) finds that the forced
/// interval has passed since the previous flush. Delivery runs on a spawned task; its outcome
/// is only logged and a failed batch is dropped, never re-queued.
pub struct EventBuffer {
    policy: FlushPolicy,
    destination: DestinationConfig,
    sink: Arc<dyn EventSink>,
    pending: Vec<Event>,
    pending_bytes: u64,
    last_flush: Instant,
    in_flight: Vec<JoinHandle<()>>,
    batches_sent: u64,
}

impl EventBuffer {
    pub fn new(
        policy: FlushPolicy,
        destination: DestinationConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            policy,
            destination,
            sink,
            pending: Vec::new(),
            pending_bytes: 0,
            last_flush: Instant::now(),
            in_flight: Vec::new(),
            batches_sent: 0,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    /// Batches handed to the sink so far, whatever their delivery outcome.
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    pub fn push(&mut self, event: Event) {
        self.pending_bytes = self.pending_bytes.saturating_add(event.size_bytes());
        self.pending.push(event);
        if self.pending_bytes >= self.policy.size_threshold_bytes {
            self.flush();
        }
    }

    /// Sends everything buffered so far. An empty flush still restarts the forced-flush timer.
    pub fn flush(&mut self) {
        self.last_flush = Instant::now();
        self.in_flight.retain(|handle| !handle.is_finished());
        if self.pending.is_empty() {
            return;
        }

        // The buffer must be empty before the sink sees the batch: pushes that arrive while
        // the delivery is outstanding start a new batch.
        let batch = std::mem::take(&mut self.pending);
        let bytes = std::mem::replace(&mut self.pending_bytes, 0);

        let rows: Vec<EventRow> = batch.into_iter().map(Event::into_row).collect();
        let row_count = rows.len();
        let destination = Destination::today(&self.destination);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(
                    rows = row_count,
                    bytes,
                    %err,
                    "no async runtime for delivery; dropping batch"
                );
                return;
            }
        };

        self.batches_sent += 1;
        let table = destination.table.clone();
        let delivery = self.sink.insert(destination, rows);
        debug!(rows = row_count, bytes, table = %table, "flushing batch");
        self.in_flight.push(runtime.spawn(async move {
            match delivery.await {
                Ok(()) => debug!(rows = row_count, table = %table, "batch delivered"),
                Err(err) => error!(
                    rows = row_count,
                    table = %table,
                    %err,
                    "batch delivery failed; dropping batch"
                ),
            }
        }));
    }

    /// Meant to be called on a fixed tick. Flushes when the forced interval has passed since
    /// the last flush, so a batch can wait between one and two intervals.
    pub fn flush_if_late(&mut self) {
        let elapsed = Instant::now().saturating_duration_since(self.last_flush);
        if elapsed >= self.policy.forced_flush_interval {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "forced flush");
            self.flush();
        }
    }

    /// Flushes what is left and waits for every outstanding delivery to finish. Returns the
    /// total number of batches handed to the sink.
    pub async fn shutdown(mut self) -> u64 {
        self.flush();
        for handle in self.in_flight.drain(..) {
            if let Err(err) = handle.await {
                warn!(%err, "delivery task did not complete");
            }
        }
        self.batches_sent
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::event::{Operation, WireEvent};
    use crate::sink::MemorySink;

    fn event(path: &str, size_bytes: u64) -> Event {
        Event::new(
            WireEvent {
                operation: Operation::Read,
                path: path.to_string(),
                size_bytes,
            },
            10.0,
            None,
        )
    }

    fn buffer(threshold: u64, interval_ms: u64, sink: &MemorySink) -> EventBuffer {
        EventBuffer::new(
            FlushPolicy {
                size_threshold_bytes: threshold,
                forced_flush_interval: Duration::from_millis(interval_ms),
            },
            DestinationConfig::new("traffic"),
            Arc::new(sink.clone()),
        )
    }

    #[tokio::test]
    async fn third_push_crosses_threshold_and_flushes_once() {
        // Flushing happens once the buffer reaches the threshold (`>=`), so a 100-byte
        // threshold would already flush on the second 50-byte push. 150 keeps two pending.
        let sink = MemorySink::new();
        let mut buf = buffer(150, 60_000, &sink);
        buf.push(event("/a", 50));
        buf.push(event("/b", 50));
        assert!(sink.batches().is_empty());
        assert_eq!(buf.pending_len(), 2);
        assert_eq!(buf.pending_bytes(), 100);

        buf.push(event("/c", 50));
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let paths: Vec<&str> = batches[0].1.iter().map(|row| row.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
        assert_eq!(buf.pending_len(), 0);
        assert_eq!(buf.pending_bytes(), 0);
        assert_eq!(buf.batches_sent(), 1);
    }

    #[tokio::test]
    async fn reaching_threshold_exactly_flushes() {
        let sink = MemorySink::new();
        let mut buf = buffer(100, 60_000, &sink);
        buf.push(event("/a", 60));
        buf.push(event("/b", 40));
        assert_eq!(sink.row_count(), 2);
        assert_eq!(buf.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn empty_flush_is_a_noop_for_the_sink() {
        let sink = MemorySink::new();
        let mut buf = buffer(100, 60_000, &sink);
        buf.flush();
        assert!(sink.batches().is_empty());
        assert_eq!(buf.batches_sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_if_late_respects_interval() {
        let sink = MemorySink::new();
        let mut buf = buffer(1_000, 1_000, &sink);
        buf.push(event("/a", 10));

        tokio::time::advance(Duration::from_millis(999)).await;
        buf.flush_if_late();
        assert!(sink.batches().is_empty());
        assert_eq!(buf.pending_len(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        buf.flush_if_late();
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(buf.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_late_flush_still_advances_the_timer() {
        let sink = MemorySink::new();
        let mut buf = buffer(1_000, 1_000, &sink);
        let started = buf.last_flush();

        tokio::time::advance(Duration::from_millis(1_500)).await;
        buf.flush_if_late();
        assert!(buf.last_flush() > started);
        assert!(sink.batches().is_empty());

        // Timer restarted at 1.5s, so an event pushed now waits for a full interval again.
        buf.push(event("/a", 10));
        tokio::time::advance(Duration::from_millis(600)).await;
        buf.flush_if_late();
        assert!(sink.batches().is_empty());

        tokio::time::advance(Duration::from_millis(400)).await;
        buf.flush_if_late();
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_drops_the_batch() {
        let sink = MemorySink::failing("quota exceeded");
        let mut buf = buffer(10, 60_000, &sink);

        buf.push(event("/a", 10));
        assert_eq!(buf.pending_len(), 0);

        buf.push(event("/b", 5));
        buf.shutdown().await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[1].1[0].path, "/b");
    }

    #[test]
    fn flush_without_runtime_drops_batch_without_panicking() {
        let sink = MemorySink::new();
        let mut buf = buffer(10, 60_000, &sink);
        buf.push(event("/a", 20));
        assert_eq!(buf.pending_len(), 0);
        assert!(sink.batches().is_empty());
    }
}
