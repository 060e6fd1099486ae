use std::sync::Arc;

use tracing::{error, info};

use crate::buffer::EventBuffer;
use crate::classifier::{Classification, LineClassifier};
use crate::clock::{unix_millis_now, ClockOffset};
use crate::config::CollectorConfig;
use crate::error::ConfigError;
use crate::event::Event;
use crate::sink::EventSink;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CollectorStats {
    pub lines: u64,
    pub events: u64,
    pub offset_updates: u64,
    pub ignored: u64,
    /// Ignored lines that were logged as malformed or unrecognized.
    pub diagnostics: u64,
    /// Lines lost to unexpected faults, such as an unusable system clock.
    pub faults: u64,
    pub batches: u64,
}

/// Owns one classification and buffering pipeline.
///
/// Feed raw lines through [`handle_line`](Self::handle_line) and call [`tick`](Self::tick)
/// periodically. Neither ever fails; problems are logged and the line is dropped.
pub struct Collector {
    classifier: LineClassifier,
    offset: ClockOffset,
    tag: Option<String>,
    buffer: EventBuffer,
    stats: CollectorStats,
}

impl Collector {
    pub fn new(config: CollectorConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let CollectorConfig {
            destination,
            flush,
            wire_size,
            tag,
        } = config;

        Ok(Self {
            classifier: LineClassifier::new(wire_size),
            offset: ClockOffset::new(),
            tag,
            buffer: EventBuffer::new(flush, destination, sink),
            stats: CollectorStats::default(),
        })
    }

    /// The offset shared by every event this collector stamps.
    pub fn clock_offset(&self) -> &ClockOffset {
        &self.offset
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            batches: self.buffer.batches_sent(),
            ..self.stats
        }
    }

    pub fn handle_line(&mut self, line: &str) {
        self.stats.lines += 1;
        match self.classifier.classify(line) {
            Classification::OffsetUpdate(millis) => {
                self.offset.set(millis);
                self.stats.offset_updates += 1;
            }
            Classification::Event(wire) => {
                let now = match unix_millis_now() {
                    Ok(now) => now,
                    Err(err) => {
                        error!(%err, line, "cannot timestamp event; dropping line");
                        self.stats.faults += 1;
                        return;
                    }
                };
                let event = Event::new(wire, self.offset.adjusted_seconds(now), self.tag.clone());
                self.stats.events += 1;
                self.buffer.push(event);
            }
            Classification::Ignored(reason) => {
                self.stats.ignored += 1;
                if reason.is_diagnostic() {
                    self.stats.diagnostics += 1;
                }
            }
        }
    }

    /// Periodic hook: flushes when the forced-flush interval has passed.
    pub fn tick(&mut self) {
        self.buffer.flush_if_late();
    }

    pub fn flush(&mut self) {
        self.buffer.flush();
    }

    /// Delivers whatever is still buffered and waits for outstanding deliveries.
    pub async fn shutdown(self) -> CollectorStats {
        let mut stats = self.stats();
        stats.batches = self.buffer.shutdown().await;
        info!(
            lines = stats.lines,
            events = stats.events,
            ignored = stats.ignored,
            diagnostics = stats.diagnostics,
            offset_updates = stats.offset_updates,
            faults = stats.faults,
            batches = stats.batches,
            "collector stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestinationConfig;
    use crate::sink::MemorySink;

    fn collector(sink: &MemorySink) -> Collector {
        let mut config = CollectorConfig::new(DestinationConfig::new("traffic"));
        config.tag = Some("web".to_string());
        Collector::new(config, Arc::new(sink.clone())).unwrap()
    }

    #[tokio::test]
    async fn offset_lines_overwrite_instead_of_accumulating() {
        let sink = MemorySink::new();
        let mut c = collector(&sink);

        c.handle_line("serverTimeOffset: 500");
        c.handle_line("serverTimeOffset: -20");
        assert_eq!(c.clock_offset().get(), -20);
        assert_eq!(c.stats().offset_updates, 2);
        assert_eq!(c.stats().events, 0);
    }

    #[tokio::test]
    async fn ignored_lines_are_counted_by_kind() {
        let sink = MemorySink::new();
        let mut c = collector(&sink);

        c.handle_line("c:0:0: Websocket connected.");
        c.handle_line(r#"p:0: listen response {"s":"ok"}"#);
        c.handle_line(r#"p:0: {"r":1,"a":"zz","b":{}}"#);

        let stats = c.stats();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.ignored, 3);
        assert_eq!(stats.diagnostics, 1);
        assert_eq!(c.buffer().pending_len(), 0);
    }

    #[tokio::test]
    async fn events_carry_the_collector_tag() {
        let sink = MemorySink::new();
        let mut c = collector(&sink);

        c.handle_line(r#"p:0: {"r":1,"a":"q","b":{"p":"/x","h":""}}"#);
        assert_eq!(c.buffer().pending_len(), 1);

        let stats = c.shutdown().await;
        assert_eq!(stats.events, 1);
        assert_eq!(stats.batches, 1);

        let batches = sink.batches();
        let rows = &batches[0].1;
        assert_eq!(rows[0].tag.as_deref(), Some("web"));
        assert_eq!(rows[0].path, "/$protocol");
    }

    #[tokio::test]
    async fn explicit_flush_sends_below_the_threshold() {
        let sink = MemorySink::new();
        let mut c = collector(&sink);

        c.handle_line(r#"p:0: handleServerMessage d {"p":"rooms/1","d":{}}"#);
        assert!(sink.batches().is_empty());

        c.flush();
        assert_eq!(sink.row_count(), 1);
        assert_eq!(c.buffer().pending_len(), 0);
        assert_eq!(c.buffer().batches_sent(), 1);

        c.flush();
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = CollectorConfig::new(DestinationConfig::new("traffic"));
        config.flush.size_threshold_bytes = 0;
        let err = Collector::new(config, Arc::new(MemorySink::new())).err();
        assert_eq!(err, Some(ConfigError::ZeroThreshold));
    }
}
