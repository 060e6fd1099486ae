#![forbid(unsafe_code)]
//! Traffic accounting for realtime-database clients, built from their protocol debug output.
//!
//! Each debug line is classified into a read or write [`Event`] with a logical path and an
//! estimated wire size. A [`Collector`] stamps events with the server-adjusted time and buffers
//! them; batches go to an [`EventSink`] once enough bytes accumulate or the forced-flush
//! interval passes. Delivery is best effort: a batch the sink rejects is logged and dropped.

mod buffer;
mod classifier;
mod clock;
mod collector;
mod config;
mod error;
mod event;
mod ingest;
mod sink;

pub use buffer::EventBuffer;
pub use classifier::{Classification, IgnoreReason, LineClassifier};
pub use clock::ClockOffset;
pub use collector::{Collector, CollectorStats};
pub use config::{CollectorConfig, DestinationConfig, FlushPolicy, LineLimits, WireSizeModel};
pub use error::{ClockError, ConfigError, SinkError};
pub use event::{Event, EventRow, Operation, WireEvent, DEBUG_PATH, PROTOCOL_PATH};
pub use ingest::{FeedLine, LineError, LineFeed};
pub use sink::{Destination, DynInsert, EventSink, JsonlDirSink, MemorySink};
