use std::{future::Future, io, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use rtdb_traffic::{
    Collector, CollectorConfig, CollectorStats, ConfigError, DestinationConfig, FlushPolicy,
    JsonlDirSink, LineError, LineFeed, LineLimits, WireSizeModel,
};
use tokio::{
    io::{AsyncBufRead, BufReader},
    signal,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::Error;

#[derive(Debug, Parser)]
pub struct Args {
    /// Root directory for delivered batches (`<dir>/<dataset>/<table>.jsonl`).
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Destination dataset identifier.
    #[arg(long)]
    pub dataset: String,

    /// Prefix for the per-day table name.
    #[arg(long, default_value = DestinationConfig::DEFAULT_TABLE_PREFIX)]
    pub table_prefix: String,

    /// Identifies this traffic source on every row.
    #[arg(long)]
    pub tag: Option<String>,

    /// Flush as soon as this many bytes of traffic are buffered.
    #[arg(long, default_value_t = 100_000)]
    pub flush_threshold_bytes: u64,

    /// Force a flush when nothing was sent for this long.
    #[arg(long, default_value_t = 60_000)]
    pub flush_interval_ms: u64,

    /// How often to check for a late flush. Defaults to the flush interval.
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// Longer input lines are skipped with a warning.
    #[arg(long, default_value_t = LineLimits::default().max_line_bytes)]
    pub max_line_bytes: usize,
}

impl Args {
    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            destination: DestinationConfig {
                dataset: self.dataset.clone(),
                table_prefix: self.table_prefix.clone(),
            },
            flush: FlushPolicy {
                size_threshold_bytes: self.flush_threshold_bytes,
                forced_flush_interval: Duration::from_millis(self.flush_interval_ms),
            },
            wire_size: WireSizeModel::default(),
            tag: self.tag.clone(),
        }
    }

    fn tick_interval(&self) -> Result<Duration, ConfigError> {
        match self.tick_interval_ms.unwrap_or(self.flush_interval_ms) {
            0 => Err(ConfigError::ZeroInterval),
            ms => Ok(Duration::from_millis(ms)),
        }
    }
}

/// Why the input loop ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Stop {
    EndOfInput,
    Interrupted,
}

pub async fn run(args: Args) -> Result<(), Error> {
    let tick_interval = args.tick_interval()?;
    let sink = Arc::new(JsonlDirSink::new(&args.output_dir));
    let collector = Collector::new(args.collector_config(), sink)?;
    info!(
        output_dir = %args.output_dir.display(),
        dataset = %args.dataset,
        "collecting from stdin"
    );

    let limits = LineLimits {
        max_line_bytes: args.max_line_bytes,
    };
    let feed = LineFeed::new(BufReader::new(tokio::io::stdin()), limits);
    drive(collector, feed, tick_interval, signal::ctrl_c()).await?;
    Ok(())
}

/// Pumps `feed` into `collector` until the input ends or `interrupt` resolves, then delivers
/// what is still buffered. A terminal read error is returned after that final delivery.
pub(crate) async fn drive<R, S>(
    mut collector: Collector,
    feed: LineFeed<R>,
    tick_interval: Duration,
    interrupt: S,
) -> Result<CollectorStats, Error>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = io::Result<()>>,
{
    let outcome = pump(&mut collector, feed, tick_interval, interrupt).await;
    let stats = collector.shutdown().await;
    match outcome? {
        Stop::EndOfInput => info!("input closed"),
        Stop::Interrupted => info!("interrupted; buffered events were delivered"),
    }
    Ok(stats)
}

async fn pump<R, S>(
    collector: &mut Collector,
    mut feed: LineFeed<R>,
    tick_interval: Duration,
    interrupt: S,
) -> Result<Stop, LineError>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);
    let mut listening = true;

    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            item = feed.next_line() => match item {
                Some(Ok(line)) => collector.handle_line(&line.text),
                Some(Err(err)) if err.is_recoverable() => warn!(%err, "skipping input line"),
                Some(Err(err)) => return Err(err),
                None => return Ok(Stop::EndOfInput),
            },
            _ = ticker.tick() => collector.tick(),
            signalled = &mut interrupt, if listening => match signalled {
                Ok(()) => return Ok(Stop::Interrupted),
                Err(err) => {
                    warn!(%err, "cannot listen for interrupts; stop by closing stdin");
                    listening = false;
                }
            },
        }
    }
}
