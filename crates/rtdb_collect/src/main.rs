mod classify;
mod collect;

use std::io;

use clap::{Parser, Subcommand};
use rtdb_traffic::{ConfigError, LineError};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rtdb-collect")]
#[command(about = "Realtime-database traffic accounting from client debug logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read debug lines from stdin and deliver traffic batches to dated JSONL tables.
    Collect(collect::Args),
    /// Print how each stdin line is classified, one JSON object per line.
    Classify(classify::Args),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed reading input: {0}")]
    Input(#[from] LineError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtdb_collect=info,rtdb_traffic=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<(), Error> {
    init_tracing();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async {
        match cli.command {
            Command::Collect(args) => collect::run(args).await,
            Command::Classify(args) => classify::run(args).await,
        }
    });
    // An interrupted run can leave the stdin reader blocked in read(2).
    runtime.shutdown_background();
    result
}
