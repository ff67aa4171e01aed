use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

use eventgen::{
    ArchiveTarget, Credentials, RelationalTarget, StreamConfig, StreamDriver, StreamTarget,
    ARCHIVE_ROOT, DB_PATH, STREAM_PATH,
};

#[derive(Parser)]
#[command(name = "eventgen")]
#[command(about = "Stream synthetic user lifecycle events to relational and archival targets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start streaming events to the configured targets
    StartStream {
        /// Path of the config file containing the target credentials
        #[arg(short, long)]
        config_path: PathBuf,

        /// Recreate the tables (and purge the archive) before streaming
        #[arg(short, long)]
        recreate: bool,

        /// Time in seconds to wait between generating events
        #[arg(short, long, default_value_t = 1.0)]
        event_lag: f64,

        /// Time in seconds to run the stream
        #[arg(short, long, default_value_t = 60)]
        duration: u64,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::StartStream {
            config_path,
            recreate,
            event_lag,
            duration,
            seed,
        } => start_stream(&config_path, recreate, event_lag, duration, seed),
    }
}

fn start_stream(
    config_path: &Path,
    recreate: bool,
    event_lag: f64,
    duration: u64,
    seed: Option<u64>,
) -> Result<()> {
    if !event_lag.is_finite() || event_lag <= 0.0 {
        bail!("event lag must be a positive number of seconds");
    }
    if duration == 0 {
        bail!("duration must be a positive number of seconds");
    }

    let credentials = Credentials::load(config_path)?;

    let relational = RelationalTarget::open(Path::new(credentials.get(DB_PATH)?))?;
    info!("connection to relational store established");
    let archive = ArchiveTarget::open(Path::new(credentials.get(ARCHIVE_ROOT)?))?;
    info!("archive target ready");

    let config = StreamConfig {
        recreate,
        event_interval: Duration::from_secs_f64(event_lag),
        duration: Duration::from_secs(duration),
    };
    let mut driver = StreamDriver::new(relational, archive, config);

    if let Some(stream_path) = credentials.get_opt(STREAM_PATH) {
        driver.add_sink(Box::new(StreamTarget::open(Path::new(stream_path))?));
        info!(path = stream_path, "streaming sink attached");
    }

    let stop = driver.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let stats = driver.run(&mut rng)?;
    info!(
        generated = stats.generated,
        applied = stats.applied,
        "stream finished"
    );

    Ok(())
}
