//! Stream enrichment worker.
//!
//! Seeds the in-memory inbound stream from a JSON-lines file of location
//! events, runs a group of batch workers over it and writes the outbound
//! stream as JSON lines.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use placemark::stream::{BatchWorker, MemoryBroker, Shutdown, StreamBroker, WorkerStats};
use placemark::{Config, Pipeline};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Enrich location events from a stream")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "placemark.toml")]
    config: PathBuf,

    /// JSON-lines file of location events to publish on the inbound stream
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the outbound stream (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of worker instances in the consumer group (overrides config)
    #[arg(long)]
    instances: Option<usize>,

    /// Keep polling after the input is drained, until Ctrl-C
    #[arg(long)]
    follow: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str())))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Placemark Worker");
    let mut config = Config::load_from_file(&args.config)?;
    if let Some(instances) = args.instances {
        anyhow::ensure!(instances > 0, "--instances must be positive");
        config.worker.instances = instances;
    }

    let pipeline = Pipeline::load(&config)?;

    let broker = MemoryBroker::new(Duration::from_millis(config.stream.claim_idle_ms));
    broker
        .create_group(&config.stream.inbound, &config.stream.group)
        .await?;
    let seeded = seed_inbound(&broker, &config.stream.inbound, &args.input).await?;
    info!("Published {} events to {}", seeded, config.stream.inbound);

    let shutdown = Shutdown::new();
    let shared: Arc<dyn StreamBroker> = Arc::new(broker.clone());

    let handles: Vec<_> = (0..config.worker.instances)
        .map(|instance| {
            let worker = BatchWorker::new(
                Arc::clone(&shared),
                pipeline.orchestrator.clone(),
                config.worker_config(instance),
            );
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect();

    let stop_when_drained = async {
        if args.follow {
            std::future::pending::<()>().await;
        }
        while !broker.is_drained(&config.stream.inbound, &config.stream.group).await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping workers");
        }
        _ = stop_when_drained => info!("Inbound stream drained"),
    }
    shutdown.trigger();

    let mut total = WorkerStats::default();
    for joined in join_all(handles).await {
        match joined.context("Worker task panicked")? {
            Ok(stats) => accumulate(&mut total, &stats),
            Err(e) => warn!("Worker stopped with error: {}", e),
        }
    }

    let written = write_outbound(&broker, &config.stream.outbound, args.output.as_deref()).await?;
    info!(
        "Done: {} polled, {} malformed, {} published, {} publish failures, {} batch failures; {} events written",
        total.polled, total.malformed, total.published, total.publish_failures, total.batch_failures, written
    );

    Ok(())
}

async fn seed_inbound(broker: &MemoryBroker, stream: &str, path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut count = 0;

    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        broker.publish(stream, line.trim()).await?;
        count += 1;
    }

    Ok(count)
}

async fn write_outbound(broker: &MemoryBroker, stream: &str, output: Option<&Path>) -> Result<usize> {
    let entries = broker.entries(stream).await;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    for entry in &entries {
        writeln!(writer, "{}", entry.payload)?;
    }
    writer.flush()?;

    Ok(entries.len())
}

fn accumulate(total: &mut WorkerStats, stats: &WorkerStats) {
    total.iterations += stats.iterations;
    total.polled += stats.polled;
    total.malformed += stats.malformed;
    total.published += stats.published;
    total.publish_failures += stats.publish_failures;
    total.acked += stats.acked;
    total.batch_failures += stats.batch_failures;
}
