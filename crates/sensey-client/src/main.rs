//! Sensey client - polls sensors and delivers readings to the collector.
//!
//! Run with: `cargo run -p sensey-client`

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use sensey_client::poller::Sensor;
use sensey_client::{
    Backoff, Config, DeliveryWorker, DurableQueue, HttpTransport, Poller, SimulatedSensor,
};

/// Sensey client - polls sensors and delivers readings to the collector.
#[derive(Parser, Debug)]
#[command(name = "sensey-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client id (overrides config).
    #[arg(long)]
    client_id: Option<String>,

    /// Collector base URL (overrides config).
    #[arg(short, long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sensey_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_validated(path)?,
        None => Config::default(),
    };
    if let Some(client_id) = args.client_id {
        config.client_id = client_id;
    }
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    config.validate()?;

    info!(
        "Starting client {} against {}",
        config.client_id, config.server.base_url
    );

    let queue = Arc::new(Mutex::new(DurableQueue::open(
        &config.queue.journal_path,
        config.queue.capacity,
    )?));
    let wakeup = Arc::new(Notify::new());

    let transport = Arc::new(HttpTransport::new(
        &config.server.base_url,
        config.server.timeout(),
    )?);
    let worker = DeliveryWorker::new(
        Arc::clone(&queue),
        transport,
        Backoff::new((&config.backoff).into()),
        Arc::clone(&wakeup),
    );

    let sensors: Vec<Box<dyn Sensor>> = vec![Box::new(SimulatedSensor::indoor_climate())];
    let poller = Poller::new(
        config.client_id.as_str(),
        sensors,
        config.poll.interval(),
        queue,
        wakeup,
    );

    tokio::spawn(worker.run());
    tokio::spawn(poller.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
