use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use starfall_engine::queue::Queue;
use starfall_engine::store::PgStore;
use starfall_worker::{Config, HttpGiftService, Worker};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the worker YAML configuration.
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_file =
        std::fs::read_to_string(&args.config).context("could not read config file")?;
    let config: Config = serde_yaml::from_str(&config_file).context("could not parse config")?;

    let log_level = Level::from_str(&config.log_level).context("invalid log level")?;
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let store = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .context("failed to connect to storage")?,
    );
    let queue = Queue::new(store);
    let service = HttpGiftService::new(config.gift_service_url.clone());
    let worker = Worker::new(queue, service.clone(), service);

    info!(gift_service = %config.gift_service_url, "worker started");
    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
        }
    }
    Ok(())
}
