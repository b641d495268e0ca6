use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use prometheus_client::registry::Registry;
use starfall_bot::api::{router, AppState};
use starfall_bot::dispatch::Dispatcher;
use starfall_bot::emitter::{DevEmitter, Emitter, TransportEmitter};
use starfall_bot::Config;
use starfall_engine::ledger::Ledger;
use starfall_engine::payment::Correlator;
use starfall_engine::queue::Queue;
use starfall_engine::referral::Referrals;
use starfall_engine::session::Coordinator;
use starfall_engine::store::{Mirrored, PgStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the bot YAML configuration.
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_file =
        std::fs::read_to_string(&args.config).context("could not read config file")?;
    let config: Config = serde_yaml::from_str(&config_file).context("could not parse config")?;
    let config = config.validate().context("invalid config")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    // The durable store degrades to an in-memory mirror when unreachable.
    let primary = PgStore::connect(&config.database_url)
        .await
        .context("failed to connect to storage")?;
    let store = Arc::new(Mirrored::new(primary));

    let emitter = match &config.transport_url {
        Some(url) => Emitter::Transport(TransportEmitter::new(url.clone())),
        None => {
            warn!("no transport configured, rolling dice locally (dev mode)");
            Emitter::Dev(DevEmitter)
        }
    };

    let mut registry = Registry::default();
    let ledger = Ledger::new(store.clone());
    let referrals = Referrals::new(store.clone(), ledger.clone());
    let queue = Queue::new(store.clone());
    let correlator = Correlator::new(store.clone(), ledger.clone());
    let coordinator = Arc::new(Coordinator::new(
        ledger.clone(),
        referrals.clone(),
        queue,
        emitter,
        &mut registry,
    ));
    let dispatcher = Dispatcher::new(ledger, referrals, correlator, coordinator);

    let state = Arc::new(AppState {
        dispatcher,
        registry,
    });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}
