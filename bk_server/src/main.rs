//! Tournament server: HTTP API plus the auto-confirm and payment deadline
//! sweeps, over PostgreSQL or the in-memory store.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Error};
use bk_server::{
    api::{self, AppState},
    config::ServerConfig,
    logging, metrics,
    sweeps::{self, SweepSchedule},
};
use bracketeer::{ChannelNotifier, MemoryStore, TournamentEngine, TournamentStore, db::Database};
use pico_args::Arguments;
use tokio::{net::TcpListener, sync::watch};

const HELP: &str = "\
Run the bracketeer tournament server

USAGE:
  bk_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/bracketeer]

FLAGS:
  --memory                 Use the in-memory store (state is lost on exit)
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND                      Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL                     PostgreSQL connection string
  METRICS_BIND                     Prometheus scrape address (optional)
  PAYMENT_SWEEP_INTERVAL_SECS      Payment deadline sweep interval [default: 900]
  AUTO_CONFIRM_SCAN_INTERVAL_SECS  Auto-confirm scan interval [default: 60]
  RUST_LOG                         Log filter [default: info,sqlx=warn,hyper=warn]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let use_memory = pargs.contains("--memory");
    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, db_url, use_memory)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    if config.use_memory {
        tracing::warn!("Using the in-memory store; state is lost on exit");
        serve(config, Arc::new(MemoryStore::new()), None).await
    } else {
        tracing::info!("Connecting to database");
        let db = Database::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        let store = db.store();
        store
            .apply_schema()
            .await
            .context("Failed to apply database schema")?;
        tracing::info!("Database connected successfully");

        let result = serve(config, Arc::new(store), Some(db.clone())).await;
        db.close().await;
        result
    }
}

async fn serve<S: TournamentStore>(
    config: ServerConfig,
    store: Arc<S>,
    database: Option<Database>,
) -> Result<(), Error> {
    let (notifier, events) = ChannelNotifier::new();
    let engine = TournamentEngine::new(store, Arc::new(notifier));
    tokio::spawn(logging::log_events(events));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeps::run(
        engine.clone(),
        SweepSchedule {
            auto_confirm_interval: config.auto_confirm_interval,
            payment_sweep_interval: config.payment_sweep_interval,
        },
        shutdown_rx.clone(),
    ));

    let state = AppState { engine, database };
    let storage = state.storage();
    let app = api::create_router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(bind = %config.bind, storage, "Tournament server listening");

    let mut http_shutdown = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = http_shutdown.wait_for(|stop| *stop).await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("HTTP server failed")?;
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Sweep task panicked");
    }

    tracing::info!("Server stopped");
    Ok(())
}
