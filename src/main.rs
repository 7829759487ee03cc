//! Crypto Data Stream - Entry Point
//!
//! Initializes configuration, logging, the Redis store and the combined
//! stream connection, then runs the ingestion loop until SIGINT/SIGTERM
//! or a transport failure.
//!
//! Wiring sequence:
//! 1. Load config (path from STREAM_CONFIG, default config.toml) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Spawn signal listener feeding the broadcast shutdown channel
//! 4. Spawn metrics (/metrics) and health (/live, /ready) servers
//! 5. Connect Redis (startup PING) and build the repository
//! 6. Register market handlers, freeze the registry, build the router
//! 7. Subscribe the loop to shutdown, then connect the combined stream
//! 8. Run the ingestion loop; on signal close the stream, then join tasks

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crypto_data_stream::adapters::feeds::{
    register_market_handlers, HandlerRegistry, MessageRouter, StreamConnection,
};
use crypto_data_stream::adapters::metrics::{HealthServer, HealthState, IngestMetrics};
use crypto_data_stream::adapters::persistence::{MarketRepository, RedisStore};
use crypto_data_stream::config;
use crypto_data_stream::ports::frame_source::{ConnectError, FrameSource};
use crypto_data_stream::ports::market_store::MarketStore;
use crypto_data_stream::usecases::IngestionLoop;

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "STREAM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Bound on joining spawned tasks after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Interval between store health pings.
const STORE_PING_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        symbols = ?config.stream.symbols,
        "Starting crypto data stream"
    );

    // ── 3. Shutdown channel fed by SIGINT/SIGTERM ───────────
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = signal_tx.send(());
    });

    // ── 4. Metrics + health servers ─────────────────────────
    let metrics = Arc::new(IngestMetrics::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new());
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    if config.metrics.enabled {
        let server = Arc::clone(&metrics);
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(e) = server.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }));

        let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let rx = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(e) = health_server.run(rx).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    // ── 5. Redis store + repository ─────────────────────────
    let store = Arc::new(
        RedisStore::connect(&config.redis)
            .await
            .context("Failed to connect to Redis")?,
    );
    health.set_store_healthy(true);
    background.push(tokio::spawn(monitor_store(
        Arc::clone(&store),
        Arc::clone(&health),
        shutdown_tx.subscribe(),
    )));

    let repository = Arc::new(MarketRepository::new(
        store,
        config.retention.policies(),
    ));

    // ── 6. Handlers are registered before the loop starts ───
    let mut registry = HandlerRegistry::new();
    register_market_handlers(&mut registry, repository);
    let router = MessageRouter::new(Arc::new(registry)).with_metrics(Arc::clone(&metrics));

    // ── 7. Combined stream connection ───────────────────────
    // The loop's receiver exists before connect so a signal landing
    // between connect and spawn is still delivered to it.
    let loop_rx = shutdown_tx.subscribe();
    let connection = Arc::new(StreamConnection::from_config(&config.stream));
    match connection.connect(&mut shutdown_rx).await {
        Ok(()) => {}
        Err(ConnectError::Cancelled) => {
            info!("Shutdown requested during connect");
            join_background(background).await;
            return Ok(());
        }
        Err(e) => {
            let _ = shutdown_tx.send(());
            join_background(background).await;
            return Err(e).context("Failed to connect to combined stream");
        }
    }
    metrics.feed_connected.set(1);
    health.set_feed_connected(true);

    // ── 8. Ingestion loop ───────────────────────────────────
    let ingestion = IngestionLoop::new(Arc::clone(&connection), router)
        .with_metrics(Arc::clone(&metrics));
    let mut ingestion_handle = tokio::spawn(async move { ingestion.run(loop_rx).await });

    info!(topics = connection.topics().len(), "Ingestion running");

    let outcome = tokio::select! {
        result = &mut ingestion_handle => result,
        _ = shutdown_rx.recv() => {
            info!("Waiting for ingestion loop to stop...");
            if let Err(e) = connection.close().await {
                warn!(error = %e, "Combined stream close failed");
            }
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut ingestion_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Ingestion loop did not stop in time, aborting");
                    ingestion_handle.abort();
                    health.set_feed_connected(false);
                    join_background(background).await;
                    return Ok(());
                }
            }
        }
    };

    health.set_feed_connected(false);
    let _ = shutdown_tx.send(());
    join_background(background).await;

    match outcome.context("Ingestion task panicked")? {
        Ok(stats) => {
            info!(frames = stats.frames, "Shutdown complete");
            Ok(())
        }
        Err(e) => Err(e).context("Ingestion terminated on transport failure"),
    }
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for SIGINT only");
                let _ = signal::ctrl_c().await;
                info!("SIGINT received, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("SIGINT received, initiating graceful shutdown");
    }
}

/// Ping the store periodically and publish the result to readiness.
async fn monitor_store(
    store: Arc<RedisStore>,
    health: Arc<HealthState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(STORE_PING_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let healthy = match store.ping().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Store ping failed");
                        false
                    }
                };
                health.set_store_healthy(healthy);
            }
        }
    }
}

async fn join_background(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }
}
