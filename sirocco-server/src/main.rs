//! # Sirocco Server
//!
//! Supervises per-account portfolios: re-prices exchange balances into
//! reference currencies on every balance update, evaluates user-defined
//! triggers and publishes fired-trigger events onto the message bus.
//! Portfolios are managed through a small JWT-protected HTTP surface and
//! through account lifecycle events consumed from the same bus.
//!
//! ```bash
//! # Run with the default configuration file
//! sirocco-server
//!
//! # Run with a custom configuration file and debug logging
//! sirocco-server --config /etc/sirocco/config.yaml --debug
//! ```

#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use sirocco_api::mq::{BusTriggerEventSink, EventConsumer};
use sirocco_api::{health_router, router, ApiState, HealthState};
use sirocco_bus::{BusConnection, ChannelPool};
use sirocco_core::shutdown::{self, ShutdownController};
use sirocco_core::{telemetry, AppConfig};
use sirocco_engine::PortfolioManager;
use sirocco_gateway::GatewayRegistry;
use sirocco_store::{connect_redis, PgRepository, RedisSnapshotCache};

const REST_PORT: u16 = 8080;
const HEALTH_PORT: u16 = 9090;
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

/// Sirocco portfolio supervisor.
#[derive(Parser, Debug)]
#[command(name = "sirocco-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging regardless of the configured level.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("sirocco-server failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if args.debug {
        config.log.level = "debug".to_string();
    }
    telemetry::init_logging(&config.log)?;
    info!(path = %args.config.display(), server_name = %config.server_name, "Configuration loaded");

    let jwt_secret = std::fs::read(&config.jwt_secret_path)
        .map_err(|e| format!("failed to read JWT secret {}: {e}", config.jwt_secret_path))?;

    // Storage. Both are fatal when unreachable at boot.
    let repo = Arc::new(PgRepository::connect(&config.db).await?);
    let cache = Arc::new(RedisSnapshotCache::new(connect_redis(&config.redis).await?));

    // Message bus.
    let bus = BusConnection::connect(&config.amqp.uri, &config.server_name).await?;
    let pool = ChannelPool::new(bus.clone(), config.amqp.channel_pool_size);

    let gateways = Arc::new(build_gateways());
    let events = Arc::new(BusTriggerEventSink::new(pool.clone()));
    let manager = Arc::new(PortfolioManager::new(
        repo,
        cache,
        gateways,
        events,
    ));
    manager.start().await?;

    let controller = ShutdownController::new();
    tokio::spawn(shutdown::listen_for_signals(controller.clone()));

    // Account-event consumer.
    let consumer = EventConsumer::new(&config.server_name, pool.clone(), manager.clone());
    let consumer_shutdown = controller.subscribe();
    let consumer_handle = tokio::spawn(async move { consumer.run(consumer_shutdown).await });

    // Health probe.
    let health_state = Arc::new(HealthState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        bus: bus.clone(),
    });
    let health_listener = tokio::net::TcpListener::bind(("0.0.0.0", HEALTH_PORT)).await?;
    info!(port = HEALTH_PORT, "Starting health HTTP server");
    let health_handle = tokio::spawn(serve(
        health_listener,
        health_router(health_state),
        controller.clone(),
    ));

    // Portfolio API.
    let api_state = ApiState::new(manager.clone(), &jwt_secret);
    let api_listener = tokio::net::TcpListener::bind(("0.0.0.0", REST_PORT)).await?;
    info!(port = REST_PORT, "Starting HTTP server");
    let api_handle = tokio::spawn(serve(api_listener, router(api_state), controller.clone()));

    // Block until a signal arrives, then tear everything down with a
    // bounded deadline; workers that miss it are abandoned.
    let mut shutdown_rx = controller.subscribe();
    let _ = shutdown_rx.recv().await;
    info!("Start shutdown");

    {
        let controller = controller.clone();
        tokio::spawn(async move {
            manager.close();
            let _ = consumer_handle.await;
            let _ = api_handle.await;
            let _ = health_handle.await;
            pool.close();
            bus.shutdown().await;
            controller.mark_done();
        });
    }

    if controller.wait_done(SHUTDOWN_DEADLINE).await {
        info!("Shutdown complete");
    }
    Ok(())
}

/// Serves a router until the controller fires.
async fn serve(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    controller: ShutdownController,
) {
    let mut shutdown_rx = controller.subscribe();
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await;
    if let Err(error) = result {
        warn!(%error, "HTTP server terminated abnormally");
        controller.trigger();
    }
}

/// Builds the exchange-adapter registry.
///
/// The adapter library is deployment-specific and linked in by downstream
/// builds; with no adapter registered, every account is skipped with a
/// warning until one is.
fn build_gateways() -> GatewayRegistry {
    let registry = GatewayRegistry::new();
    if registry.is_empty() {
        warn!("No exchange adapters registered, all accounts will be skipped");
    }
    registry
}
