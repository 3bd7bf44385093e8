//! Market Data Gateway Binary
//!
//! Starts the quote session gateway against the in-process simulated
//! endpoint and fans normalized ticks out over a broadcast channel.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin md-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MD_CLIENT_ID`: Initial client id
//! - `MD_USER_ID`: Quote account user id
//! - `MD_PASSWORD`: Quote account password
//! - `MD_HOST` / `MD_PORT`: Quote endpoint
//!
//! ## Optional
//! - `MD_UDP_BUFFER_SIZE_MB`: Use UDP with this receive buffer (default: TCP)
//! - `MD_INSTRUMENTS`: Comma-separated `id[:venue]` list subscribed at start
//! - `MD_MAX_COLLISION_RETRIES`: Client id collision retries (default: 16)
//! - `MD_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `MD_BROADCAST_CAPACITY`: Tick channel capacity (default: 10000)
//! - `MD_TICK_INTERVAL_MS`: Simulated tick interval (default: 500)
//! - `MD_SIM_COLLIDING_IDS`: Client ids the simulator reports as in use
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-md-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use md_gateway::infrastructure::broadcast::{BroadcastConfig, BroadcastSink};
use md_gateway::infrastructure::health::{HealthServer, HealthServerState};
use md_gateway::infrastructure::telemetry;
use md_gateway::{ConnectOutcome, GatewayConfig, MdEngine, SimulatorFactory, init_metrics};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting market data gateway");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Downstream sink
    let sink = Arc::new(BroadcastSink::new(BroadcastConfig::from(
        config.broadcast.clone(),
    )));

    // Engine over the simulated endpoint
    let factory = SimulatorFactory::new(&config.simulator);
    let engine = MdEngine::load(config.engine_config(), Arc::new(factory), sink.clone());

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&engine),
        Arc::clone(&sink),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn tick consumer
    let mut ticks = sink.subscribe();
    let consumer_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = consumer_shutdown.cancelled() => break,
                received = ticks.recv() => match received {
                    Ok(tick) => tracing::debug!(
                        instrument = %tick.instrument_id,
                        venue = %tick.venue,
                        last = %tick.last_price,
                        volume = tick.volume,
                        "Tick"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Tick consumer lagging");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    // Log in and subscribe; the vendor calls block
    let starter = Arc::clone(&engine);
    match tokio::task::spawn_blocking(move || starter.start()).await? {
        Ok(ConnectOutcome::Rejected(err)) => {
            tracing::error!(code = err.code, message = %err.message, "Login rejected");
        }
        Ok(outcome) => tracing::info!(?outcome, "Quote session ready"),
        Err(e) => {
            tracing::error!(error = %e, "Quote session failed");
            shutdown_token.cancel();
            return Err(e.into());
        }
    }

    tracing::info!("Market data gateway ready");

    await_shutdown(shutdown_token).await;

    let stopper = Arc::clone(&engine);
    let stopped = tokio::time::timeout(
        SHUTDOWN_TIMEOUT,
        tokio::task::spawn_blocking(move || stopper.stop()),
    )
    .await;
    if stopped.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Engine stop timed out"
        );
    }

    tracing::info!(status = ?engine.status().ticks, "Market data gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        client_id = config.session.client_id,
        user_id = %config.session.credentials.user_id(),
        transport = %config.session.transport(),
        instruments = config.instruments.len(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        host = %config.session.host,
        port = config.session.port,
        max_collision_retries = config.max_collision_retries,
        tick_interval_ms =
            u64::try_from(config.simulator.tick_interval.as_millis()).unwrap_or(u64::MAX),
        "Quote endpoint"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
