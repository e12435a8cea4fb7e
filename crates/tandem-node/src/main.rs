//! Tandem host node.
//!
//! Wires the durable backend, the in-process broadcast hub, the NATS
//! gateway to client views and the timer driver, then runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tandem-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to Dragonfly
//! 4. Start the timer driver with the scope broadcast handler
//! 5. Connect to NATS and start the session gateway
//! 6. Wait for Ctrl-C, then stop the driver and the gateway

mod config;
mod error;
mod gateway;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tandem_db::DragonflyPool;
use tandem_server::{LocalHub, ScopeBroadcastHandler, ServerContext};
use tandem_timers::{SystemClock, TimerDriver, TimerQueue};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::TandemConfig;
use crate::error::NodeError;
use crate::gateway::NatsGateway;

/// Application entry point for the node.
///
/// # Errors
///
/// Returns an error if configuration, backend or NATS setup fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        dragonfly_url = %config.backend.dragonfly_url,
        nats_url = %config.transport.nats_url,
        subject_prefix = %config.transport.subject_prefix,
        sweep_interval_ms = config.timers.sweep_interval_ms,
        "tandem-node starting"
    );

    // 3. Connect to Dragonfly.
    let pool = DragonflyPool::connect(&config.backend.dragonfly_url)
        .await
        .map_err(NodeError::from)?;
    let backend = Arc::new(pool);
    let hub = LocalHub::new();
    let ctx = ServerContext::new(backend.clone(), Arc::new(hub.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 4. Timer driver.
    let queue = TimerQueue::new(backend, Arc::new(SystemClock), config.timers.queue_key.clone());
    let driver = TimerDriver::new(queue, Arc::new(ScopeBroadcastHandler::new(Arc::new(hub.clone()))));
    let period = Duration::from_millis(config.timers.sweep_interval_ms.max(1));
    let driver_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { driver.run(period, shutdown).await })
    };

    // 5. NATS gateway.
    let gateway = NatsGateway::connect(
        &config.transport.nats_url,
        config.transport.subject_prefix.clone(),
        ctx,
        hub,
    )
    .await?;
    let gateway_task = tokio::spawn(gateway.run(shutdown_rx));

    // 6. Run until interrupted.
    tokio::signal::ctrl_c().await.map_err(NodeError::from)?;
    info!("shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("no running tasks to stop");
    }

    if let Err(err) = driver_task.await {
        warn!(error = %err, "timer driver task ended abnormally");
    }
    match gateway_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "gateway stopped with an error"),
        Err(err) => warn!(error = %err, "gateway task ended abnormally"),
    }

    info!("tandem-node shutdown complete");
    Ok(())
}

/// Load `tandem-config.yaml` from the working directory, or defaults.
fn load_config() -> Result<TandemConfig, NodeError> {
    let config_path = Path::new("tandem-config.yaml");
    if config_path.exists() {
        Ok(TandemConfig::from_file(config_path)?)
    } else {
        let mut config = TandemConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}
