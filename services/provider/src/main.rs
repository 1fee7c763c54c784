//! Unikernel instance provider
//!
//! Loads instance records from the state directory and reconciles them
//! against the remote instance API until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ukc_reconcile::ManagedReconciler;

use ukc_provider::client::KraftCloudFactory;
use ukc_provider::config::Config;
use ukc_provider::connector::Connector;
use ukc_provider::store::FileStore;
use ukc_provider::worker::InstanceWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting unikernel instance provider");
    info!(
        state_dir = %config.state_dir,
        poll_interval_secs = config.poll_interval.as_secs(),
        api_endpoint = ?config.api_endpoint,
        fetch_error_policy = ?config.fetch_error_policy,
        "Configuration loaded"
    );

    let store = Arc::new(FileStore::new(&config.state_dir));
    store.init().await?;

    let factory = Arc::new(KraftCloudFactory::new(
        config.api_endpoint.clone(),
        config.http_timeout,
    ));
    let connector = Connector::new(store.clone(), store.clone(), store.clone(), factory)
        .with_fetch_error_policy(config.fetch_error_policy);
    let reconciler = ManagedReconciler::new(connector);

    let worker = InstanceWorker::new(reconciler, store, config.poll_interval);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    // Cancels in-flight calls and stops the loop
    let _ = shutdown_tx.send(true);

    if let Err(e) = worker_handle.await {
        error!(error = %e, "Instance worker panicked");
    }

    info!("Provider shutdown complete");
    Ok(())
}
