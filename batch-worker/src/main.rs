use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use batch_worker::config::Config;
use batch_worker::executor::JobExecutor;
use batch_worker::manifest::S3ManifestStore;
use batch_worker::route_client::RouteClient;
use batch_worker::JobConsumer;
use modelmesh_common::SqliteJobStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        workers = config.pool.workers,
        topic = %config.kafka.topic,
        "Starting ModelMesh batch worker"
    );

    // Initialize collaborators
    let store = Arc::new(SqliteJobStore::open(&config.store.url)?);
    let manifests = Arc::new(S3ManifestStore::new(&config.object_store).await?);
    let route_client = Arc::new(RouteClient::new(
        &config.router.base_url,
        Duration::from_secs(config.pool.item_timeout_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let executor = Arc::new(JobExecutor::new(
        store.clone(),
        manifests,
        route_client,
        config.pool.workers,
        shutdown_rx.clone(),
    ));

    let mut consumer = JobConsumer::new(&config.kafka, executor, store, shutdown_rx)?;

    // Signal handler: flip the shutdown flag, then enforce the drain budget.
    let grace = Duration::from_secs(config.pool.shutdown_grace_secs);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining");
        let _ = shutdown_tx.send(true);

        tokio::time::sleep(grace).await;
        tracing::warn!("drain budget exceeded, exiting");
        std::process::exit(1);
    });

    consumer.run().await?;

    tracing::info!("batch worker stopped");
    Ok(())
}
