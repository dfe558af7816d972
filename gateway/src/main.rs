use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway::config::Config;
use gateway::publish::KafkaJobPublisher;
use gateway::AppState;
use modelmesh_common::SqliteJobStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ModelMesh gateway");

    if config.auth.dev_token.is_some() {
        tracing::warn!("development credential is enabled; disable it in production");
    }

    // Initialize collaborators
    let publisher = Arc::new(KafkaJobPublisher::new(
        &config.kafka.brokers,
        &config.kafka.topic,
    )?);
    let job_store = Arc::new(SqliteJobStore::open(&config.store.url)?);

    let state = Arc::new(AppState::new(config.clone(), publisher, job_store));

    // Seed statically configured backends
    for backend in &config.routing.backends {
        state
            .registry
            .register(&backend.model, &backend.version, &backend.url)
            .await;
    }

    let app = gateway::app(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
