//! Campaigner Worker - async RabbitMQ consumer for bulk campaign dispatch.
//!
//! Consumes start-campaign triggers from the campaigns queue, enumerates
//! eligible subscribers with cursor pagination, partitions them into
//! provider-sized batches and publishes each batch to the delivery queue.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use campaigner::{consumer, Config, Dispatcher, Publisher, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        amqp_url_set = !config.amqp_url.is_empty(),
        concurrency = config.worker_concurrency,
        page_size = config.page_size,
        chunk_size = config.chunk_size,
        "config_loaded"
    );

    let store = SqliteStore::connect(&config.database_url).await?;
    store.init_schema().await?;

    let publisher = Publisher::new(config.amqp_url.clone());

    let store = Arc::new(store);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        store,
        Arc::new(publisher.clone()),
        config.page_size,
        config.chunk_size,
    ));

    consumer::run(&config, dispatcher).await?;

    publisher.close().await;

    Ok(())
}
