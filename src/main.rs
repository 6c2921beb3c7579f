use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow::adapters::{PostgresOrderRepository, RedisKeyValueStore};
use orderflow::bus::{BusProducer, InMemoryBroker};
use orderflow::config::Config;
use orderflow::ports::{KeyValueStore, OrderRepository};
use orderflow::services::{
    CompletionPublisher, DltReconciler, IdempotencyGate, IngestWorker, OrderProcessor, RetryPolicy,
};
use orderflow::{create_app, metrics, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    metrics::init_metrics();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("startup validation failed");
    }

    // Bus topics. The in-memory broker is the reference implementation of
    // the bus seam; deployments swap in an adapter for their broker.
    let broker = InMemoryBroker::new();
    broker.create_topic(&config.orders_received_topic, config.topic_partitions);
    broker.create_topic(&config.orders_dlt_topic, config.topic_partitions);
    broker.create_topic(&config.orders_processed_topic, config.topic_partitions);
    let producer: Arc<dyn BusProducer> = Arc::new(broker.producer());

    let repository: Arc<dyn OrderRepository> = Arc::new(PostgresOrderRepository::new(pool.clone()));
    let kv_store: Arc<dyn KeyValueStore> = Arc::new(RedisKeyValueStore::new(&config.redis_url)?);
    let gate = Arc::new(IdempotencyGate::new(kv_store, &config.idempotency));

    let publisher = CompletionPublisher::new(
        producer.clone(),
        config.orders_processed_topic.clone(),
    );
    let processor = Arc::new(OrderProcessor::new(repository.clone(), publisher));

    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();

    let ingest_worker = Arc::new(IngestWorker::new(
        gate,
        processor,
        producer.clone(),
        config.orders_dlt_topic.clone(),
        RetryPolicy::from_config(&config.retry),
    ));
    for consumer in broker.subscribe(&config.consumer_group_id, &config.orders_received_topic)? {
        let worker = ingest_worker.clone();
        let token = shutdown.clone();
        workers.push(tokio::spawn(async move { worker.run(consumer, token).await }));
    }

    let reconciler = Arc::new(DltReconciler::new(repository.clone()));
    for consumer in broker.subscribe(&config.dlt_group_id(), &config.orders_dlt_topic)? {
        let reconciler = reconciler.clone();
        let token = shutdown.clone();
        workers.push(tokio::spawn(async move { reconciler.run(consumer, token).await }));
    }

    tracing::info!(
        "Started {} pipeline workers ({} partitions per topic)",
        workers.len(),
        config.topic_partitions
    );

    let state = AppState {
        repository,
        producer,
        received_topic: config.orders_received_topic.clone(),
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The signal handler cancelled the token; wait for every worker to
    // finish its in-flight record before exiting.
    shutdown.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    tracing::info!("Pipeline workers drained, shutting down");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, draining pipeline workers");
    shutdown.cancel();
}
