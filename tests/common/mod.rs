//! Shared harness for the pipeline integration tests: an in-memory broker,
//! repository and key-value store wired together exactly like main.rs wires
//! the production adapters.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use orderflow::adapters::{InMemoryKeyValueStore, InMemoryOrderRepository};
use orderflow::bus::{
    BusProducer, Headers, InMemoryBroker, Record, IDEMPOTENCY_KEY_HEADER,
};
use orderflow::config::{IdempotencyConfig, RetryConfig};
use orderflow::domain::Order;
use orderflow::dto::OrderProcessedEvent;
use orderflow::ports::{
    KeyValueStore, KvError, OrderRepository, RepositoryError, RepositoryResult,
};
use orderflow::services::{
    CompletionPublisher, DltReconciler, IdempotencyGate, IngestWorker, OrderProcessor, RetryPolicy,
};

pub const RECEIVED_TOPIC: &str = "orders.received";
pub const DLT_TOPIC: &str = "orders.dlt";
pub const PROCESSED_TOPIC: &str = "orders.processed";

pub fn fast_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_interval_ms: 20,
        multiplier: 2.0,
        max_interval_ms: 50,
    }
}

pub fn idempotency_config() -> IdempotencyConfig {
    IdempotencyConfig {
        processing_ttl_secs: 3600,
        processed_ttl_secs: 86400,
    }
}

/// Repository wrapper that fails `save_new` a configured number of times
/// before delegating, counting every attempt.
pub struct FlakyOrderRepository {
    inner: Arc<InMemoryOrderRepository>,
    failures_remaining: AtomicU32,
    save_attempts: AtomicU32,
}

impl FlakyOrderRepository {
    pub fn new(inner: Arc<InMemoryOrderRepository>, failures: u32) -> Self {
        Self {
            inner,
            failures_remaining: AtomicU32::new(failures),
            save_attempts: AtomicU32::new(0),
        }
    }

    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderRepository for FlakyOrderRepository {
    async fn save_new(&self, order: &Order) -> RepositoryResult<Order> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Connection("injected save failure".to_string()));
        }

        self.inner.save_new(order).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> RepositoryResult<Option<Order>> {
        self.inner.find_by_idempotency_key(key).await
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        self.inner.find_by_id(id).await
    }

    async fn mark_failed(&self, id: Uuid, version: i32, reason: &str) -> RepositoryResult<Order> {
        self.inner.mark_failed(id, version, reason).await
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>> {
        self.inner.list(limit, offset).await
    }

    async fn count(&self) -> RepositoryResult<i64> {
        self.inner.count().await
    }
}

/// Key-value store wrapper that fails claim attempts a configured number of
/// times before delegating, simulating a KV store outage.
pub struct FlakyKeyValueStore {
    inner: InMemoryKeyValueStore,
    failures_remaining: AtomicU32,
}

impl FlakyKeyValueStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryKeyValueStore::new(),
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, KvError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(KvError("injected KV outage".to_string()));
        }
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set(&self, key: &str, value: &str, ttl: std::time::Duration) -> Result<(), KvError> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.inner.delete(key).await
    }
}

pub struct Pipeline {
    pub broker: InMemoryBroker,
    pub store: Arc<InMemoryOrderRepository>,
    pub gate: Arc<IdempotencyGate>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts the pipeline with the plain in-memory repository.
    pub async fn start(partitions: usize) -> Self {
        let store = Arc::new(InMemoryOrderRepository::new());
        Self::start_with(store.clone(), store, partitions).await
    }

    /// Starts the pipeline with a custom repository in front of the
    /// processor (e.g. to inject save failures); the reconciler always works
    /// against the underlying store.
    pub async fn start_with(
        processor_repository: Arc<dyn OrderRepository>,
        store: Arc<InMemoryOrderRepository>,
        partitions: usize,
    ) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        Self::start_with_kv(processor_repository, store, kv, partitions).await
    }

    /// Starts the pipeline with custom repository and key-value store
    /// implementations in front of the processor and the gate.
    pub async fn start_with_kv(
        processor_repository: Arc<dyn OrderRepository>,
        store: Arc<InMemoryOrderRepository>,
        kv: Arc<dyn KeyValueStore>,
        partitions: usize,
    ) -> Self {
        let broker = InMemoryBroker::new();
        broker.create_topic(RECEIVED_TOPIC, partitions);
        broker.create_topic(DLT_TOPIC, partitions);
        broker.create_topic(PROCESSED_TOPIC, partitions);

        let producer: Arc<dyn BusProducer> = Arc::new(broker.producer());
        let gate = Arc::new(IdempotencyGate::new(kv, &idempotency_config()));

        let publisher =
            CompletionPublisher::new(producer.clone(), PROCESSED_TOPIC.to_string());
        let processor = Arc::new(OrderProcessor::new(processor_repository, publisher));

        let shutdown = CancellationToken::new();
        let mut workers = Vec::new();

        let ingest_worker = Arc::new(IngestWorker::new(
            gate.clone(),
            processor,
            producer.clone(),
            DLT_TOPIC.to_string(),
            RetryPolicy::from_config(&fast_retry_config()),
        ));
        for consumer in broker.subscribe("orderflow", RECEIVED_TOPIC).unwrap() {
            let worker = ingest_worker.clone();
            let token = shutdown.clone();
            workers.push(tokio::spawn(async move { worker.run(consumer, token).await }));
        }

        let reconciler = Arc::new(DltReconciler::new(
            store.clone() as Arc<dyn OrderRepository>,
        ));
        for consumer in broker.subscribe("orderflow-dlt", DLT_TOPIC).unwrap() {
            let reconciler = reconciler.clone();
            let token = shutdown.clone();
            workers.push(tokio::spawn(async move { reconciler.run(consumer, token).await }));
        }

        Self {
            broker,
            store,
            gate,
            shutdown,
            workers,
        }
    }

    /// Publishes a record to the received topic. The partitioning key
    /// defaults to the idempotency key when not given explicitly.
    pub async fn send(
        &self,
        partition_key: Option<&str>,
        idempotency_key: Option<&str>,
        payload: &[u8],
    ) {
        let mut headers = Headers::new();
        if let Some(key) = idempotency_key {
            headers.insert(IDEMPOTENCY_KEY_HEADER, key);
        }

        let key = partition_key.or(idempotency_key).map(str::to_string);
        self.broker
            .producer()
            .send(RECEIVED_TOPIC, Record::new(key, payload.to_vec(), headers))
            .await
            .unwrap();
    }

    pub fn completion_events(&self) -> Vec<(Option<String>, OrderProcessedEvent)> {
        self.broker
            .records(PROCESSED_TOPIC)
            .into_iter()
            .map(|record| {
                let event = serde_json::from_slice(&record.payload).unwrap();
                (record.key, event)
            })
            .collect()
    }

    pub fn dlt_records(&self) -> Vec<Record> {
        self.broker.records(DLT_TOPIC)
    }

    pub async fn gate_value(&self, idempotency_key: &str) -> Option<String> {
        self.gate.current_status(idempotency_key).await.unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Polls the condition every 10ms until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > deadline {
            panic!("condition not met within {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn order_payload() -> Vec<u8> {
    br#"{"items":[{"productId":"P1","quantity":2,"price":10.00},{"productId":"P2","quantity":1,"price":5.25}]}"#
        .to_vec()
}
