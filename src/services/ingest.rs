//! Ingest consumer: drives the idempotency gate and the processor for every
//! record of the received topic, retries transient failures with exponential
//! backoff, and routes exhausted or poisoned records to the dead-letter
//! topic.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::{
    BusProducer, PartitionConsumer, Record, EXCEPTION_CLASS_HEADER, EXCEPTION_MESSAGE_HEADER,
    IDEMPOTENCY_KEY_HEADER,
};
use crate::config::RetryConfig;
use crate::dto::OrderRequest;
use crate::metrics;
use crate::services::{ClaimOutcome, IdempotencyGate, OrderProcessor};

/// Exponential backoff schedule between delivery attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            max_interval: Duration::from_millis(config.max_interval_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after `failed_attempts` attempts have failed, before the
    /// next one: initial * multiplier^(failed_attempts - 1), capped.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = self.multiplier.powi(exponent as i32);
        let millis = (self.initial_interval.as_millis() as f64 * factor)
            .min(self.max_interval.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Pause before re-polling a record whose gate claim could not be
    /// attempted at all (KV store outage).
    pub fn redelivery_pause(&self) -> Duration {
        self.initial_interval
    }
}

/// What to do with the consumed record.
enum Disposition {
    /// Handled (processed, skipped, or dead-lettered): commit the offset.
    Commit,
    /// Infrastructure prevented a decision: leave uncommitted so the record
    /// is redelivered.
    Redeliver,
}

pub struct IngestWorker {
    gate: Arc<IdempotencyGate>,
    processor: Arc<OrderProcessor>,
    producer: Arc<dyn BusProducer>,
    dlt_topic: String,
    retry: RetryPolicy,
}

impl IngestWorker {
    pub fn new(
        gate: Arc<IdempotencyGate>,
        processor: Arc<OrderProcessor>,
        producer: Arc<dyn BusProducer>,
        dlt_topic: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gate,
            processor,
            producer,
            dlt_topic,
            retry,
        }
    }

    /// Consumes one partition until shutdown. An in-flight record is always
    /// handled to completion before the loop observes the cancellation.
    pub async fn run<C: PartitionConsumer>(&self, mut consumer: C, shutdown: CancellationToken) {
        loop {
            let delivered = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = consumer.next() => match next {
                    Ok(Some(delivered)) => delivered,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Ingest consumer poll failed: {}", e);
                        break;
                    }
                },
            };

            match self.handle(&delivered.record).await {
                Disposition::Commit => {
                    if let Err(e) = consumer.commit(&delivered).await {
                        tracing::error!("Failed to commit ingest offset: {}", e);
                    }
                }
                Disposition::Redeliver => {
                    tokio::time::sleep(self.retry.redelivery_pause()).await;
                }
            }
        }
    }

    async fn handle(&self, record: &Record) -> Disposition {
        let Some(idempotency_key) = record.headers.get_str(IDEMPOTENCY_KEY_HEADER) else {
            tracing::error!("Record is missing the idempotency key header; routing to DLT");
            self.send_to_dlt(
                record,
                "MissingIdempotencyKey",
                "record is missing the x-idempotency-key header",
            )
            .await;
            return Disposition::Commit;
        };

        match self.gate.try_claim(&idempotency_key).await {
            Ok(ClaimOutcome::Claimed) => {
                tracing::info!(
                    "Idempotency key {} acquired, starting processing",
                    idempotency_key
                );
            }
            Ok(ClaimOutcome::AlreadyProcessed) => {
                tracing::info!(
                    "Order with idempotency key {} already processed, skipping",
                    idempotency_key
                );
                return Disposition::Commit;
            }
            Ok(ClaimOutcome::AlreadyProcessing) => {
                tracing::warn!(
                    "Skipping key {} already marked as PROCESSING; the holder or its retries are responsible",
                    idempotency_key
                );
                return Disposition::Commit;
            }
            Ok(ClaimOutcome::Unknown(value)) => {
                tracing::error!(
                    "Skipping key {} due to unexpected gate value {:?}",
                    idempotency_key,
                    value
                );
                return Disposition::Commit;
            }
            Err(e) => {
                // Processing must not proceed without a claim; the record
                // stays uncommitted and comes back.
                tracing::warn!(
                    "Idempotency gate unavailable for key {}: {}; record will be redelivered",
                    idempotency_key,
                    e
                );
                return Disposition::Redeliver;
            }
        }

        let request: OrderRequest = match serde_json::from_slice(&record.payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(
                    "Could not decode order request for key {}: {}",
                    idempotency_key,
                    e
                );
                self.send_to_dlt(record, "PayloadUndecodable", &e.to_string()).await;
                return Disposition::Commit;
            }
        };

        self.process_with_retry(record, &request, &idempotency_key).await
    }

    async fn process_with_retry(
        &self,
        record: &Record,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Disposition {
        let mut attempt = 1u32;

        loop {
            match self.processor.process(request, idempotency_key).await {
                Ok(_) => {
                    if let Err(e) = self.gate.mark_completed(idempotency_key).await {
                        // The row is committed; a later duplicate runs into
                        // the unique index instead of the gate.
                        tracing::warn!(
                            "Failed to mark key {} as PROCESSED in the gate: {}",
                            idempotency_key,
                            e
                        );
                    }
                    metrics::record_order_processed();
                    return Disposition::Commit;
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts() => {
                    tracing::warn!(
                        "Attempt {}/{} failed for key {}: {}; backing off",
                        attempt,
                        self.retry.max_attempts(),
                        idempotency_key,
                        e
                    );
                    metrics::record_processing_retry();
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Giving up on key {} after {} attempt(s): {}",
                        idempotency_key,
                        attempt,
                        e
                    );
                    self.send_to_dlt(record, e.class(), &e.to_string()).await;
                    return Disposition::Commit;
                }
            }
        }
    }

    /// Re-produces the original record to the DLT with diagnostic headers
    /// naming the failure.
    async fn send_to_dlt(&self, record: &Record, class: &str, message: &str) {
        let headers = record
            .headers
            .clone()
            .with(EXCEPTION_CLASS_HEADER, class)
            .with(EXCEPTION_MESSAGE_HEADER, message);

        let dlt_record = Record::new(record.key.clone(), record.payload.clone(), headers);

        match self.producer.send(&self.dlt_topic, dlt_record).await {
            Ok(()) => {
                tracing::warn!("Record routed to DLT {} ({}: {})", self.dlt_topic, class, message);
                metrics::record_record_dead_lettered();
            }
            Err(e) => {
                tracing::error!("Failed to produce record to DLT {}: {}", self.dlt_topic, e);
            }
        }
    }
}
