//! Dead-letter reconciler: records the permanent failure of dead-lettered
//! orders in the durable store.
//!
//! The last line of defense performs zero retries: every failure here is
//! logged, counted, and the record committed, so the DLT consumer can never
//! loop onto a dead-letter topic of its own.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bus::{
    Headers, PartitionConsumer, Record, EXCEPTION_CLASS_HEADER, EXCEPTION_MESSAGE_HEADER,
    IDEMPOTENCY_KEY_HEADER,
};
use crate::domain::OrderStatus;
use crate::dto::OrderRequest;
use crate::metrics;
use crate::ports::{OrderRepository, RepositoryError};

const UNKNOWN_FAILURE: &str = "Unknown DLT Failure";

pub struct DltReconciler {
    repository: Arc<dyn OrderRepository>,
}

impl DltReconciler {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }

    /// Consumes one DLT partition until shutdown. Records are committed
    /// unconditionally after a single reconciliation attempt.
    pub async fn run<C: PartitionConsumer>(&self, mut consumer: C, shutdown: CancellationToken) {
        loop {
            let delivered = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = consumer.next() => match next {
                    Ok(Some(delivered)) => delivered,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("DLT consumer poll failed: {}", e);
                        break;
                    }
                },
            };

            self.reconcile(&delivered.record).await;

            if let Err(e) = consumer.commit(&delivered).await {
                tracing::error!("Failed to commit DLT offset: {}", e);
            }
        }
    }

    /// Handles a single dead-lettered record. Never returns an error.
    pub async fn reconcile(&self, record: &Record) {
        tracing::error!("Received a dead-lettered order record to reconcile");

        let Some(idempotency_key) = record.headers.get_str(IDEMPOTENCY_KEY_HEADER) else {
            tracing::error!(
                "Cannot mark order as failed: idempotency key missing from DLT record headers"
            );
            return;
        };

        let request = match serde_json::from_slice::<OrderRequest>(&record.payload) {
            Ok(request) => Some(request),
            Err(e) => {
                tracing::error!("Could not decode DLT record payload: {}", e);
                None
            }
        };

        let reason = failure_reason(&record.headers);

        if let Err(e) = self.record_failure(&idempotency_key, request, &reason).await {
            metrics::record_reconcile_failure();
            tracing::error!(
                "Failed to reconcile DLT record for key {}: {}. Record skipped.",
                idempotency_key,
                e
            );
        }
    }

    async fn record_failure(
        &self,
        idempotency_key: &str,
        request: Option<OrderRequest>,
        reason: &str,
    ) -> Result<(), RepositoryError> {
        match self.repository.find_by_idempotency_key(idempotency_key).await? {
            Some(order)
                if matches!(order.status, OrderStatus::Received | OrderStatus::Processing) =>
            {
                self.repository
                    .mark_failed(order.id, order.version, reason)
                    .await?;
                tracing::info!("Marked existing order with key {} as FAILED", idempotency_key);
            }
            Some(order) => {
                tracing::warn!(
                    "Order with key {} already in terminal status {}; leaving it untouched",
                    idempotency_key,
                    order.status
                );
            }
            None => match request {
                Some(request) => {
                    // Create the durable failure record from the decoded
                    // payload; items are taken as-is, without validation.
                    let mut order = request.into_order(idempotency_key);
                    order.status = OrderStatus::Failed;
                    order.total = BigDecimal::from(0);
                    order.failure_reason = Some(reason.to_string());

                    match self.repository.save_new(&order).await {
                        Ok(_) => {
                            tracing::info!(
                                "Created order record with key {} in FAILED status",
                                idempotency_key
                            );
                        }
                        Err(RepositoryError::DuplicateKey(_)) => {
                            tracing::warn!(
                                "Order with key {} appeared concurrently; skipping FAILED record creation",
                                idempotency_key
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    tracing::error!(
                        "Order with key {} not found and payload undecodable; nothing to repair",
                        idempotency_key
                    );
                }
            },
        }

        Ok(())
    }
}

/// Failure reason from the DLT diagnostic headers: the exception message,
/// prefixed by the class when both are present; the class alone otherwise.
fn failure_reason(headers: &Headers) -> String {
    let message = headers
        .get_str(EXCEPTION_MESSAGE_HEADER)
        .filter(|m| !m.trim().is_empty());
    let class = headers
        .get_str(EXCEPTION_CLASS_HEADER)
        .filter(|c| !c.trim().is_empty());

    match (message, class) {
        (Some(message), Some(class)) => format!("{class}: {message}"),
        (Some(message), None) => message,
        (None, Some(class)) => class,
        (None, None) => UNKNOWN_FAILURE.to_string(),
    }
}
