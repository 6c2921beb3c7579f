//! Order processing state machine.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Utc;
use std::sync::Arc;

use crate::domain::{Order, OrderItem, OrderStatus};
use crate::dto::OrderRequest;
use crate::error::ProcessingError;
use crate::ports::{OrderRepository, RepositoryError};
use crate::services::CompletionPublisher;

/// Drives a validated order request through
/// RECEIVED -> PROCESSING -> PROCESSED and persists the result.
///
/// The intermediate states exist only in memory; the happy path persists
/// nothing but the final PROCESSED aggregate, inside a single repository
/// transaction. The completion event is handed to the publisher strictly
/// after that transaction has committed.
pub struct OrderProcessor {
    repository: Arc<dyn OrderRepository>,
    publisher: CompletionPublisher,
}

impl OrderProcessor {
    pub fn new(repository: Arc<dyn OrderRepository>, publisher: CompletionPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    pub async fn process(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<Order, ProcessingError> {
        tracing::info!("Processing incoming order for idempotency key {}", idempotency_key);

        request.validate().map_err(ProcessingError::InvalidRequest)?;

        let mut order = request.clone().into_order(idempotency_key);

        order.status = OrderStatus::Processing;
        order.total = Self::calculate_total(&order.items);
        tracing::debug!(
            "Calculated total {} for order key {}",
            order.total,
            idempotency_key
        );

        order.status = OrderStatus::Processed;
        order.updated_at = Utc::now();

        let saved = self.repository.save_new(&order).await.map_err(|e| match e {
            RepositoryError::DuplicateKey(key) => {
                tracing::error!("Duplicate idempotency key {} on save; another worker won", key);
                ProcessingError::DuplicateKey(key)
            }
            other => {
                tracing::error!(
                    "Failed to save processed order for key {}: {}",
                    idempotency_key,
                    other
                );
                ProcessingError::Repository(other)
            }
        })?;

        tracing::info!(
            "Order {} processed and saved for key {}",
            saved.id,
            idempotency_key
        );

        // The repository transaction committed above; the event may fire.
        self.publisher.publish(&saved).await;

        Ok(saved)
    }

    /// Sum of price x quantity over all items, half-up rounded to scale 2.
    fn calculate_total(items: &[OrderItem]) -> BigDecimal {
        items
            .iter()
            .map(|item| item.price.clone() * BigDecimal::from(item.quantity))
            .fold(BigDecimal::from(0), |acc, x| acc + x)
            .with_scale_round(2, RoundingMode::HalfUp)
    }
}
