//! Completion event publisher.

use std::sync::Arc;

use crate::bus::{BusProducer, Headers, Record};
use crate::domain::Order;
use crate::dto::OrderProcessedEvent;
use crate::metrics;

/// Publishes the completion event for a processed order, keyed by the order
/// id.
///
/// Must only be invoked after the processing transaction has committed. A
/// send failure never propagates: the database row is the state of record,
/// and rolling back a committed order over a lost notification would be
/// worse than the lost notification. Failures are logged and counted.
pub struct CompletionPublisher {
    producer: Arc<dyn BusProducer>,
    topic: String,
}

impl CompletionPublisher {
    pub fn new(producer: Arc<dyn BusProducer>, topic: String) -> Self {
        Self { producer, topic }
    }

    pub async fn publish(&self, order: &Order) {
        let event = OrderProcessedEvent::from_order(order);

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    "Failed to serialize completion event for order {}: {}",
                    order.id,
                    e
                );
                metrics::record_completion_publish_failure();
                return;
            }
        };

        let record = Record::new(Some(order.id.to_string()), payload, Headers::new());

        match self.producer.send(&self.topic, record).await {
            Ok(()) => {
                tracing::info!(
                    "Published completion event to {} for order {}",
                    self.topic,
                    order.id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to publish completion event to {} for order {}: {}",
                    self.topic,
                    order.id,
                    e
                );
                metrics::record_completion_publish_failure();
            }
        }
    }
}
