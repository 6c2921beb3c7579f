//! Order domain entities.
//! Framework-agnostic representation of an order and its line items.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of an order.
///
/// `Received` and `Processing` only exist in memory on the happy path; the
/// first persisted state is `Processed`. `Failed` and `Cancelled` are
/// terminal and reachable through the dead-letter reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Received,
    Processing,
    Processed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses admit no further change from the ingest or DLT paths.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Forward-only transition table; there are no backward transitions.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Received, OrderStatus::Processing)
                | (OrderStatus::Received, OrderStatus::Failed)
                | (OrderStatus::Processing, OrderStatus::Processed)
                | (OrderStatus::Processing, OrderStatus::Failed)
                | (OrderStatus::Failed, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(OrderStatus::Received),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "FAILED" => Ok(OrderStatus::Failed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Domain entity representing an order aggregate.
///
/// The order exclusively owns its items; the foreign key exists only at the
/// persistence boundary.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub idempotency_key: String,
    pub status: OrderStatus,
    pub total: BigDecimal,
    pub items: Vec<OrderItem>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Order {
    pub fn new(idempotency_key: String, items: Vec<OrderItem>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            status: OrderStatus::Received,
            total: BigDecimal::from(0),
            items,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A single line item of an order.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderItem {
    pub fn new(product_id: String, quantity: i32, price: BigDecimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            price,
        }
    }
}
