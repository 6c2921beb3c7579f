//! Wire-level DTOs: the inbound order request, the outbound completion
//! event, and the read API response shapes.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Order, OrderItem, OrderStatus};
use crate::error::ValidationError;

/// Inbound order request carried on the received topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderRequest {
    /// Checks the input constraints of the processing contract: at least one
    /// item, non-blank product ids, quantity >= 1, price >= 0.01.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::new("items", "must contain at least one item"));
        }

        let min_price = BigDecimal::new(1.into(), 2);
        for item in &self.items {
            if item.product_id.trim().is_empty() {
                return Err(ValidationError::new("productId", "must not be blank"));
            }
            if item.quantity < 1 {
                return Err(ValidationError::new("quantity", "must be at least 1"));
            }
            if item.price < min_price {
                return Err(ValidationError::new("price", "must be at least 0.01"));
            }
        }

        Ok(())
    }

    /// Maps the request to a fresh domain order in `Received` state.
    pub fn into_order(self, idempotency_key: &str) -> Order {
        let items = self
            .items
            .into_iter()
            .map(|item| OrderItem::new(item.product_id, item.quantity, item.price))
            .collect();

        Order::new(idempotency_key.to_string(), items)
    }
}

/// Completion event published to the processed topic after the commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProcessedEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: BigDecimal,
    pub processed_at: NaiveDateTime,
    pub items: Vec<OrderItemEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemEvent {
    pub product_id: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderProcessedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            total: order.total.clone(),
            processed_at: order.updated_at.naive_utc(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemEvent {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price.clone(),
                })
                .collect(),
        }
    }
}

/// Read API response for a single order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            total: order.total.clone(),
            failure_reason: order.failure_reason.clone(),
            created_at: order.created_at.naive_utc(),
            updated_at: order.updated_at.naive_utc(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request(items: Vec<OrderItemRequest>) -> OrderRequest {
        OrderRequest { items }
    }

    fn item(product_id: &str, quantity: i32, price: &str) -> OrderItemRequest {
        OrderItemRequest {
            product_id: product_id.to_string(),
            quantity,
            price: BigDecimal::from_str(price).unwrap(),
        }
    }

    #[test]
    fn valid_request_passes() {
        let req = request(vec![item("P1", 2, "10.00"), item("P2", 1, "5.25")]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_items_are_rejected() {
        let req = request(vec![]);
        let err = req.validate().unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn blank_product_id_is_rejected() {
        let req = request(vec![item("   ", 1, "1.00")]);
        assert_eq!(req.validate().unwrap_err().field, "productId");
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let req = request(vec![item("P1", 0, "1.00")]);
        assert_eq!(req.validate().unwrap_err().field, "quantity");
    }

    #[test]
    fn sub_cent_price_is_rejected() {
        let req = request(vec![item("P1", 1, "0.001")]);
        assert_eq!(req.validate().unwrap_err().field, "price");
        let req = request(vec![item("P1", 1, "0.01")]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"items":[{"productId":"P1","quantity":2,"price":"10.00"}]}"#,
        )
        .unwrap();
        assert_eq!(req.items.len(), 1);
        assert_eq!(req.items[0].product_id, "P1");
    }

    #[test]
    fn into_order_keeps_item_order() {
        let order = request(vec![item("P1", 2, "10.00"), item("P2", 1, "5.25")])
            .into_order("key-1");
        assert_eq!(order.idempotency_key, "key-1");
        assert_eq!(order.items[0].product_id, "P1");
        assert_eq!(order.items[1].product_id, "P2");
    }

    #[test]
    fn processed_event_serializes_camel_case() {
        let mut order = request(vec![item("P1", 2, "10.00")]).into_order("key-1");
        order.status = OrderStatus::Processed;
        order.total = BigDecimal::from_str("20.00").unwrap();

        let event = OrderProcessedEvent::from_order(&order);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "PROCESSED");
        assert!(json.get("orderId").is_some());
        assert!(json.get("processedAt").is_some());
        assert_eq!(json["items"][0]["productId"], "P1");
    }
}
