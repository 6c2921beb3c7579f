//! In-memory implementations of the storage ports.
//!
//! Used by the integration tests; they mirror the behavioral contracts of
//! the real adapters (unique idempotency key, optimistic version, TTLs).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::{Order, OrderStatus};
use crate::ports::{KeyValueStore, KvError, OrderRepository, RepositoryError, RepositoryResult};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored order, oldest first.
    pub fn all(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save_new(&self, order: &Order) -> RepositoryResult<Order> {
        let mut orders = self.orders.lock().unwrap();

        if orders.iter().any(|o| o.idempotency_key == order.idempotency_key) {
            return Err(RepositoryError::DuplicateKey(order.idempotency_key.clone()));
        }

        let mut stored = order.clone();
        let now = Utc::now();
        stored.created_at = now;
        stored.updated_at = now;
        orders.push(stored.clone());

        Ok(stored)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> RepositoryResult<Option<Order>> {
        let orders = self.orders.lock().unwrap();
        Ok(orders.iter().find(|o| o.idempotency_key == key).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        let orders = self.orders.lock().unwrap();
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn mark_failed(&self, id: Uuid, version: i32, reason: &str) -> RepositoryResult<Order> {
        let mut orders = self.orders.lock().unwrap();

        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {id}")))?;

        if order.version != version {
            return Err(RepositoryError::Conflict(format!(
                "order {id} changed concurrently (expected version {version})"
            )));
        }

        order.status = OrderStatus::Failed;
        order.failure_reason = Some(reason.to_string());
        order.version += 1;
        order.updated_at = Utc::now();

        Ok(order.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>> {
        let orders = self.orders.lock().unwrap();
        let mut sorted: Vec<Order> = orders.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sorted
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.orders.lock().unwrap().len() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entries: &mut HashMap<String, (String, Option<Instant>)>, key: &str) -> Option<String> {
        match entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().unwrap();

        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }

        entries.insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderItem;
    use bigdecimal::BigDecimal;

    fn sample_order(key: &str) -> Order {
        Order::new(
            key.to_string(),
            vec![OrderItem::new("P1".to_string(), 1, BigDecimal::from(10))],
        )
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        repo.save_new(&sample_order("k1")).await.unwrap();

        let err = repo.save_new(&sample_order("k1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn mark_failed_enforces_version() {
        let repo = InMemoryOrderRepository::new();
        let saved = repo.save_new(&sample_order("k1")).await.unwrap();

        let err = repo.mark_failed(saved.id, saved.version + 1, "boom").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let updated = repo.mark_failed(saved.id, saved.version, "boom").await.unwrap();
        assert_eq!(updated.status, OrderStatus::Failed);
        assert_eq!(updated.version, saved.version + 1);
        assert_eq!(updated.failure_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn kv_ttl_expires_entries() {
        let store = InMemoryKeyValueStore::new();
        store
            .set("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);

        // Expired keys can be claimed again.
        assert!(store
            .set_if_absent("k", "v2", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn set_if_absent_has_a_single_winner() {
        let store = std::sync::Arc::new(InMemoryKeyValueStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("contended", "PROCESSING", Duration::from_secs(10))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
