//! Postgres implementation of OrderRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Order, OrderItem, OrderStatus};
use crate::ports::{OrderRepository, RepositoryError, RepositoryResult};

/// Postgres-backed order repository.
///
/// `save_new` writes the order row and all item rows inside one transaction,
/// so a returned `Ok` means the aggregate is durably committed.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: Uuid) -> RepositoryResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, quantity, price, position
             FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(connection_error)?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn save_new(&self, order: &Order) -> RepositoryResult<Order> {
        let mut tx = self.pool.begin().await.map_err(connection_error)?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (id, idempotency_key, status, total, failure_reason, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, idempotency_key, status, total, failure_reason, version,
                created_at, updated_at
            "#,
        )
        .bind(order.id)
        .bind(&order.idempotency_key)
        .bind(order.status.as_str())
        .bind(&order.total)
        .bind(&order.failure_reason)
        .bind(order.version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error(e, &order.idempotency_key))?;

        let mut items = Vec::with_capacity(order.items.len());
        for (position, item) in order.items.iter().enumerate() {
            let item_row = sqlx::query_as::<_, OrderItemRow>(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, order_id, product_id, quantity, price, position
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(&item.price)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(connection_error)?;

            items.push(item_row.into_domain());
        }

        tx.commit().await.map_err(connection_error)?;

        row.into_domain(items)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, idempotency_key, status, total, failure_reason, version,
                created_at, updated_at
             FROM orders WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection_error)?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_domain(items)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, idempotency_key, status, total, failure_reason, version,
                created_at, updated_at
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection_error)?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_domain(items)?))
            }
            None => Ok(None),
        }
    }

    async fn mark_failed(&self, id: Uuid, version: i32, reason: &str) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders
            SET status = 'FAILED', failure_reason = $3, version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, idempotency_key, status, total, failure_reason, version,
                created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(version)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection_error)?;

        let row = row.ok_or_else(|| {
            RepositoryError::Conflict(format!("order {id} changed concurrently (expected version {version})"))
        })?;

        let items = self.load_items(id).await?;
        row.into_domain(items)
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, idempotency_key, status, total, failure_reason, version,
                created_at, updated_at
             FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(connection_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_items(row.id).await?;
            orders.push(row.into_domain(items)?);
        }

        Ok(orders)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(connection_error)
    }
}

fn connection_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Connection(e.to_string())
}

fn insert_error(e: sqlx::Error, key: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::DuplicateKey(key.to_string())
        }
        _ => connection_error(e),
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    idempotency_key: String,
    status: String,
    total: bigdecimal::BigDecimal,
    failure_reason: Option<String>,
    version: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl OrderRow {
    fn into_domain(self, items: Vec<OrderItem>) -> RepositoryResult<Order> {
        let status = OrderStatus::from_str(&self.status)
            .map_err(|e| RepositoryError::Connection(format!("corrupt order row {}: {e}", self.id)))?;
        Ok(Order {
            id: self.id,
            idempotency_key: self.idempotency_key,
            status,
            total: self.total,
            items,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    #[allow(dead_code)]
    order_id: Uuid,
    product_id: String,
    quantity: i32,
    price: bigdecimal::BigDecimal,
    #[allow(dead_code)]
    position: i32,
}

impl OrderItemRow {
    fn into_domain(self) -> OrderItem {
        OrderItem {
            id: self.id,
            product_id: self.product_id,
            quantity: self.quantity,
            price: self.price,
        }
    }
}
