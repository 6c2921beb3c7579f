//! Ports: trait boundaries between the pipeline and its infrastructure.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Order;

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Unique-index violation on the idempotency key.
    #[error("duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic version check failed; the row changed underneath us.
    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("connection failure: {0}")]
    Connection(String),
}

impl RepositoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Connection(_))
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable storage for order aggregates.
///
/// `save_new` persists the order row and all item rows in a single database
/// transaction; the caller may treat a returned `Ok` as a committed write.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new aggregate. Fails with `DuplicateKey` when the
    /// idempotency key is already present.
    async fn save_new(&self, order: &Order) -> RepositoryResult<Order>;

    async fn find_by_idempotency_key(&self, key: &str) -> RepositoryResult<Option<Order>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Order>>;

    /// Marks an existing order FAILED with the given reason, guarded by the
    /// optimistic version.
    async fn mark_failed(&self, id: Uuid, version: i32, reason: &str) -> RepositoryResult<Order>;

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>>;

    async fn count(&self) -> RepositoryResult<i64>;
}

#[derive(Error, Debug)]
#[error("key-value store failure: {0}")]
pub struct KvError(pub String);

/// Shared key-value store used by the idempotency gate.
///
/// `set_if_absent` must be atomic across competing processes: for a given
/// key, exactly one concurrent caller observes `true`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}
