pub mod memory;
pub mod postgres_order_repository;
pub mod redis_kv_store;

pub use memory::{InMemoryKeyValueStore, InMemoryOrderRepository};
pub use postgres_order_repository::PostgresOrderRepository;
pub use redis_kv_store::RedisKeyValueStore;
