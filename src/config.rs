use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub orders_received_topic: String,
    pub orders_dlt_topic: String,
    pub orders_processed_topic: String,
    /// Consumer group for the received topic; the DLT consumer uses `<id>-dlt`.
    pub consumer_group_id: String,
    pub retry: RetryConfig,
    pub idempotency: IdempotencyConfig,
    pub topic_partitions: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Total delivery attempts, including the first one.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdempotencyConfig {
    pub processing_ttl_secs: u64,
    pub processed_ttl_secs: u64,
}

impl IdempotencyConfig {
    pub fn processing_ttl(&self) -> Duration {
        Duration::from_secs(self.processing_ttl_secs)
    }

    pub fn processed_ttl(&self) -> Duration {
        Duration::from_secs(self.processed_ttl_secs)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            orders_received_topic: env::var("ORDERS_RECEIVED_TOPIC")
                .unwrap_or_else(|_| "orders.received".to_string()),
            orders_dlt_topic: env::var("ORDERS_DLT_TOPIC")
                .unwrap_or_else(|_| "orders.dlt".to_string()),
            orders_processed_topic: env::var("ORDERS_PROCESSED_TOPIC")
                .unwrap_or_else(|_| "orders.processed".to_string()),
            consumer_group_id: env::var("CONSUMER_GROUP_ID")
                .unwrap_or_else(|_| "orderflow".to_string()),
            retry: RetryConfig {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
                initial_interval_ms: env::var("RETRY_INITIAL_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
                multiplier: env::var("RETRY_MULTIPLIER")
                    .unwrap_or_else(|_| "2.0".to_string())
                    .parse()?,
                max_interval_ms: env::var("RETRY_MAX_INTERVAL_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()?,
            },
            idempotency: IdempotencyConfig {
                processing_ttl_secs: env::var("IDEMPOTENCY_PROCESSING_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
                processed_ttl_secs: env::var("IDEMPOTENCY_PROCESSED_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()?,
            },
            topic_partitions: env::var("TOPIC_PARTITIONS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
        })
    }

    pub fn dlt_group_id(&self) -> String {
        format!("{}-dlt", self.consumer_group_id)
    }
}
