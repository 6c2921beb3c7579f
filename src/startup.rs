use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "PASS" } else { "FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.orders_received_topic.is_empty()
        || config.orders_dlt_topic.is_empty()
        || config.orders_processed_topic.is_empty()
    {
        anyhow::bail!("topic names must not be empty");
    }
    if config.consumer_group_id.is_empty() {
        anyhow::bail!("CONSUMER_GROUP_ID must not be empty");
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdempotencyConfig, RetryConfig};

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/orderflow".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            orders_received_topic: "orders.received".to_string(),
            orders_dlt_topic: "orders.dlt".to_string(),
            orders_processed_topic: "orders.processed".to_string(),
            consumer_group_id: "orderflow".to_string(),
            retry: RetryConfig {
                max_attempts: 3,
                initial_interval_ms: 1000,
                multiplier: 2.0,
                max_interval_ms: 5000,
            },
            idempotency: IdempotencyConfig {
                processing_ttl_secs: 3600,
                processed_ttl_secs: 86400,
            },
            topic_partitions: 4,
        }
    }

    #[test]
    fn valid_config_passes_env_check() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn empty_database_url_fails_env_check() {
        let mut config = config();
        config.database_url = String::new();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn empty_topic_fails_env_check() {
        let mut config = config();
        config.orders_dlt_topic = String::new();
        assert!(validate_env_vars(&config).is_err());
    }
}
