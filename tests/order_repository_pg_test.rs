//! Postgres adapter tests. These require a running database and are skipped
//! when DATABASE_URL is not set.

use bigdecimal::BigDecimal;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use orderflow::adapters::PostgresOrderRepository;
use orderflow::domain::{Order, OrderItem, OrderStatus};
use orderflow::ports::{OrderRepository, RepositoryError};

async fn connect() -> Option<PgPool> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("Skipping Postgres repository test: DATABASE_URL not set");
            return None;
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");

    let migrator = Migrator::new(Path::join(
        Path::new(env!("CARGO_MANIFEST_DIR")),
        "migrations",
    ))
    .await
    .expect("Failed to load migrations");
    migrator
        .run(&pool)
        .await
        .expect("Failed to run migrations on test DB");

    Some(pool)
}

fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

fn sample_order(key: &str) -> Order {
    let mut order = Order::new(
        key.to_string(),
        vec![
            OrderItem::new(
                "P1".to_string(),
                2,
                BigDecimal::from_str("10.00").unwrap(),
            ),
            OrderItem::new("P2".to_string(), 1, BigDecimal::from_str("5.25").unwrap()),
        ],
    );
    order.status = OrderStatus::Processed;
    order.total = BigDecimal::from_str("25.25").unwrap();
    order
}

#[tokio::test]
async fn save_new_round_trips_the_aggregate() {
    let Some(pool) = connect().await else { return };
    let repo = PostgresOrderRepository::new(pool);

    let key = unique_key("roundtrip");
    let saved = repo.save_new(&sample_order(&key)).await.unwrap();

    assert_eq!(saved.status, OrderStatus::Processed);
    assert_eq!(saved.total, BigDecimal::from_str("25.25").unwrap());
    assert_eq!(saved.version, 0);

    let fetched = repo
        .find_by_idempotency_key(&key)
        .await
        .unwrap()
        .expect("order present");
    assert_eq!(fetched.id, saved.id);
    assert_eq!(fetched.items.len(), 2);
    assert_eq!(fetched.items[0].product_id, "P1");
    assert_eq!(fetched.items[1].product_id, "P2");

    let by_id = repo.find_by_id(saved.id).await.unwrap().unwrap();
    assert_eq!(by_id.idempotency_key, key);
}

#[tokio::test]
async fn duplicate_idempotency_key_is_rejected() {
    let Some(pool) = connect().await else { return };
    let repo = PostgresOrderRepository::new(pool);

    let key = unique_key("duplicate");
    repo.save_new(&sample_order(&key)).await.unwrap();

    let err = repo.save_new(&sample_order(&key)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::DuplicateKey(_)));
}

#[tokio::test]
async fn mark_failed_bumps_version_and_rejects_stale_writers() {
    let Some(pool) = connect().await else { return };
    let repo = PostgresOrderRepository::new(pool);

    let key = unique_key("failed");
    let mut order = sample_order(&key);
    order.status = OrderStatus::Received;
    let saved = repo.save_new(&order).await.unwrap();

    let failed = repo
        .mark_failed(saved.id, saved.version, "processing blew up")
        .await
        .unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.version, saved.version + 1);
    assert_eq!(failed.failure_reason.as_deref(), Some("processing blew up"));

    // A second writer with the original version loses.
    let err = repo
        .mark_failed(saved.id, saved.version, "stale")
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));
}

#[tokio::test]
async fn deleting_an_order_cascades_to_items() {
    let Some(pool) = connect().await else { return };
    let repo = PostgresOrderRepository::new(pool.clone());

    let key = unique_key("cascade");
    let saved = repo.save_new(&sample_order(&key)).await.unwrap();

    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(saved.id)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
            .bind(saved.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);
}
