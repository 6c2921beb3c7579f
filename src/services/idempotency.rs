//! Idempotency gate over the shared key-value store.
//!
//! The gate is a pure compare-and-set decision point: for a given key,
//! exactly one worker across all consumer instances wins the claim and may
//! proceed with processing.

use std::sync::Arc;
use std::time::Duration;

use crate::config::IdempotencyConfig;
use crate::ports::{KeyValueStore, KvError};

pub const IDEMPOTENCY_KEY_PREFIX: &str = "idempotency:order:";

const PROCESSING_STATUS: &str = "PROCESSING";
const PROCESSED_STATUS: &str = "PROCESSED";

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker owns the key and must process the record.
    Claimed,
    /// Another worker holds the key; its retries are responsible.
    AlreadyProcessing,
    /// The order was already processed; the record is a duplicate.
    AlreadyProcessed,
    /// The stored value is unrecognized (or vanished mid-read). Skipped
    /// without retry to avoid tight loops on corrupted state.
    Unknown(Option<String>),
}

pub struct IdempotencyGate {
    store: Arc<dyn KeyValueStore>,
    processing_ttl: Duration,
    processed_ttl: Duration,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &IdempotencyConfig) -> Self {
        Self {
            store,
            processing_ttl: config.processing_ttl(),
            processed_ttl: config.processed_ttl(),
        }
    }

    fn storage_key(key: &str) -> String {
        format!("{IDEMPOTENCY_KEY_PREFIX}{key}")
    }

    /// Atomic set-if-absent of `PROCESSING`. On losing the race, the current
    /// value is read and mapped to the matching outcome.
    pub async fn try_claim(&self, key: &str) -> Result<ClaimOutcome, KvError> {
        let storage_key = Self::storage_key(key);

        let acquired = self
            .store
            .set_if_absent(&storage_key, PROCESSING_STATUS, self.processing_ttl)
            .await?;

        if acquired {
            return Ok(ClaimOutcome::Claimed);
        }

        match self.store.get(&storage_key).await? {
            Some(value) if value == PROCESSED_STATUS => Ok(ClaimOutcome::AlreadyProcessed),
            Some(value) if value == PROCESSING_STATUS => Ok(ClaimOutcome::AlreadyProcessing),
            other => Ok(ClaimOutcome::Unknown(other)),
        }
    }

    /// Unconditional upgrade to `PROCESSED`. Called only after the database
    /// transaction committed.
    pub async fn mark_completed(&self, key: &str) -> Result<(), KvError> {
        self.store
            .set(&Self::storage_key(key), PROCESSED_STATUS, self.processed_ttl)
            .await
    }

    /// Drops the key. Not used by the ingest path; the unique index on the
    /// orders table covers claim expiry instead.
    pub async fn release(&self, key: &str) -> Result<(), KvError> {
        self.store.delete(&Self::storage_key(key)).await
    }

    /// Raw stored value, if any.
    pub async fn current_status(&self, key: &str) -> Result<Option<String>, KvError> {
        self.store.get(&Self::storage_key(key)).await
    }
}
