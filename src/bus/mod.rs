//! Message bus seam: record model, header constants, and the producer and
//! partition-consumer traits the pipeline workers are written against.
//!
//! Delivery is at-least-once: a record stays at the head of its partition
//! until the consumer commits it, so anything uncommitted is redelivered.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::{partition_for_key, InMemoryBroker, InMemoryPartitionConsumer, InMemoryProducer};

/// Mandatory header on the received topic.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
/// Diagnostic headers attached to dead-lettered records.
pub const EXCEPTION_CLASS_HEADER: &str = "x-exception-class";
pub const EXCEPTION_MESSAGE_HEADER: &str = "x-exception-message";

/// Record headers. Values are raw bytes; lookups return the last value
/// written for a name.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, Vec<u8>)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.0.push((name.to_string(), value.into()));
    }

    pub fn with(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }
}

/// A bus record: optional partitioning key, raw payload, headers.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl Record {
    pub fn new(key: Option<String>, payload: Vec<u8>, headers: Headers) -> Self {
        Self {
            key,
            payload,
            headers,
        }
    }
}

/// A record delivered from a specific partition, carrying the offset needed
/// to commit it.
#[derive(Debug, Clone)]
pub struct DeliveredRecord {
    pub record: Record,
    pub partition: usize,
    pub offset: u64,
}

#[derive(Error, Debug)]
#[error("bus failure: {0}")]
pub struct BusError(pub String);

#[async_trait]
pub trait BusProducer: Send + Sync {
    async fn send(&self, topic: &str, record: Record) -> Result<(), BusError>;
}

/// Single-partition consumer bound to a consumer group.
///
/// `next` yields the record at the group's committed offset, waiting until
/// one exists; it returns `None` once the broker is gone. Calling `next`
/// again without committing redelivers the same record.
#[async_trait]
pub trait PartitionConsumer: Send {
    async fn next(&mut self) -> Result<Option<DeliveredRecord>, BusError>;

    async fn commit(&mut self, delivered: &DeliveredRecord) -> Result<(), BusError>;
}
