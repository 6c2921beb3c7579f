//! In-process partitioned broker implementing the bus traits.
//!
//! Reference implementation of the broker seam: partitioned topics, key-hash
//! partition assignment, per-group committed offsets, at-least-once
//! redelivery. Production deployments implement `BusProducer` and
//! `PartitionConsumer` against their broker instead.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{BusError, BusProducer, DeliveredRecord, PartitionConsumer, Record};

struct Partition {
    log: Vec<Record>,
    committed: HashMap<String, u64>,
    len_tx: watch::Sender<u64>,
}

impl Partition {
    fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            log: Vec::new(),
            committed: HashMap::new(),
            len_tx,
        }
    }
}

struct Topic {
    partitions: Vec<Partition>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
}

/// Partitioned in-memory broker shared by producers and consumers.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the topic if it does not exist yet.
    pub fn create_topic(&self, name: &str, partitions: usize) {
        let mut state = self.state.lock().unwrap();
        state.topics.entry(name.to_string()).or_insert_with(|| Topic {
            partitions: (0..partitions.max(1)).map(|_| Partition::new()).collect(),
        });
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            state: self.state.clone(),
        }
    }

    /// One consumer per partition of the topic, bound to the given group.
    pub fn subscribe(&self, group_id: &str, topic: &str) -> Result<Vec<InMemoryPartitionConsumer>, BusError> {
        let state = self.state.lock().unwrap();
        let topic_state = state
            .topics
            .get(topic)
            .ok_or_else(|| BusError(format!("unknown topic: {topic}")))?;

        Ok(topic_state
            .partitions
            .iter()
            .enumerate()
            .map(|(partition, p)| InMemoryPartitionConsumer {
                state: self.state.clone(),
                topic: topic.to_string(),
                group_id: group_id.to_string(),
                partition,
                len_rx: p.len_tx.subscribe(),
            })
            .collect())
    }

    /// Every record currently on the topic, partition by partition.
    /// Test and inspection helper.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|t| {
                t.partitions
                    .iter()
                    .flat_map(|p| p.log.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Partition assignment for a record key: stable hash modulo the partition
/// count. Records without a key land on partition 0.
pub fn partition_for_key(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

#[derive(Clone)]
pub struct InMemoryProducer {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BusProducer for InMemoryProducer {
    async fn send(&self, topic: &str, record: Record) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        let topic_state = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| BusError(format!("unknown topic: {topic}")))?;

        let partition = match &record.key {
            Some(key) => partition_for_key(key, topic_state.partitions.len()),
            None => 0,
        };

        let partition_state = &mut topic_state.partitions[partition];
        partition_state.log.push(record);
        let _ = partition_state.len_tx.send(partition_state.log.len() as u64);

        Ok(())
    }
}

pub struct InMemoryPartitionConsumer {
    state: Arc<Mutex<BrokerState>>,
    topic: String,
    group_id: String,
    partition: usize,
    len_rx: watch::Receiver<u64>,
}

#[async_trait]
impl PartitionConsumer for InMemoryPartitionConsumer {
    async fn next(&mut self) -> Result<Option<DeliveredRecord>, BusError> {
        loop {
            {
                let state = self.state.lock().unwrap();
                let topic_state = state
                    .topics
                    .get(&self.topic)
                    .ok_or_else(|| BusError(format!("unknown topic: {}", self.topic)))?;
                let partition_state = &topic_state.partitions[self.partition];
                let offset = partition_state
                    .committed
                    .get(&self.group_id)
                    .copied()
                    .unwrap_or(0);

                if let Some(record) = partition_state.log.get(offset as usize) {
                    return Ok(Some(DeliveredRecord {
                        record: record.clone(),
                        partition: self.partition,
                        offset,
                    }));
                }
            }

            if self.len_rx.changed().await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self, delivered: &DeliveredRecord) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        let topic_state = state
            .topics
            .get_mut(&self.topic)
            .ok_or_else(|| BusError(format!("unknown topic: {}", self.topic)))?;
        let partition_state = &mut topic_state.partitions[self.partition];

        partition_state
            .committed
            .insert(self.group_id.clone(), delivered.offset + 1);

        Ok(())
    }
}
