//! Process-local adapters with the same contracts as the Kafka and Postgres ones.

use std::{
    collections::{BTreeMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    application::{
        audit_consumer::InboundMessage,
        event_publisher::{DeliveryReceipt, EventChannel},
    },
    domain::audit::{AuditRecord, AuditRepository, NewAuditRecord, SaveOutcome},
    shared::errors::{DomainError, InfrastructureError},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    rows: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditRepository {
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        lock(&self.rows).clone()
    }

    fn select(&self, filter: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        lock(&self.rows).iter().filter(|row| filter(row)).cloned().collect()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn save(&self, record: NewAuditRecord) -> Result<SaveOutcome, DomainError> {
        let mut rows = lock(&self.rows);

        if let Some(key) = record.delivery_key.as_deref() {
            if let Some(existing) = rows.iter().find(|row| row.delivery_key.as_deref() == Some(key)) {
                return Ok(SaveOutcome::AlreadyStored(existing.clone()));
            }
        }

        let stored = AuditRecord {
            id: rows.len() as i64 + 1,
            event_timestamp: Utc::now(),
            event_type: record.event_type,
            user_id: record.user_id,
            event_details: record.event_details,
            source_application: record.source_application,
            delivery_key: record.delivery_key,
        };
        rows.push(stored.clone());

        Ok(SaveOutcome::Inserted(stored))
    }

    async fn find_by_event_type(&self, event_type: &str) -> Result<Vec<AuditRecord>, DomainError> {
        Ok(self.select(|row| row.event_type == event_type))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<AuditRecord>, DomainError> {
        Ok(self.select(|row| row.user_id == user_id))
    }

    async fn find_by_event_timestamp_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, DomainError> {
        Ok(self.select(|row| row.event_timestamp >= start && row.event_timestamp <= end))
    }

    async fn find_by_delivery_key(&self, key: &str) -> Result<Option<AuditRecord>, DomainError> {
        Ok(self
            .select(|row| row.delivery_key.as_deref() == Some(key))
            .into_iter()
            .next())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl StoredMessage {
    pub fn as_inbound(&self) -> InboundMessage<'_> {
        InboundMessage {
            topic: &self.topic,
            partition: self.partition,
            offset: self.offset,
            payload: self.payload.as_deref(),
        }
    }
}

/// Keyed, partitioned log. Same key, same partition; offsets grow per partition.
pub struct InMemoryChannel {
    partitions: i32,
    log: Mutex<BTreeMap<(String, i32), Vec<StoredMessage>>>,
}

impl InMemoryChannel {
    pub fn new(partitions: i32) -> Self {
        Self {
            partitions: partitions.max(1),
            log: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as i32
    }

    /// Appends a raw record, bypassing the publisher. Useful for tombstones.
    pub fn append(&self, topic: &str, key: Option<&str>, payload: Option<Vec<u8>>) -> StoredMessage {
        let partition = key.map(|key| self.partition_for(key)).unwrap_or(0);
        let mut log = lock(&self.log);
        let entries = log.entry((topic.to_string(), partition)).or_default();
        let message = StoredMessage {
            topic: topic.to_string(),
            partition,
            offset: entries.len() as i64,
            key: key.map(str::to_string),
            payload,
        };
        entries.push(message.clone());
        message
    }

    /// All messages on `topic`, partition by partition, each in offset order.
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        lock(&self.log)
            .iter()
            .filter(|((name, _), _)| name == topic)
            .flat_map(|(_, entries)| entries.iter().cloned())
            .collect()
    }

    pub fn total_messages(&self) -> usize {
        lock(&self.log).values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventChannel for InMemoryChannel {
    async fn deliver(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, InfrastructureError> {
        let message = self.append(topic, Some(key), Some(payload.to_vec()));
        Ok(DeliveryReceipt {
            topic: message.topic,
            key: key.to_string(),
            partition: message.partition,
            offset: message.offset,
        })
    }
}
