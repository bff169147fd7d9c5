use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shared::errors::DomainError;

/// A stored audit row. The store assigns `id` and `event_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub event_timestamp: DateTime<Utc>,
    pub event_type: String,
    pub user_id: String,
    pub event_details: String,
    pub source_application: Option<String>,
    #[serde(skip)]
    pub delivery_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
    pub event_type: String,
    pub user_id: String,
    pub event_details: String,
    pub source_application: Option<String>,
    /// Channel position (`topic/partition/offset`) the event was read from, if any.
    /// Unique in the store, so a redelivered message maps onto the existing row.
    pub delivery_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted(AuditRecord),
    AlreadyStored(AuditRecord),
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Inserts the record in a single transaction. A record whose `delivery_key`
    /// is already stored is not inserted again.
    async fn save(&self, record: NewAuditRecord) -> Result<SaveOutcome, DomainError>;
    async fn find_by_event_type(&self, event_type: &str) -> Result<Vec<AuditRecord>, DomainError>;
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<AuditRecord>, DomainError>;
    async fn find_by_event_timestamp_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, DomainError>;
    async fn find_by_delivery_key(&self, key: &str) -> Result<Option<AuditRecord>, DomainError>;
}
