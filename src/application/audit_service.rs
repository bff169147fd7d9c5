use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::{
    domain::{
        audit::{AuditRecord, AuditRepository, NewAuditRecord, SaveOutcome},
        events::{User, UserEvent},
    },
    shared::errors::DomainError,
};

/// Stored in place of the user snapshot when it cannot be encoded.
pub const SERIALIZATION_FAILURE_PLACEHOLDER: &str =
    r#"{"error":"Failed to serialize event details"}"#;

/// Encodes the `User` snapshot kept in `AuditRecord::event_details`.
///
/// Built once at startup and shared behind an `Arc`; implementations must not
/// hold per-call mutable state.
pub trait SnapshotEncoder: Send + Sync {
    fn encode(&self, user: &User) -> Result<String, serde_json::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotEncoder;

impl SnapshotEncoder for JsonSnapshotEncoder {
    fn encode(&self, user: &User) -> Result<String, serde_json::Error> {
        serde_json::to_string(user)
    }
}

pub fn decode_snapshot(details: &str) -> Result<User, serde_json::Error> {
    serde_json::from_str(details)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Recorded(AuditRecord),
    /// The delivery key was already stored; nothing new was written.
    Duplicate(AuditRecord),
    /// Missing user data or user id. Logged and skipped.
    Rejected,
    Failed(String),
}

impl PersistOutcome {
    pub fn record(&self) -> Option<&AuditRecord> {
        match self {
            PersistOutcome::Recorded(record) | PersistOutcome::Duplicate(record) => Some(record),
            _ => None,
        }
    }
}

pub struct AuditService {
    repo: Arc<dyn AuditRepository>,
    encoder: Arc<dyn SnapshotEncoder>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self::with_encoder(repo, Arc::new(JsonSnapshotEncoder))
    }

    pub fn with_encoder(repo: Arc<dyn AuditRepository>, encoder: Arc<dyn SnapshotEncoder>) -> Self {
        Self { repo, encoder }
    }

    pub async fn persist_default(&self, event: &UserEvent) -> PersistOutcome {
        self.persist(event, None).await
    }

    pub async fn persist(&self, event: &UserEvent, source_application: Option<&str>) -> PersistOutcome {
        self.persist_delivery(event, source_application, None).await
    }

    pub async fn persist_delivery(
        &self,
        event: &UserEvent,
        source_application: Option<&str>,
        delivery_key: Option<String>,
    ) -> PersistOutcome {
        let (Some(user), Ok(user_id)) = (event.user_data.as_ref(), event.validate()) else {
            warn!(
                event_type = event.event_type_or_unknown(),
                "Attempted to persist an invalid user event; user data or user id is missing"
            );
            return PersistOutcome::Rejected;
        };

        let event_details = match self.encoder.encode(user) {
            Ok(json) => json,
            Err(err) => {
                error!(
                    user_id,
                    event_type = %event.event_type,
                    "Failed to serialize user snapshot for audit: {err}"
                );
                SERIALIZATION_FAILURE_PLACEHOLDER.to_string()
            }
        };

        let record = NewAuditRecord {
            event_type: event.event_type.clone(),
            user_id: user_id.to_string(),
            event_details,
            source_application: source_application.map(str::to_string),
            delivery_key,
        };

        match self.repo.save(record).await {
            Ok(SaveOutcome::Inserted(stored)) => {
                info!(
                    audit_id = stored.id,
                    user_id = %stored.user_id,
                    event_type = %stored.event_type,
                    "Persisted audit record"
                );
                PersistOutcome::Recorded(stored)
            }
            Ok(SaveOutcome::AlreadyStored(stored)) => {
                info!(
                    audit_id = stored.id,
                    user_id = %stored.user_id,
                    delivery_key = stored.delivery_key.as_deref().unwrap_or_default(),
                    "Audit record for this delivery already exists; skipping"
                );
                PersistOutcome::Duplicate(stored)
            }
            Err(err) => {
                error!(
                    user_id,
                    event_type = %event.event_type,
                    "Failed to save audit record: {err}"
                );
                PersistOutcome::Failed(err.to_string())
            }
        }
    }

    pub async fn records_by_event_type(
        &self,
        event_type: &str,
    ) -> Result<Vec<AuditRecord>, DomainError> {
        self.repo.find_by_event_type(event_type).await
    }

    pub async fn records_by_user_id(&self, user_id: &str) -> Result<Vec<AuditRecord>, DomainError> {
        self.repo.find_by_user_id(user_id).await
    }

    pub async fn records_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, DomainError> {
        self.repo.find_by_event_timestamp_between(start, end).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde::ser::Error as _;

    use super::*;
    use crate::{domain::events::fixtures::ann, infrastructure::memory::InMemoryAuditRepository};

    struct BrokenEncoder;

    impl SnapshotEncoder for BrokenEncoder {
        fn encode(&self, _user: &User) -> Result<String, serde_json::Error> {
            Err(serde_json::Error::custom("unsupported value"))
        }
    }

    struct OfflineRepository;

    #[async_trait]
    impl AuditRepository for OfflineRepository {
        async fn save(&self, _record: NewAuditRecord) -> Result<SaveOutcome, DomainError> {
            Err(DomainError::Unexpected("connection refused".into()))
        }
        async fn find_by_event_type(&self, _: &str) -> Result<Vec<AuditRecord>, DomainError> {
            Ok(vec![])
        }
        async fn find_by_user_id(&self, _: &str) -> Result<Vec<AuditRecord>, DomainError> {
            Ok(vec![])
        }
        async fn find_by_event_timestamp_between(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<AuditRecord>, DomainError> {
            Ok(vec![])
        }
        async fn find_by_delivery_key(&self, _: &str) -> Result<Option<AuditRecord>, DomainError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn persists_one_record_per_valid_event() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::new(repo.clone());
        let before = Utc::now();

        let outcome = service.persist(&UserEvent::created(ann()), Some("KafkaConsumer")).await;

        let record = assert_matches!(outcome, PersistOutcome::Recorded(record) => record);
        assert_eq!(record.user_id, "42");
        assert_eq!(record.event_type, "CREATED");
        assert_eq!(record.source_application.as_deref(), Some("KafkaConsumer"));
        assert!(record.event_timestamp >= before);
        assert!(record.event_details.contains(r#""id":42"#));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn default_overload_leaves_source_empty() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::new(repo.clone());

        let outcome = service.persist_default(&UserEvent::deleted(User::with_id(9))).await;

        assert_eq!(outcome.record().unwrap().source_application, None);
    }

    #[tokio::test]
    async fn invalid_events_are_skipped_without_writing() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::new(repo.clone());

        let no_user = UserEvent {
            event_type: "CREATED".into(),
            user_data: None,
        };
        let no_id = UserEvent::updated(User::default());

        assert_eq!(service.persist_default(&no_user).await, PersistOutcome::Rejected);
        assert_eq!(service.persist_default(&no_id).await, PersistOutcome::Rejected);
        assert_eq!(repo.len(), 0);
    }

    #[tokio::test]
    async fn encoder_failure_stores_placeholder() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::with_encoder(repo.clone(), Arc::new(BrokenEncoder));

        let outcome = service.persist(&UserEvent::created(ann()), None).await;

        let record = assert_matches!(outcome, PersistOutcome::Recorded(record) => record);
        assert_eq!(record.event_details, SERIALIZATION_FAILURE_PLACEHOLDER);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_not_raised() {
        let service = AuditService::new(Arc::new(OfflineRepository));

        let outcome = service.persist(&UserEvent::created(ann()), None).await;

        assert_matches!(outcome, PersistOutcome::Failed(reason) if reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn same_delivery_key_is_stored_once() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::new(repo.clone());
        let event = UserEvent::created(ann());

        let first = service
            .persist_delivery(&event, Some("KafkaConsumer"), Some("user-topic/0/7".into()))
            .await;
        let second = service
            .persist_delivery(&event, Some("KafkaConsumer"), Some("user-topic/0/7".into()))
            .await;

        let first = assert_matches!(first, PersistOutcome::Recorded(record) => record);
        let second = assert_matches!(second, PersistOutcome::Duplicate(record) => record);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn direct_calls_are_not_deduplicated() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let service = AuditService::new(repo.clone());
        let event = UserEvent::updated(ann());

        service.persist(&event, Some("DirectCall")).await;
        service.persist(&event, Some("DirectCall")).await;

        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn snapshot_round_trip() {
        let user = ann();
        let json = JsonSnapshotEncoder.encode(&user).unwrap();
        assert_eq!(decode_snapshot(&json).unwrap(), user);
    }
}
