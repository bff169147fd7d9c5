use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::{
    application::audit_service::{AuditService, PersistOutcome},
    domain::events::{EventType, UserEvent},
};

pub const CONSUMER_SOURCE: &str = "KafkaConsumer";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// When a consumed message counts as processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Advance only after the audit row is durable. Failed writes are redelivered.
    #[default]
    AfterPersist,
    /// Advance regardless of the persistence outcome.
    Auto,
}

#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    pub topic: &'a str,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<&'a [u8]>,
}

impl InboundMessage<'_> {
    pub fn delivery_key(&self) -> String {
        format!("{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Store the offset; the message will not be seen again by this group.
    Ack,
    /// Leave the offset where it is and redeliver the message.
    Retry,
}

pub struct AuditConsumer {
    audit: Arc<AuditService>,
    source: String,
    commit_mode: CommitMode,
    max_attempts: u32,
    // Failed write attempts per delivery key, cleared once the message settles.
    attempts: Mutex<HashMap<String, u32>>,
}

impl AuditConsumer {
    pub fn new(audit: Arc<AuditService>, source: impl Into<String>, commit_mode: CommitMode) -> Self {
        Self {
            audit,
            source: source.into(),
            commit_mode,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Caps how often a failed write is redelivered before the message is given up.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn record_failure(&self, delivery_key: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attempts.entry(delivery_key.to_string()).or_insert(0);
        *count += 1;
        let seen = *count;
        if seen >= self.max_attempts {
            attempts.remove(delivery_key);
        }
        seen
    }

    fn clear_failures(&self, delivery_key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(delivery_key);
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    pub async fn handle(&self, message: InboundMessage<'_>) -> HandleOutcome {
        let Some(payload) = message.payload else {
            warn!(
                topic = message.topic,
                partition = message.partition,
                offset = message.offset,
                "Received empty user event message. Skipping."
            );
            return HandleOutcome::Ack;
        };

        let event = match UserEvent::from_wire(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    topic = message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Received malformed user event message. Skipping: {err}"
                );
                return HandleOutcome::Ack;
            }
        };

        let user_id = event.display_user_id();
        let event_type = event.event_type_or_unknown();
        if !EventType::is_known(event_type) {
            debug!(%user_id, event_type, "Unrecognized event type tag");
        }
        info!(
            %user_id,
            event_type,
            partition = message.partition,
            offset = message.offset,
            "Received user event"
        );

        let delivery_key = message.delivery_key();
        let outcome = self
            .audit
            .persist_delivery(&event, Some(self.source.as_str()), Some(delivery_key.clone()))
            .await;

        match outcome {
            PersistOutcome::Recorded(_) | PersistOutcome::Duplicate(_) => {
                self.clear_failures(&delivery_key);
                info!(%user_id, event_type, "Processed user event");
                HandleOutcome::Ack
            }
            PersistOutcome::Rejected => HandleOutcome::Ack,
            PersistOutcome::Failed(reason) => match self.commit_mode {
                CommitMode::AfterPersist => {
                    let attempt = self.record_failure(&delivery_key);
                    if attempt >= self.max_attempts {
                        error!(
                            topic = message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            %user_id,
                            event_type,
                            attempt,
                            "Audit write failed on the last attempt, message is dropped: {reason}"
                        );
                        HandleOutcome::Ack
                    } else {
                        error!(
                            %user_id,
                            event_type,
                            attempt,
                            max_attempts = self.max_attempts,
                            "Audit write failed, message will be redelivered: {reason}"
                        );
                        HandleOutcome::Retry
                    }
                }
                CommitMode::Auto => {
                    error!(%user_id, event_type, "Audit write failed, message is dropped: {reason}");
                    HandleOutcome::Ack
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        domain::{
            audit::{AuditRecord, AuditRepository, NewAuditRecord, SaveOutcome},
            events::fixtures::ann,
        },
        infrastructure::memory::InMemoryAuditRepository,
        shared::errors::DomainError,
    };

    struct ReadOnlyRepository;

    #[async_trait]
    impl AuditRepository for ReadOnlyRepository {
        async fn save(&self, _record: NewAuditRecord) -> Result<SaveOutcome, DomainError> {
            Err(DomainError::Unexpected("read-only transaction".into()))
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

    fn message(payload: Option<&[u8]>, offset: i64) -> InboundMessage<'_> {
        InboundMessage {
            topic: "user-topic",
            partition: 0,
            offset,
            payload,
        }
    }

    fn consumer(repo: Arc<dyn AuditRepository>, mode: CommitMode) -> AuditConsumer {
        AuditConsumer::new(Arc::new(AuditService::new(repo)), CONSUMER_SOURCE, mode)
    }

    #[tokio::test]
    async fn stores_record_tagged_with_consumer_source() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let consumer = consumer(repo.clone(), CommitMode::AfterPersist);
        let payload = UserEvent::created(ann()).to_wire().unwrap();

        let outcome = consumer.handle(message(Some(payload.as_slice()), 3)).await;

        assert_eq!(outcome, HandleOutcome::Ack);
        let records = repo.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_application.as_deref(), Some(CONSUMER_SOURCE));
        assert_eq!(records[0].delivery_key.as_deref(), Some("user-topic/0/3"));
        assert!(repo.find_by_delivery_key("user-topic/0/3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn skips_tombstones_and_garbage() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let consumer = consumer(repo.clone(), CommitMode::AfterPersist);

        assert_eq!(consumer.handle(message(None, 0)).await, HandleOutcome::Ack);
        assert_eq!(
            consumer.handle(message(Some(&b"not json"[..]), 1)).await,
            HandleOutcome::Ack
        );
        assert_eq!(
            consumer
                .handle(message(Some(&br#"{"eventType":"CREATED","userData":null}"#[..]), 2))
                .await,
            HandleOutcome::Ack
        );
        assert_eq!(repo.len(), 0);
    }

    #[tokio::test]
    async fn failed_write_is_retried_when_gated() {
        let consumer = consumer(Arc::new(ReadOnlyRepository), CommitMode::AfterPersist);
        let payload = UserEvent::updated(ann()).to_wire().unwrap();

        assert_eq!(
            consumer.handle(message(Some(payload.as_slice()), 5)).await,
            HandleOutcome::Retry
        );
    }

    #[tokio::test]
    async fn permanent_write_failure_is_given_up_after_max_attempts() {
        let consumer =
            consumer(Arc::new(ReadOnlyRepository), CommitMode::AfterPersist).with_max_attempts(3);
        let payload = br#"{"eventType":"CREATED\u0000","userData":{"id":1}}"#;
        assert!(UserEvent::from_wire(payload).unwrap().is_valid());

        let mut outcomes = vec![];
        for _ in 0..3 {
            outcomes.push(consumer.handle(message(Some(&payload[..]), 9)).await);
        }

        assert_eq!(
            outcomes,
            [HandleOutcome::Retry, HandleOutcome::Retry, HandleOutcome::Ack]
        );
        // The next message on the partition gets its own budget.
        assert_eq!(
            consumer.handle(message(Some(&payload[..]), 10)).await,
            HandleOutcome::Retry
        );
    }

    #[tokio::test]
    async fn failed_write_is_dropped_in_auto_mode() {
        let consumer = consumer(Arc::new(ReadOnlyRepository), CommitMode::Auto);
        let payload = UserEvent::updated(ann()).to_wire().unwrap();

        assert_eq!(
            consumer.handle(message(Some(payload.as_slice()), 5)).await,
            HandleOutcome::Ack
        );
    }

    #[tokio::test]
    async fn redelivery_does_not_duplicate() {
        let repo = Arc::new(InMemoryAuditRepository::default());
        let consumer = consumer(repo.clone(), CommitMode::AfterPersist);
        let payload = UserEvent::created(ann()).to_wire().unwrap();

        consumer.handle(message(Some(payload.as_slice()), 11)).await;
        consumer.handle(message(Some(payload.as_slice()), 11)).await;

        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn commit_mode_parses_from_config_values() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: CommitMode,
        }
        let parsed: Wrapper = serde_json::from_str(r#"{"mode":"auto"}"#).unwrap();
        assert_eq!(parsed.mode, CommitMode::Auto);
        let parsed: Wrapper = serde_json::from_str(r#"{"mode":"after_persist"}"#).unwrap();
        assert_eq!(parsed.mode, CommitMode::AfterPersist);
    }
}
