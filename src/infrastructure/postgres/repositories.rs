use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::{
    domain::audit::{AuditRecord, AuditRepository, NewAuditRecord, SaveOutcome},
    shared::errors::{DomainError, InfrastructureError},
};

const AUDIT_COLUMNS: &str =
    "id, event_timestamp, event_type, user_id, event_details, source_application, delivery_key";

pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, value: &str) -> Result<Vec<AuditRecord>, DomainError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM user_audit_log WHERE {clause} ORDER BY event_timestamp, id"
        );
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(InfrastructureError::from)?;

        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn save(&self, record: NewAuditRecord) -> Result<SaveOutcome, DomainError> {
        let NewAuditRecord {
            event_type,
            user_id,
            event_details,
            source_application,
            delivery_key,
        } = record;

        let mut tx = self.pool.begin().await.map_err(InfrastructureError::from)?;

        let inserted = sqlx::query_as::<_, AuditRow>(&format!(
            r#"
            INSERT INTO user_audit_log (event_type, user_id, event_details, source_application, delivery_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (delivery_key) DO NOTHING
            RETURNING {AUDIT_COLUMNS}
            "#
        ))
        .bind(&event_type)
        .bind(&user_id)
        .bind(&event_details)
        .bind(&source_application)
        .bind(&delivery_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(InfrastructureError::from)?;

        let outcome = match (inserted, delivery_key) {
            (Some(row), _) => SaveOutcome::Inserted(row.into()),
            (None, Some(key)) => {
                let existing = sqlx::query_as::<_, AuditRow>(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM user_audit_log WHERE delivery_key = $1"
                ))
                .bind(&key)
                .fetch_one(&mut *tx)
                .await
                .map_err(InfrastructureError::from)?;
                SaveOutcome::AlreadyStored(existing.into())
            }
            (None, None) => {
                return Err(DomainError::Unexpected(
                    "insert returned no row for an unkeyed audit record".to_string(),
                ));
            }
        };

        tx.commit().await.map_err(InfrastructureError::from)?;

        Ok(outcome)
    }

    async fn find_by_event_type(&self, event_type: &str) -> Result<Vec<AuditRecord>, DomainError> {
        self.fetch_where("event_type = $1", event_type).await
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<AuditRecord>, DomainError> {
        self.fetch_where("user_id = $1", user_id).await
    }

    async fn find_by_event_timestamp_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, DomainError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS}
            FROM user_audit_log
            WHERE event_timestamp BETWEEN $1 AND $2
            ORDER BY event_timestamp, id
            "#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(InfrastructureError::from)?;

        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }

    async fn find_by_delivery_key(&self, key: &str) -> Result<Option<AuditRecord>, DomainError> {
        Ok(self
            .fetch_where("delivery_key = $1", key)
            .await?
            .into_iter()
            .next())
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: i64,
    event_timestamp: DateTime<Utc>,
    event_type: String,
    user_id: String,
    event_details: String,
    source_application: Option<String>,
    delivery_key: Option<String>,
}

impl From<AuditRow> for AuditRecord {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            event_timestamp: row.event_timestamp,
            event_type: row.event_type,
            user_id: row.user_id,
            event_details: row.event_details,
            source_application: row.source_application,
            delivery_key: row.delivery_key,
        }
    }
}
