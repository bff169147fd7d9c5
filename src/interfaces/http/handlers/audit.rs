use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    application::audit_service::PersistOutcome,
    domain::{audit::AuditRecord, events::UserEvent},
    shared::errors::{ApiError, DomainError},
    state::SharedState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn list_records(
    State(state): State<SharedState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let audit = &state.audit_service;
    let records = match query {
        AuditQuery {
            event_type: Some(event_type),
            user_id: None,
            from: None,
            to: None,
        } => audit.records_by_event_type(&event_type).await?,
        AuditQuery {
            event_type: None,
            user_id: Some(user_id),
            from: None,
            to: None,
        } => audit.records_by_user_id(&user_id).await?,
        AuditQuery {
            event_type: None,
            user_id: None,
            from: Some(from),
            to: Some(to),
        } if from <= to => audit.records_between(from, to).await?,
        _ => {
            return Err(ApiError::BadRequest {
                message: "use exactly one filter: eventType, userId, or from+to (from <= to)"
                    .to_string(),
            });
        }
    };

    Ok(Json(records))
}

pub async fn record_event(
    State(state): State<SharedState>,
    Json(event): Json<UserEvent>,
) -> Result<(StatusCode, Json<AuditRecord>), ApiError> {
    let source = state.audit_config.direct_source.as_str();
    match state.audit_service.persist(&event, Some(source)).await {
        PersistOutcome::Recorded(record) | PersistOutcome::Duplicate(record) => {
            Ok((StatusCode::CREATED, Json(record)))
        }
        PersistOutcome::Rejected => Err(DomainError::InvalidEvent {
            event_type: event.event_type_or_unknown().to_string(),
        }
        .into()),
        PersistOutcome::Failed(_) => Err(ApiError::Unavailable {
            message: "audit store unavailable".to_string(),
        }),
    }
}
