use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid user event (type `{event_type}`): user data and user id are required")]
    InvalidEvent { event_type: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(String),
    #[error("kafka error: {0}")]
    Kafka(String),
}

impl From<sqlx::Error> for InfrastructureError {
    fn from(value: sqlx::Error) -> Self {
        InfrastructureError::Database(value.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for InfrastructureError {
    fn from(value: rdkafka::error::KafkaError) -> Self {
        InfrastructureError::Kafka(value.to_string())
    }
}

impl From<InfrastructureError> for DomainError {
    fn from(value: InfrastructureError) -> Self {
        DomainError::Unexpected(value.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    InvalidEvent(DomainError),
    #[error("failed to encode user event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to deliver user event to `{topic}`: {source}")]
    Delivery {
        topic: String,
        #[source]
        source: InfrastructureError,
    },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String },
    #[error("{message}")]
    Unavailable { message: String },
    #[error("internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            ApiError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body = ErrorBody { message };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            err @ DomainError::InvalidEvent { .. } => ApiError::BadRequest {
                message: err.to_string(),
            },
            DomainError::Unexpected(msg) => {
                tracing::error!("Internal error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(value: PublishError) -> Self {
        match value {
            PublishError::InvalidEvent(err) => err.into(),
            PublishError::Serialization(err) => {
                tracing::error!("Failed to encode user event: {err}");
                ApiError::Internal
            }
            err @ PublishError::Delivery { .. } => ApiError::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {err:?}");
        ApiError::Internal
    }
}
