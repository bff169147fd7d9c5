use axum::{Json, extract::State, http::StatusCode};

use crate::{
    application::event_publisher::DeliveryReceipt, domain::events::UserEvent,
    shared::errors::ApiError, state::SharedState,
};

pub async fn publish_user_event(
    State(state): State<SharedState>,
    Json(event): Json<UserEvent>,
) -> Result<(StatusCode, Json<DeliveryReceipt>), ApiError> {
    let receipt = state.publisher.send(&event).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}
