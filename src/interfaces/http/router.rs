use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

use super::handlers::{audit, events, health};

pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/v1/user-events", post(events::publish_user_event))
        .route(
            "/v1/audit/records",
            get(audit::list_records).post(audit::record_event),
        );

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
