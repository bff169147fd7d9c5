use std::sync::Arc;

use crate::{
    application::{audit_service::AuditService, event_publisher::EventPublisher},
    config::AuditConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<EventPublisher>,
    pub audit_service: Arc<AuditService>,
    pub audit_config: AuditConfig,
}

impl AppState {
    pub fn new(
        publisher: Arc<EventPublisher>,
        audit_service: Arc<AuditService>,
        audit_config: AuditConfig,
    ) -> Self {
        Self {
            publisher,
            audit_service,
            audit_config,
        }
    }
}

pub type SharedState = Arc<AppState>;
