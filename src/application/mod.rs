pub mod audit_consumer;
pub mod audit_service;
pub mod event_publisher;
