use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    domain::events::UserEvent,
    shared::errors::{InfrastructureError, PublishError},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub key: String,
    pub partition: i32,
    pub offset: i64,
}

/// Partitioned transport: messages sharing a key land on the same partition
/// and keep their relative order.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn deliver(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, InfrastructureError>;
}

pub struct EventPublisher {
    channel: Arc<dyn EventChannel>,
    topic: String,
}

impl EventPublisher {
    pub fn new(channel: Arc<dyn EventChannel>, topic: impl Into<String>) -> Self {
        Self {
            channel,
            topic: topic.into(),
        }
    }

    pub async fn send(&self, event: &UserEvent) -> Result<DeliveryReceipt, PublishError> {
        let key = event.partition_key().map_err(|err| {
            error!(
                event_type = event.event_type_or_unknown(),
                "Rejected user event before publishing: {err}"
            );
            PublishError::InvalidEvent(err)
        })?;

        let payload = event.to_wire().map_err(|err| {
            error!(user_id = %key, event_type = %event.event_type, "Failed to encode user event: {err}");
            PublishError::from(err)
        })?;

        info!(
            topic = %self.topic,
            user_id = %key,
            event_type = %event.event_type,
            "Sending user event"
        );

        match self.channel.deliver(&self.topic, &key, &payload).await {
            Ok(receipt) => {
                info!(
                    topic = %receipt.topic,
                    user_id = %key,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "User event delivered"
                );
                Ok(receipt)
            }
            Err(source) => {
                error!(
                    topic = %self.topic,
                    user_id = %key,
                    event_type = %event.event_type,
                    "Failed to deliver user event: {source}"
                );
                Err(PublishError::Delivery {
                    topic: self.topic.clone(),
                    source,
                })
            }
        }
    }
}
