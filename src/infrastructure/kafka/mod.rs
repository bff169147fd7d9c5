use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::{
    ClientConfig, Offset,
    consumer::{Consumer, StreamConsumer},
    message::Message,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    application::{
        audit_consumer::{AuditConsumer, HandleOutcome, InboundMessage},
        event_publisher::{DeliveryReceipt, EventChannel},
    },
    config::KafkaConfig,
    shared::errors::InfrastructureError,
};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// What the consumer loop does with a partition position once a message is handled.
#[derive(Debug, PartialEq)]
pub(crate) enum OffsetAction {
    Store,
    Rewind(Offset),
}

pub(crate) fn offset_action(outcome: HandleOutcome, offset: i64) -> OffsetAction {
    match outcome {
        HandleOutcome::Ack => OffsetAction::Store,
        HandleOutcome::Retry => OffsetAction::Rewind(Offset::Offset(offset)),
    }
}

#[derive(Clone)]
pub struct KafkaChannel {
    inner: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaChannel {
    pub fn new(cfg: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.brokers)
            .set("message.timeout.ms", cfg.message_timeout_ms.to_string())
            // Keeps per-key order intact across the client's internal retries.
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self {
            inner: producer,
            queue_timeout: Duration::from_millis(cfg.message_timeout_ms),
        })
    }
}

#[async_trait]
impl EventChannel for KafkaChannel {
    async fn deliver(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, InfrastructureError> {
        let (partition, offset) = self
            .inner
            .send(
                FutureRecord::to(topic).payload(payload).key(key),
                Timeout::After(self.queue_timeout),
            )
            .await
            .map_err(|(err, _)| InfrastructureError::from(err))?;

        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            key: key.to_string(),
            partition,
            offset,
        })
    }
}

pub fn build_consumer(cfg: &KafkaConfig) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", &cfg.group_id)
        .set("bootstrap.servers", &cfg.brokers)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", cfg.session_timeout_ms.to_string())
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "true")
        // Offsets are stored by hand once a message is settled.
        .set("enable.auto.offset.store", "false")
        .create()?;

    consumer.subscribe(&[&cfg.topic])?;
    Ok(consumer)
}

pub fn spawn_consumer(
    cfg: Arc<KafkaConfig>,
    handler: Arc<AuditConsumer>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let consumer = build_consumer(&cfg)?;
    info!(
        topic = %cfg.topic,
        group_id = %cfg.group_id,
        commit_mode = ?handler.commit_mode(),
        "Kafka consumer subscribed"
    );

    let handle = tokio::spawn(async move {
        let mut stream = consumer.stream();
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Kafka consumer received shutdown signal");
                        break;
                    }
                }

                message = stream.next() => {
                    let Some(message) = message else {
                        warn!("Kafka stream ended");
                        break;
                    };

                    let msg = match message {
                        Ok(msg) => msg,
                        Err(err) => {
                            error!("Kafka error: {err}");
                            continue;
                        }
                    };

                    let inbound = InboundMessage {
                        topic: msg.topic(),
                        partition: msg.partition(),
                        offset: msg.offset(),
                        payload: msg.payload(),
                    };

                    let outcome = handler.handle(inbound).await;
                    match offset_action(outcome, msg.offset()) {
                        OffsetAction::Store => {
                            if let Err(err) = consumer.store_offset_from_message(&msg) {
                                error!(
                                    partition = msg.partition(),
                                    offset = msg.offset(),
                                    "Failed to store consumer offset: {err}"
                                );
                            }
                        }
                        OffsetAction::Rewind(position) => {
                            tokio::time::sleep(cfg.retry_backoff()).await;
                            if let Err(err) =
                                consumer.seek(msg.topic(), msg.partition(), position, SEEK_TIMEOUT)
                            {
                                error!(
                                    partition = msg.partition(),
                                    offset = msg.offset(),
                                    "Failed to rewind partition for redelivery: {err}"
                                );
                            }
                        }
                    }
                }
            }
        }

        if let Err(err) = consumer.commit_consumer_state(rdkafka::consumer::CommitMode::Sync) {
            warn!("Final offset commit failed: {err}");
        }
        info!("Kafka consumer stopped");
    });

    Ok(handle)
}
