//! RabbitMQ connection for the data queue

use super::collector::{collect_batch, BatchStats, InboundDelivery};
use super::BatchSource;
use crate::error::{AppError, Result};
use crate::models::RawBatch;
use crate::SERVICE_NAME;
use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const PERSISTENT_DELIVERY: u8 = 2;

#[async_trait]
impl InboundDelivery for Delivery {
    fn payload(&self) -> &[u8] {
        &self.data
    }

    async fn ack(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }

    async fn reject(&self) -> Result<()> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }
}

/// One AMQP connection plus a long-lived channel for publishing.
///
/// Each consume gets its own channel, closed when the batch is complete so the
/// broker requeues anything prefetched but not settled.
pub struct BrokerGateway {
    connection: Connection,
    publish_channel: Channel,
}

impl BrokerGateway {
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| AppError::Transport(format!("failed to connect to RabbitMQ: {e}")))?;
        let publish_channel = connection.create_channel().await?;

        info!("Connected to RabbitMQ");
        Ok(Self {
            connection,
            publish_channel,
        })
    }

    /// Ensure a durable, non-exclusive, non-auto-delete queue exists
    pub async fn declare(&self, queue: &str) -> Result<()> {
        declare_on(&self.publish_channel, queue).await
    }

    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT_DELIVERY);

        let publish = async {
            self.publish_channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions {
                        mandatory: false,
                        ..BasicPublishOptions::default()
                    },
                    payload,
                    properties,
                )
                .await?
                .await
        };

        tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| AppError::Transport("publish timed out".to_string()))??;

        debug!(queue = %queue, bytes = payload.len(), "Published message");
        Ok(())
    }

    pub async fn consume_batch(
        &self,
        queue: &str,
        max_count: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(RawBatch, BatchStats)> {
        let channel = self.connection.create_channel().await?;
        declare_on(&channel, queue).await?;

        // A prefetch of 0 means unlimited in AMQP
        let prefetch = u16::try_from(max_count.max(1)).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("{}-{}", SERVICE_NAME, Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!(
            queue = %queue,
            consumer_tag = %consumer_tag,
            prefetch,
            timeout_secs = timeout.as_secs(),
            "Consuming batch"
        );

        let result = collect_batch(consumer, max_count, timeout, cancel).await;

        if let Err(e) = channel.close(200, "batch complete").await {
            warn!(error = %e, "Failed to close consume channel");
        }

        result
    }

    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.publish_channel.close(200, "OK").await {
            warn!(error = %e, "Failed to close publish channel");
        }
        self.connection.close(200, "OK").await?;
        info!("RabbitMQ connection closed");
        Ok(())
    }
}

async fn declare_on(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

#[async_trait]
impl BatchSource for BrokerGateway {
    async fn consume_batch(
        &self,
        queue: &str,
        max_count: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(RawBatch, BatchStats)> {
        BrokerGateway::consume_batch(self, queue, max_count, timeout, cancel).await
    }

    async fn close(&self) -> Result<()> {
        BrokerGateway::close(self).await
    }
}
