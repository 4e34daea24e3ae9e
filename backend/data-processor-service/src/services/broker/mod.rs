//! Broker gateway
//!
//! `collector` holds the transport-independent batch loop, `gateway` the
//! RabbitMQ connection that feeds it.

pub mod collector;
pub mod gateway;

pub use collector::{collect_batch, BatchStats, InboundDelivery, StopReason};
pub use gateway::BrokerGateway;

use crate::error::Result;
use crate::models::RawBatch;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source of record batches for the orchestrator
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Consume up to `max_count` records, returning early on timeout,
    /// cancellation or channel close
    async fn consume_batch(
        &self,
        queue: &str,
        max_count: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(RawBatch, BatchStats)>;

    async fn close(&self) -> Result<()>;
}
