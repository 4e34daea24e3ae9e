//! Bounded batch collection over a stream of deliveries

use crate::error::{AppError, Result};
use crate::models::{RawBatch, RawRecord};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A single broker delivery that can be settled
#[async_trait]
pub trait InboundDelivery: Send {
    fn payload(&self) -> &[u8];

    /// Positive acknowledgement
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgement without requeue
    async fn reject(&self) -> Result<()>;
}

/// Why a batch stopped growing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Timeout,
    ChannelClosed,
    BatchFull,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Cancelled => "cancelled",
            StopReason::Timeout => "timeout",
            StopReason::ChannelClosed => "channel_closed",
            StopReason::BatchFull => "batch_full",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub acked: usize,
    pub rejected: usize,
    pub stop_reason: StopReason,
}

/// Drain `deliveries` until cancellation, timeout, stream end or `max_count`
/// decoded records, in that order of precedence.
///
/// Decoded records are acked and kept in delivery order. Payloads that are not
/// a JSON object are rejected without requeue. A failed ack keeps the record;
/// the broker redelivers it and the upsert absorbs the duplicate.
pub async fn collect_batch<S, D, E>(
    deliveries: S,
    max_count: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(RawBatch, BatchStats)>
where
    S: Stream<Item = std::result::Result<D, E>>,
    D: InboundDelivery,
    E: fmt::Display,
{
    let mut deliveries = std::pin::pin!(deliveries);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut batch = RawBatch::with_capacity(max_count.min(1024));
    let mut acked = 0;
    let mut rejected = 0;

    if max_count == 0 {
        return Ok((
            batch,
            BatchStats {
                acked,
                rejected,
                stop_reason: StopReason::BatchFull,
            },
        ));
    }

    let stop_reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break StopReason::Cancelled,

            _ = &mut deadline => break StopReason::Timeout,

            next = deliveries.next() => {
                let delivery = match next {
                    None => break StopReason::ChannelClosed,
                    Some(Err(e)) => {
                        return Err(AppError::Transport(format!("consume failed: {e}")));
                    }
                    Some(Ok(delivery)) => delivery,
                };

                match serde_json::from_slice::<RawRecord>(delivery.payload()) {
                    Ok(record) => {
                        batch.push(record);
                        match delivery.ack().await {
                            Ok(()) => acked += 1,
                            Err(e) => warn!(error = %e, "Failed to ack message"),
                        }
                        if batch.len() >= max_count {
                            break StopReason::BatchFull;
                        }
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            bytes = delivery.payload().len(),
                            "Dropping undecodable message"
                        );
                        match delivery.reject().await {
                            Ok(()) => rejected += 1,
                            Err(e) => warn!(error = %e, "Failed to nack message"),
                        }
                    }
                }
            }
        }
    };

    debug!(
        records = batch.len(),
        acked,
        rejected,
        stop_reason = %stop_reason,
        "Batch collection finished"
    );

    Ok((
        batch,
        BatchStats {
            acked,
            rejected,
            stop_reason,
        },
    ))
}
