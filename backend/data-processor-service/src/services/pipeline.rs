//! Pipeline orchestrator
//!
//! Each tick runs consume -> snapshot -> external program -> load, strictly in
//! order. Ticks run one at a time on a fixed interval until cancelled.

use super::broker::BatchSource;
use super::processor::ExternalProcessor;
use super::snapshot::SnapshotStore;
use super::store::RelationalStore;
use crate::error::Result;
use chrono::Local;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue: String,
    /// Max records per tick
    pub batch_size: usize,
    pub consume_timeout: Duration,
    pub interval: Duration,
    pub cutoff_date: String,
}

/// Result of the relational store stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Loaded {
        train_rows: u64,
        test_rows: Option<u64>,
    },
    /// No store configured
    Skipped,
    /// Store stage failed; files remain on disk
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was consumed
    Empty,
    /// Cancellation was observed before the tick finished
    Cancelled,
    Completed {
        records: usize,
        snapshot: PathBuf,
        store: StoreOutcome,
    },
}

pub struct Pipeline<S: BatchSource> {
    source: S,
    snapshots: SnapshotStore,
    processor: ExternalProcessor,
    store: RelationalStore,
    config: PipelineConfig,
}

impl<S: BatchSource> Pipeline<S> {
    pub fn new(
        source: S,
        snapshots: SnapshotStore,
        processor: ExternalProcessor,
        store: RelationalStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            snapshots,
            processor,
            store,
            config,
        }
    }

    /// Run ticks until `cancel` fires: one immediately, then one per interval.
    ///
    /// A tick that overruns the interval is followed directly by the next one.
    pub async fn start(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            queue = %self.config.queue,
            "Starting scheduler"
        );

        self.run_logged_tick(&cancel).await;

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // First tick completes immediately

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.run_logged_tick(&cancel).await;
                }
            }
        }
    }

    async fn run_logged_tick(&self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        match self.run_tick(cancel).await {
            Ok(TickOutcome::Empty) => info!("No data to process"),
            Ok(TickOutcome::Cancelled) => info!("Tick cancelled"),
            Ok(TickOutcome::Completed {
                records,
                snapshot,
                store,
            }) => info!(
                records,
                snapshot = %snapshot.display(),
                store = ?store,
                "Data processing completed"
            ),
            Err(e) => error!(error = %e, "Data processing failed, will retry next interval"),
        }
    }

    /// Run one tick.
    ///
    /// Consume, snapshot and processing errors abort the tick. Store failures
    /// are reported in the outcome and logged as warnings.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        let tick_id = Uuid::new_v4();
        self.tick(cancel)
            .instrument(info_span!("tick", %tick_id))
            .await
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }

        let (batch, stats) = self
            .source
            .consume_batch(
                &self.config.queue,
                self.config.batch_size,
                self.config.consume_timeout,
                cancel,
            )
            .await?;

        info!(
            records = batch.len(),
            acked = stats.acked,
            rejected = stats.rejected,
            stop_reason = %stats.stop_reason,
            "Consumed batch"
        );

        if batch.is_empty() {
            return Ok(if cancel.is_cancelled() {
                TickOutcome::Cancelled
            } else {
                TickOutcome::Empty
            });
        }

        // Acked records are persisted even when cancellation arrived mid-consume
        self.snapshots.raw_dir().await?;
        let snapshot = self.snapshots.snapshot_path(Local::now());
        self.snapshots.write_snapshot(&batch, &snapshot).await?;
        let records = batch.len();
        drop(batch);

        if cancel.is_cancelled() {
            info!(snapshot = %snapshot.display(), "Cancelled after snapshot, skipping processing");
            return Ok(TickOutcome::Cancelled);
        }

        let processed_dir = self.snapshots.processed_dir().await?;
        self.processor
            .run(&snapshot, &processed_dir, &self.config.cutoff_date)
            .await?;

        if cancel.is_cancelled() {
            info!(
                output = %processed_dir.display(),
                "Cancelled after processing, artifacts kept on disk"
            );
            return Ok(TickOutcome::Cancelled);
        }

        let store = match &self.store {
            RelationalStore::Disabled => {
                info!("PostgreSQL not configured, skipping database load");
                StoreOutcome::Skipped
            }
            RelationalStore::Configured(store) => {
                match store.load_artifacts(&processed_dir).await {
                    Ok(summary) => StoreOutcome::Loaded {
                        train_rows: summary.train_rows,
                        test_rows: summary.test_rows,
                    },
                    Err(e) => {
                        warn!(
                            error = %e,
                            "Failed to save processed data to database, files are kept on disk"
                        );
                        StoreOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        Ok(TickOutcome::Completed {
            records,
            snapshot,
            store,
        })
    }

    /// Close the batch source and the relational store
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await;
        self.source.close().await
    }
}
