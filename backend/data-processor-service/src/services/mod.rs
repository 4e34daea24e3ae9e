//! Pipeline stages and their composition
//!
//! - Broker gateway for bounded batch consumption from RabbitMQ
//! - Snapshot store for raw batches on disk
//! - Driver for the external feature-engineering program
//! - Bulk loader and optional relational store
//! - Orchestrator running the stages on a schedule

pub mod broker;
pub mod loader;
pub mod pipeline;
pub mod processor;
pub mod snapshot;
pub mod store;

pub use broker::{BatchSource, BatchStats, BrokerGateway, InboundDelivery, StopReason};
pub use loader::{BulkLoader, ColumnIndex};
pub use pipeline::{Pipeline, PipelineConfig, StoreOutcome, TickOutcome};
pub use processor::{ExternalProcessor, ProcessorConfig};
pub use snapshot::SnapshotStore;
pub use store::{ConfiguredStore, LoadSummary, RelationalStore};
