//! Marketplace data processor
//!
//! Periodic batch worker: drains marketplace records from RabbitMQ, writes a raw
//! JSON snapshot, runs the feature-engineering program over it and loads the
//! engineered CSV output into PostgreSQL.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::{Config, PostgresConfig};
pub use error::{AppError, Result};

/// Service name used for pool labels and consumer tags
pub const SERVICE_NAME: &str = "data-processor-service";
