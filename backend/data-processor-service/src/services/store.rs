//! Optional relational store
//!
//! PostgreSQL is a capability, not a requirement: when it cannot be reached or
//! migrated at startup the pipeline keeps running and only writes files.

use super::loader::BulkLoader;
use crate::config::PostgresConfig;
use crate::error::{AppError, Result};
use crate::models::DataType;
use crate::SERVICE_NAME;
use db_pool::{create_pool, verify_connection, DbConfig};
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Schema migrations for `processed_data`
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub enum RelationalStore {
    Configured(ConfiguredStore),
    Disabled,
}

/// Connected and migrated store
pub struct ConfiguredStore {
    pool: PgPool,
    loader: BulkLoader,
}

/// Rows written per split by one load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub train_rows: u64,
    /// `None` when no test artifact was produced
    pub test_rows: Option<u64>,
}

impl RelationalStore {
    /// Connect and migrate, downgrading to [`RelationalStore::Disabled`] on failure
    pub async fn connect(config: &PostgresConfig, flush_size: usize) -> Self {
        if !config.enabled {
            info!("PostgreSQL disabled by configuration, data will only be saved to files");
            return RelationalStore::Disabled;
        }

        match connect_and_migrate(config).await {
            Ok(pool) => {
                info!("PostgreSQL connection and migrations successful");
                Self::from_pool(pool, flush_size)
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialise PostgreSQL");
                warn!("Continuing without PostgreSQL, data will only be saved to files");
                RelationalStore::Disabled
            }
        }
    }

    /// Wrap an existing pool without connecting or migrating
    pub fn from_pool(pool: PgPool, flush_size: usize) -> Self {
        RelationalStore::Configured(ConfiguredStore {
            loader: BulkLoader::new(pool.clone(), flush_size),
            pool,
        })
    }

    pub async fn close(&self) {
        if let RelationalStore::Configured(store) = self {
            store.pool.close().await;
            info!("PostgreSQL pool closed");
        }
    }
}

async fn connect_and_migrate(config: &PostgresConfig) -> Result<PgPool> {
    let db_config = DbConfig::for_service(SERVICE_NAME, config.connection_url());
    db_config.log_config();

    let pool = create_pool(db_config).await?;
    if let Err(e) = MIGRATOR.run(&pool).await {
        pool.close().await;
        return Err(e.into());
    }
    Ok(pool)
}

impl ConfiguredStore {
    pub async fn health_check(&self) -> Result<()> {
        verify_connection(&self.pool, HEALTH_CHECK_TIMEOUT)
            .await
            .map_err(|e| AppError::Load(format!("PostgreSQL health check failed: {e}")))
    }

    /// Load `train_data.csv` and, when present, `test_data.csv` from `processed_dir`
    pub async fn load_artifacts(&self, processed_dir: &Path) -> Result<LoadSummary> {
        self.health_check().await?;

        let train_path = processed_dir.join(DataType::Train.artifact_file_name());
        let train_rows = self.loader.load(&train_path, DataType::Train).await?;

        let test_path = processed_dir.join(DataType::Test.artifact_file_name());
        let test_rows = if tokio::fs::try_exists(&test_path).await? {
            Some(self.loader.load(&test_path, DataType::Test).await?)
        } else {
            None
        };

        Ok(LoadSummary {
            train_rows,
            test_rows,
        })
    }
}
