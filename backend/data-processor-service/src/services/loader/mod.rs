//! Bulk loader for processed artifacts
//!
//! Streams a processed CSV in `flush_size` row batches and upserts each batch
//! into `processed_data` with one multi-row statement. Every batch runs inside
//! a single transaction.

pub mod columns;

pub use columns::{
    parse_bool, parse_int, parse_nullable_decimal, parse_required_decimal, ColumnIndex,
};

use crate::error::{AppError, Result};
use crate::models::{DataType, ProcessedRow, PROCESSED_COLUMNS};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Default rows per flush
pub const DEFAULT_FLUSH_SIZE: usize = 1000;

/// PostgreSQL caps a statement at 65535 bind parameters
const MAX_FLUSH_SIZE: usize = u16::MAX as usize / PROCESSED_COLUMNS.len();

const UPSERT_PREFIX: &str = r#"INSERT INTO processed_data (
        product_name, date, region, brand, category,
        sales_quantity, price, original_price, discount_percentage,
        stock_level, customer_rating, review_count, delivery_days,
        seller, is_weekend, is_holiday, day_of_week, month, quarter,
        sales_quantity_lag_1, sales_quantity_lag_3, sales_quantity_lag_7,
        price_lag_1, price_lag_3, price_lag_7,
        sales_quantity_rolling_mean_3, sales_quantity_rolling_mean_7,
        price_rolling_mean_3, price_rolling_mean_7,
        price_target, sales_target, data_type
    ) "#;

const UPSERT_CONFLICT: &str = r#"
    ON CONFLICT (product_name, date, region, data_type) DO UPDATE SET
        brand = EXCLUDED.brand,
        category = EXCLUDED.category,
        sales_quantity = EXCLUDED.sales_quantity,
        price = EXCLUDED.price,
        original_price = EXCLUDED.original_price,
        discount_percentage = EXCLUDED.discount_percentage,
        stock_level = EXCLUDED.stock_level,
        customer_rating = EXCLUDED.customer_rating,
        review_count = EXCLUDED.review_count,
        delivery_days = EXCLUDED.delivery_days,
        seller = EXCLUDED.seller,
        is_weekend = EXCLUDED.is_weekend,
        is_holiday = EXCLUDED.is_holiday,
        day_of_week = EXCLUDED.day_of_week,
        month = EXCLUDED.month,
        quarter = EXCLUDED.quarter,
        sales_quantity_lag_1 = EXCLUDED.sales_quantity_lag_1,
        sales_quantity_lag_3 = EXCLUDED.sales_quantity_lag_3,
        sales_quantity_lag_7 = EXCLUDED.sales_quantity_lag_7,
        price_lag_1 = EXCLUDED.price_lag_1,
        price_lag_3 = EXCLUDED.price_lag_3,
        price_lag_7 = EXCLUDED.price_lag_7,
        sales_quantity_rolling_mean_3 = EXCLUDED.sales_quantity_rolling_mean_3,
        sales_quantity_rolling_mean_7 = EXCLUDED.sales_quantity_rolling_mean_7,
        price_rolling_mean_3 = EXCLUDED.price_rolling_mean_3,
        price_rolling_mean_7 = EXCLUDED.price_rolling_mean_7,
        price_target = EXCLUDED.price_target,
        sales_target = EXCLUDED.sales_target
"#;

#[derive(Debug, Clone)]
pub struct BulkLoader {
    pool: PgPool,
    flush_size: usize,
}

impl BulkLoader {
    pub fn new(pool: PgPool, flush_size: usize) -> Self {
        Self {
            pool,
            flush_size: flush_size.clamp(1, MAX_FLUSH_SIZE),
        }
    }

    /// Upsert every row of `csv_path` tagged with `data_type`.
    ///
    /// All batches are written in one transaction; any failure rolls it back.
    /// Returns the number of distinct rows written.
    pub async fn load(&self, csv_path: &Path, data_type: DataType) -> Result<u64> {
        let mut batches = stream_batches(csv_path.to_path_buf(), data_type, self.flush_size);

        let mut tx = self.pool.begin().await?;
        let mut written: u64 = 0;

        while let Some(batch) = batches.recv().await {
            let batch = dedupe_by_key(batch?);
            if batch.is_empty() {
                continue;
            }
            build_upsert(&batch).build().execute(&mut *tx).await?;
            written += batch.len() as u64;
            info!(data_type = %data_type, rows = written, "Inserted rows");
        }

        tx.commit().await?;

        info!(
            path = %csv_path.display(),
            data_type = %data_type,
            rows = written,
            "Processed data saved to database"
        );
        Ok(written)
    }
}

/// Parse the artifact off the async runtime, handing over one batch at a time.
///
/// The reader stops as soon as the receiver is dropped.
fn stream_batches(
    path: PathBuf,
    data_type: DataType,
    flush_size: usize,
) -> mpsc::Receiver<Result<Vec<ProcessedRow>>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = read_batches(&path, data_type, flush_size, |batch| {
            tx.blocking_send(Ok(batch)).is_ok()
        }) {
            let _ = tx.blocking_send(Err(e));
        }
    });
    rx
}

/// Feed `sink` consecutive batches of at most `flush_size` rows.
///
/// The trailing partial batch is always delivered. Stops early when `sink`
/// returns false.
fn read_batches<F>(path: &Path, data_type: DataType, flush_size: usize, mut sink: F) -> Result<()>
where
    F: FnMut(Vec<ProcessedRow>) -> bool,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| AppError::Load(format!("failed to open {}: {e}", path.display())))?;

    let index = ColumnIndex::from_headers(reader.headers()?)?;
    debug!(path = %path.display(), data_type = %data_type, "Reading processed artifact");

    let mut batch = Vec::with_capacity(flush_size);
    for record in reader.records() {
        batch.push(index.parse_row(&record?, data_type));
        if batch.len() == flush_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(flush_size));
            if !sink(full) {
                return Ok(());
            }
        }
    }
    if !batch.is_empty() {
        sink(batch);
    }
    Ok(())
}

/// Keep the last row for each natural key, in order of last appearance.
///
/// One statement may not touch the same conflict target twice.
fn dedupe_by_key(rows: Vec<ProcessedRow>) -> Vec<ProcessedRow> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut kept: Vec<ProcessedRow> = rows
        .into_iter()
        .rev()
        .filter(|row| {
            seen.insert((
                row.product_name.clone(),
                row.date.clone(),
                row.region.clone(),
                row.data_type,
            ))
        })
        .collect();
    kept.reverse();
    kept
}

fn build_upsert(rows: &[ProcessedRow]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(UPSERT_PREFIX);
    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.product_name)
            .push_bind(&row.date)
            .push_unseparated("::date")
            .push_bind(&row.region)
            .push_bind(&row.brand)
            .push_bind(&row.category)
            .push_bind(row.sales_quantity)
            .push_bind(row.price)
            .push_bind(row.original_price)
            .push_bind(row.discount_percentage)
            .push_bind(row.stock_level)
            .push_bind(row.customer_rating)
            .push_bind(row.review_count)
            .push_bind(row.delivery_days)
            .push_bind(&row.seller)
            .push_bind(row.is_weekend)
            .push_bind(row.is_holiday)
            .push_bind(row.day_of_week)
            .push_bind(row.month)
            .push_bind(row.quarter)
            .push_bind(row.sales_quantity_lag_1)
            .push_bind(row.sales_quantity_lag_3)
            .push_bind(row.sales_quantity_lag_7)
            .push_bind(row.price_lag_1)
            .push_bind(row.price_lag_3)
            .push_bind(row.price_lag_7)
            .push_bind(row.sales_quantity_rolling_mean_3)
            .push_bind(row.sales_quantity_rolling_mean_7)
            .push_bind(row.price_rolling_mean_3)
            .push_bind(row.price_rolling_mean_7)
            .push_bind(row.price_target)
            .push_bind(row.sales_target)
            .push_bind(row.data_type.as_str());
    });
    builder.push(UPSERT_CONFLICT);
    builder
}
