//! Records flowing through the pipeline

use serde_json::{Map, Value};
use std::fmt;

/// One marketplace record as delivered on the queue. The pipeline never
/// interprets its fields.
pub type RawRecord = Map<String, Value>;

/// Records of one tick, in delivery order
pub type RawBatch = Vec<RawRecord>;

/// Which processed artifact a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Train,
    Test,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Train => "train",
            DataType::Test => "test",
        }
    }

    /// File name the feature-engineering program writes for this split
    pub fn artifact_file_name(&self) -> &'static str {
        match self {
            DataType::Train => "train_data.csv",
            DataType::Test => "test_data.csv",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column order of `processed_data`, matching the upsert's `$1..$32`
pub const PROCESSED_COLUMNS: [&str; 32] = [
    "product_name",
    "date",
    "region",
    "brand",
    "category",
    "sales_quantity",
    "price",
    "original_price",
    "discount_percentage",
    "stock_level",
    "customer_rating",
    "review_count",
    "delivery_days",
    "seller",
    "is_weekend",
    "is_holiday",
    "day_of_week",
    "month",
    "quarter",
    "sales_quantity_lag_1",
    "sales_quantity_lag_3",
    "sales_quantity_lag_7",
    "price_lag_1",
    "price_lag_3",
    "price_lag_7",
    "sales_quantity_rolling_mean_3",
    "sales_quantity_rolling_mean_7",
    "price_rolling_mean_3",
    "price_rolling_mean_7",
    "price_target",
    "sales_target",
    "data_type",
];

/// Lag and rolling-mean columns: optional in the CSV, NULL when absent or invalid
pub const NULLABLE_DECIMAL_COLUMNS: [&str; 10] = [
    "sales_quantity_lag_1",
    "sales_quantity_lag_3",
    "sales_quantity_lag_7",
    "price_lag_1",
    "price_lag_3",
    "price_lag_7",
    "sales_quantity_rolling_mean_3",
    "sales_quantity_rolling_mean_7",
    "price_rolling_mean_3",
    "price_rolling_mean_7",
];

/// Columns every processed artifact must carry
pub fn mandatory_columns() -> impl Iterator<Item = &'static str> {
    PROCESSED_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "data_type" && !NULLABLE_DECIMAL_COLUMNS.contains(c))
}

/// One coerced row of `processed_data`
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRow {
    pub product_name: String,
    /// Passed through verbatim; PostgreSQL casts it to DATE
    pub date: String,
    pub region: String,
    pub brand: String,
    pub category: String,
    pub sales_quantity: f64,
    pub price: f64,
    pub original_price: f64,
    pub discount_percentage: f64,
    pub stock_level: f64,
    pub customer_rating: f64,
    pub review_count: f64,
    pub delivery_days: f64,
    pub seller: String,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub day_of_week: i32,
    pub month: i32,
    pub quarter: i32,
    pub sales_quantity_lag_1: Option<f64>,
    pub sales_quantity_lag_3: Option<f64>,
    pub sales_quantity_lag_7: Option<f64>,
    pub price_lag_1: Option<f64>,
    pub price_lag_3: Option<f64>,
    pub price_lag_7: Option<f64>,
    pub sales_quantity_rolling_mean_3: Option<f64>,
    pub sales_quantity_rolling_mean_7: Option<f64>,
    pub price_rolling_mean_3: Option<f64>,
    pub price_rolling_mean_7: Option<f64>,
    pub price_target: f64,
    pub sales_target: f64,
    pub data_type: DataType,
}
