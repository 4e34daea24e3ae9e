//! Header mapping and per-cell coercion for processed artifacts

use crate::error::{AppError, Result};
use crate::models::{mandatory_columns, DataType, ProcessedRow};
use csv::StringRecord;
use std::collections::HashMap;

/// Sentinels the feature-engineering program emits for missing numerics
const MISSING_SENTINELS: [&str; 4] = ["", "NaN", "nan", "None"];

/// Column name to position map built from a CSV header row
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Fails when a mandatory column is absent
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        let missing: Vec<&str> = mandatory_columns()
            .filter(|c| !positions.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Load(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self { positions })
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    fn cell<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.positions
            .get(column)
            .and_then(|&i| record.get(i))
    }

    fn text(&self, record: &StringRecord, column: &str) -> String {
        self.cell(record, column).unwrap_or_default().to_string()
    }

    fn decimal(&self, record: &StringRecord, column: &str) -> f64 {
        parse_required_decimal(self.cell(record, column).unwrap_or_default())
    }

    fn nullable(&self, record: &StringRecord, column: &str) -> Option<f64> {
        self.cell(record, column).and_then(parse_nullable_decimal)
    }

    fn int(&self, record: &StringRecord, column: &str) -> i32 {
        parse_int(self.cell(record, column).unwrap_or_default())
    }

    fn flag(&self, record: &StringRecord, column: &str) -> bool {
        parse_bool(self.cell(record, column).unwrap_or_default())
    }

    /// Coerce one data row
    pub fn parse_row(&self, record: &StringRecord, data_type: DataType) -> ProcessedRow {
        ProcessedRow {
            product_name: self.text(record, "product_name"),
            date: self.text(record, "date"),
            region: self.text(record, "region"),
            brand: self.text(record, "brand"),
            category: self.text(record, "category"),
            sales_quantity: self.decimal(record, "sales_quantity"),
            price: self.decimal(record, "price"),
            original_price: self.decimal(record, "original_price"),
            discount_percentage: self.decimal(record, "discount_percentage"),
            stock_level: self.decimal(record, "stock_level"),
            customer_rating: self.decimal(record, "customer_rating"),
            review_count: self.decimal(record, "review_count"),
            delivery_days: self.decimal(record, "delivery_days"),
            seller: self.text(record, "seller"),
            is_weekend: self.flag(record, "is_weekend"),
            is_holiday: self.flag(record, "is_holiday"),
            day_of_week: self.int(record, "day_of_week"),
            month: self.int(record, "month"),
            quarter: self.int(record, "quarter"),
            sales_quantity_lag_1: self.nullable(record, "sales_quantity_lag_1"),
            sales_quantity_lag_3: self.nullable(record, "sales_quantity_lag_3"),
            sales_quantity_lag_7: self.nullable(record, "sales_quantity_lag_7"),
            price_lag_1: self.nullable(record, "price_lag_1"),
            price_lag_3: self.nullable(record, "price_lag_3"),
            price_lag_7: self.nullable(record, "price_lag_7"),
            sales_quantity_rolling_mean_3: self.nullable(record, "sales_quantity_rolling_mean_3"),
            sales_quantity_rolling_mean_7: self.nullable(record, "sales_quantity_rolling_mean_7"),
            price_rolling_mean_3: self.nullable(record, "price_rolling_mean_3"),
            price_rolling_mean_7: self.nullable(record, "price_rolling_mean_7"),
            price_target: self.decimal(record, "price_target"),
            sales_target: self.decimal(record, "sales_target"),
            data_type,
        }
    }
}

/// Missing, sentinel or unparsable values become `0.0`
pub fn parse_required_decimal(raw: &str) -> f64 {
    parse_nullable_decimal(raw).unwrap_or(0.0)
}

/// Missing, sentinel or unparsable values become `None`
pub fn parse_nullable_decimal(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if MISSING_SENTINELS.contains(&value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Empty or unparsable values become `0`
pub fn parse_int(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(0)
}

/// Only the literal `True` is true
pub fn parse_bool(raw: &str) -> bool {
    raw.trim() == "True"
}
