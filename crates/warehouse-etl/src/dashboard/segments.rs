//! Revenue tiers and high-value order detection.

use crate::error::{EtlError, Result};
use crate::quality::stats::percentile;
use crate::utils::{column_as_f64, resolve_column};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column holding the order value.
pub const ORDER_AMOUNT_COLUMN: &str = "ORDER_AMOUNT";
/// Column added by [`with_segments`].
pub const SEGMENT_COLUMN: &str = "SEGMENT";

/// Percentile above which an order counts as high-value.
pub const HIGH_VALUE_PERCENTILE: f64 = 0.9;

/// Revenue tier of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    Low,
    Medium,
    High,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Low, Segment::Medium, Segment::High];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Assign each value to an equal-frequency tier.
///
/// Tier edges are the 1/3 and 2/3 quantiles (linear interpolation); bins are
/// right-inclusive, so a value equal to an edge falls in the lower tier.
/// Missing and NaN values get no tier.
pub fn revenue_segments(values: &[Option<f64>]) -> Vec<Option<Segment>> {
    let present: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    let (Some(low_edge), Some(high_edge)) = (
        percentile(&present, 1.0 / 3.0),
        percentile(&present, 2.0 / 3.0),
    ) else {
        return vec![None; values.len()];
    };

    values
        .iter()
        .map(|value| match value {
            Some(v) if v.is_nan() => None,
            Some(v) if *v <= low_edge => Some(Segment::Low),
            Some(v) if *v <= high_edge => Some(Segment::Medium),
            Some(_) => Some(Segment::High),
            None => None,
        })
        .collect()
}

/// Add a [`SEGMENT_COLUMN`] to `customers` computed from `revenue_column`.
pub fn with_segments(customers: &DataFrame, revenue_column: &str) -> Result<DataFrame> {
    let revenue = column_as_f64(customers, revenue_column)?;
    let labels: Vec<Option<&str>> = revenue_segments(&revenue)
        .into_iter()
        .map(|s| s.map(|s| s.label()))
        .collect();

    let mut out = customers.clone();
    out.with_column(Series::new(SEGMENT_COLUMN.into(), labels))?;
    Ok(out)
}

/// Total revenue per tier, in tier order. Tiers with no customers are kept
/// with a zero total.
pub fn segment_totals(values: &[Option<f64>]) -> Vec<(Segment, f64)> {
    let segments = revenue_segments(values);
    Segment::ALL
        .iter()
        .map(|tier| {
            let total = values
                .iter()
                .zip(&segments)
                .filter(|(_, s)| s.as_ref() == Some(tier))
                .filter_map(|(v, _)| *v)
                .sum();
            (*tier, total)
        })
        .collect()
}

/// Orders whose value is strictly above the 90th percentile of all order
/// values.
///
/// The value is read from `ORDER_AMOUNT` when present; otherwise it is
/// derived as `quantity * price` and added as an `ORDER_AMOUNT` column.
pub fn high_value_orders(orders: &DataFrame, table: &str) -> Result<DataFrame> {
    let (orders, amount_column) = with_order_amount(orders, table)?;
    let amounts = column_as_f64(&orders, &amount_column)?;

    let present: Vec<f64> = amounts
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    let Some(threshold) = percentile(&present, HIGH_VALUE_PERCENTILE) else {
        return Ok(orders.clear());
    };

    let mask: BooleanChunked = amounts
        .iter()
        .map(|v| Some(matches!(v, Some(v) if *v > threshold)))
        .collect();
    Ok(orders.filter(&mask)?)
}

fn with_order_amount(orders: &DataFrame, table: &str) -> Result<(DataFrame, String)> {
    if let Some(column) = resolve_column(orders, ORDER_AMOUNT_COLUMN) {
        return Ok((orders.clone(), column));
    }

    match (
        resolve_column(orders, "quantity"),
        resolve_column(orders, "price"),
    ) {
        (Some(quantity), Some(price)) => {
            let amount = orders
                .clone()
                .lazy()
                .with_column(
                    (col(quantity.as_str()).cast(DataType::Float64)
                        * col(price.as_str()).cast(DataType::Float64))
                    .alias(ORDER_AMOUNT_COLUMN),
                )
                .collect()?;
            Ok((amount, ORDER_AMOUNT_COLUMN.to_string()))
        }
        _ => Err(EtlError::schema_mismatch(table, ORDER_AMOUNT_COLUMN)),
    }
}
