//! Shared helpers for column lookup and value rendering.

use crate::error::{EtlError, Result};
use polars::prelude::*;

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Find a column by name, preferring an exact match over a case-insensitive one.
///
/// Warehouse identifiers are case-insensitive (`FIRST_NAME` and `first_name`
/// are the same column), while DataFrame columns are not.
pub fn resolve_column(df: &DataFrame, name: &str) -> Option<String> {
    let names = df.get_column_names();
    if names.iter().any(|c| c.as_str() == name) {
        return Some(name.to_string());
    }
    names
        .iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
        .map(|c| c.to_string())
}

/// Like [`resolve_column`], but a missing column is a schema mismatch.
pub fn require_column(df: &DataFrame, table: &str, name: &str) -> Result<String> {
    resolve_column(df, name).ok_or_else(|| EtlError::schema_mismatch(table, name))
}

/// Render a cell for humans: strings without quotes, nulls as `null`.
pub fn format_any_value(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => "null".to_string(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Float64(v) => format_number(*v),
        AnyValue::Float32(v) => format_number(*v as f64),
        other => format!("{}", other),
    }
}

/// Integral floats print without a fractional part (`10000`, not `10000.0`).
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Read every cell of a column as `f64`, keeping nulls.
pub fn column_as_f64(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = df.column(column)?.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Read every cell of a column as `i64`; cells that do not convert become null.
pub fn column_as_i64(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<i64>>> {
    let series = df.column(column)?.as_materialized_series().cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Render every cell of a column with [`format_any_value`].
pub fn column_labels(df: &DataFrame, column: &str) -> PolarsResult<Vec<String>> {
    Ok(column_keys(df, column)?
        .into_iter()
        .map(|key| key.unwrap_or_else(|| "null".to_string()))
        .collect())
}

/// Render every non-null cell of a column as a comparable key.
///
/// Keys compare by rendered value, so `1` (integer) and `1.0` (float) are the
/// same key while `1.5` and `"C1"` keep their identity.
pub fn column_keys(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    let col = df.column(column)?;
    (0..col.len())
        .map(|i| {
            col.get(i).map(|v| match v {
                AnyValue::Null => None,
                other => Some(format_any_value(&other)),
            })
        })
        .collect()
}
