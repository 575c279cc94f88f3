//! Renderer-agnostic chart specifications.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// `x` categories, `y` bar heights.
    Bar,
    /// `x` slice names, `y` slice values.
    Pie,
    /// `x` buckets, `y` summed per bucket.
    Histogram,
    /// Plain table of every row.
    Table,
}

/// "Render this table as a chart of kind K."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// One JSON object per row, keyed by column name.
    pub rows: Vec<Value>,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>, kind: ChartKind, data: &DataFrame) -> PolarsResult<Self> {
        Ok(Self {
            title: title.into(),
            kind,
            x: None,
            y: None,
            rows: frame_to_rows(data)?,
        })
    }

    pub fn with_axes(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x = Some(x.into());
        self.y = Some(y.into());
        self
    }
}

/// Convert a table into JSON row objects.
pub fn frame_to_rows(df: &DataFrame) -> PolarsResult<Vec<Value>> {
    let columns = df.get_columns();
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Map::with_capacity(columns.len());
        for column in columns {
            row.insert(column.name().to_string(), any_value_to_json(&column.get(i)?));
        }
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

fn any_value_to_json(value: &AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => json!(b),
        AnyValue::String(s) => json!(s),
        AnyValue::StringOwned(s) => json!(s.as_str()),
        AnyValue::Int8(v) => json!(v),
        AnyValue::Int16(v) => json!(v),
        AnyValue::Int32(v) => json!(v),
        AnyValue::Int64(v) => json!(v),
        AnyValue::UInt8(v) => json!(v),
        AnyValue::UInt16(v) => json!(v),
        AnyValue::UInt32(v) => json!(v),
        AnyValue::UInt64(v) => json!(v),
        // NaN and infinities have no JSON form and become null
        AnyValue::Float32(v) => json!(v),
        AnyValue::Float64(v) => json!(v),
        other => json!(other.to_string()),
    }
}
