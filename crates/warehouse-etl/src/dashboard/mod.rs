//! Sales analytics dashboard.
//!
//! Read-only: queries curated tables, prepares them for display, and emits a
//! [`DashboardDocument`] of chart specifications. Drawing the charts is left
//! to whatever consumes the document.
//!
//! Sections:
//! - **Sales Overview**: top customers (bar) and revenue by category (pie)
//! - **Customer Segmentation**: customers binned into Low/Medium/High revenue
//!   tiers (histogram)
//! - **Anomalies Flagged**: orders above the 90th percentile in value (table)

mod charts;
pub mod segments;

pub use charts::{ChartKind, ChartSpec, frame_to_rows};
pub use segments::{Segment, high_value_orders, revenue_segments, segment_totals, with_segments};

use crate::error::{Result, ResultExt};
use crate::utils::{column_as_f64, format_number, require_column};
use crate::warehouse::Warehouse;
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const TOP_CUSTOMERS_TABLE: &str = "TOP_CUSTOMERS";
pub const PRODUCT_CATEGORY_SALES_TABLE: &str = "PRODUCT_CATEGORY_SALES";
pub const FACT_ORDERS_CLEAN_TABLE: &str = "FACT_ORDERS_CLEAN";

pub const TOP_CUSTOMERS_QUERY: &str = "SELECT * FROM TOP_CUSTOMERS";
pub const CATEGORY_SALES_QUERY: &str = "SELECT * FROM PRODUCT_CATEGORY_SALES";
pub const CLEAN_ORDERS_QUERY: &str = "SELECT * FROM FACT_ORDERS_CLEAN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSection {
    pub header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardDocument {
    pub title: String,
    pub generated_at: String,
    pub sections: Vec<DashboardSection>,
}

impl DashboardDocument {
    /// Query the warehouse and build every section.
    ///
    /// # Errors
    ///
    /// [`EtlError::SourceUnavailable`](crate::error::EtlError::SourceUnavailable)
    /// if a curated table cannot be read,
    /// [`EtlError::SchemaMismatch`](crate::error::EtlError::SchemaMismatch) if
    /// it lacks a charted column.
    pub fn build(warehouse: &dyn Warehouse) -> Result<Self> {
        let top_customers = warehouse
            .query(TOP_CUSTOMERS_QUERY)
            .context("Loading top customers")?;
        let category_sales = warehouse
            .query(CATEGORY_SALES_QUERY)
            .context("Loading category sales")?;
        let clean_orders = warehouse
            .query(CLEAN_ORDERS_QUERY)
            .context("Loading clean orders")?;

        let customer_id = require_column(&top_customers, TOP_CUSTOMERS_TABLE, "CUSTOMER_ID")?;
        let revenue = require_column(&top_customers, TOP_CUSTOMERS_TABLE, "TOTAL_REVENUE")?;
        let top_customers = revenue_as_float(top_customers, &revenue)?;

        let category =
            require_column(&category_sales, PRODUCT_CATEGORY_SALES_TABLE, "CATEGORY")?;
        let category_revenue = require_column(
            &category_sales,
            PRODUCT_CATEGORY_SALES_TABLE,
            "CATEGORY_REVENUE",
        )?;

        let segmented = with_segments(&top_customers, &revenue)?;
        let tier_totals = segment_totals(&column_as_f64(&top_customers, &revenue)?);
        let anomalies = high_value_orders(&clean_orders, FACT_ORDERS_CLEAN_TABLE)?;
        info!(
            "Dashboard data: {} customer(s), {} categor(ies), {} flagged order(s)",
            top_customers.height(),
            category_sales.height(),
            anomalies.height()
        );

        let sections = vec![
            DashboardSection {
                header: "Sales Overview".to_string(),
                description: None,
                charts: vec![
                    ChartSpec::new("Top 10 Customers", ChartKind::Bar, &top_customers)?
                        .with_axes(&customer_id, &revenue),
                    ChartSpec::new("Revenue by Product Category", ChartKind::Pie, &category_sales)?
                        .with_axes(&category, &category_revenue),
                ],
            },
            DashboardSection {
                header: "Customer Segmentation".to_string(),
                description: Some(tier_summary(&tier_totals)),
                charts: vec![
                    ChartSpec::new(
                        "Customer Revenue Segmentation",
                        ChartKind::Histogram,
                        &segmented,
                    )?
                    .with_axes(segments::SEGMENT_COLUMN, &revenue),
                ],
            },
            DashboardSection {
                header: "Anomalies Flagged".to_string(),
                description: Some("Orders above the 90th percentile in value".to_string()),
                charts: vec![ChartSpec::new("Anomalies Flagged", ChartKind::Table, &anomalies)?],
            },
        ];

        Ok(Self {
            title: "Sales Analytics Dashboard".to_string(),
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            sections,
        })
    }

    pub fn charts(&self) -> impl Iterator<Item = &ChartSpec> {
        self.sections.iter().flat_map(|s| s.charts.iter())
    }

    /// Write the document as pretty JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Dashboard saved: {}", path.display());
        Ok(())
    }
}

/// e.g. "Revenue per tier: Low 100, Medium 200, High 300.5"
fn tier_summary(totals: &[(Segment, f64)]) -> String {
    let tiers: Vec<String> = totals
        .iter()
        .map(|(tier, total)| format!("{} {}", tier, format_number(*total)))
        .collect();
    format!("Revenue per tier: {}", tiers.join(", "))
}

/// Revenue may arrive as a decimal or string; charts and tiers need floats.
fn revenue_as_float(mut df: DataFrame, column: &str) -> Result<DataFrame> {
    let revenue = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    df.replace(column, revenue)?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;

    fn warehouse() -> MemoryWarehouse {
        MemoryWarehouse::new()
            .with_table(
                "top_customers",
                df![
                    "CUSTOMER_ID" => [1i64, 2, 3],
                    "TOTAL_REVENUE" => ["300.5", "100", "200"],
                ]
                .unwrap(),
            )
            .with_table(
                "product_category_sales",
                df![
                    "CATEGORY" => ["Books", "Games"],
                    "CATEGORY_REVENUE" => [400.0, 200.5],
                ]
                .unwrap(),
            )
            .with_table(
                "fact_orders_clean",
                df![
                    "order_id" => (1..=10).collect::<Vec<i64>>(),
                    "quantity" => [1i64; 10],
                    "price" => (1..=10).map(|v| v as f64 * 10.0).collect::<Vec<f64>>(),
                ]
                .unwrap(),
            )
    }

    #[test]
    fn test_build_dashboard() {
        let doc = DashboardDocument::build(&warehouse()).unwrap();
        assert_eq!(doc.sections.len(), 3);

        let kinds: Vec<ChartKind> = doc.charts().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChartKind::Bar, ChartKind::Pie, ChartKind::Histogram, ChartKind::Table]
        );

        let bar = &doc.sections[0].charts[0];
        assert_eq!(bar.rows[0]["TOTAL_REVENUE"], 300.5);

        let histogram = &doc.sections[1].charts[0];
        assert_eq!(histogram.rows[0]["SEGMENT"], "High");
        assert_eq!(histogram.rows[1]["SEGMENT"], "Low");
        assert_eq!(
            doc.sections[1].description.as_deref(),
            Some("Revenue per tier: Low 100, Medium 200, High 300.5")
        );

        let table = &doc.sections[2].charts[0];
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["order_id"], 10);
    }

    #[test]
    fn test_missing_curated_table() {
        let wh = MemoryWarehouse::new();
        let err = DashboardDocument::build(&wh).unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn test_missing_chart_column() {
        let wh = warehouse().with_table(
            "top_customers",
            df!["CUSTOMER_ID" => [1i64]].unwrap(),
        );
        let err = DashboardDocument::build(&wh).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }
}
