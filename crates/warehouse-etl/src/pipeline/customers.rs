//! The customer pipeline: extract raw customers, derive `full_name`, load the
//! result into the analytics schema.

use super::builder::Pipeline;
use super::progress::RunStage;
use super::step::PipelineStep;
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::utils::require_column;
use crate::warehouse::{Warehouse, WriteMode, select_all};
use polars::prelude::*;
use tracing::info;

/// Name of the derived column.
pub const FULL_NAME_COLUMN: &str = "full_name";

/// Add `full_name = first_name || ' ' || last_name`.
///
/// Name columns are matched case-insensitively, so upper-case warehouse
/// exports (`FIRST_NAME`) work too. A null in either part gives a null name.
pub fn transform_customers(df: DataFrame, table: &str) -> Result<DataFrame> {
    let first = require_column(&df, table, "first_name")?;
    let last = require_column(&df, table, "last_name")?;

    let out = df
        .lazy()
        .with_column(
            concat_str([col(first.as_str()), lit(" "), col(last.as_str())], "", false)
                .alias(FULL_NAME_COLUMN),
        )
        .collect()?;
    Ok(out)
}

/// Reads the raw customer table.
pub struct ExtractCustomers<'a> {
    source: &'a dyn Warehouse,
    table: String,
}

impl<'a> ExtractCustomers<'a> {
    pub fn new(source: &'a dyn Warehouse, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
        }
    }
}

impl PipelineStep for ExtractCustomers<'_> {
    fn name(&self) -> &str {
        "extract_customers"
    }

    fn stage(&self) -> RunStage {
        RunStage::Reading
    }

    fn run(&self, _input: DataFrame) -> Result<DataFrame> {
        let df = select_all(self.source, &self.table)?;
        info!("Extracted {} customer(s) from {}", df.height(), self.table);
        Ok(df)
    }
}

/// Derives `full_name`.
pub struct TransformCustomers {
    table: String,
}

impl TransformCustomers {
    /// `table` names the source in schema errors.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl PipelineStep for TransformCustomers {
    fn name(&self) -> &str {
        "transform_customers"
    }

    fn run(&self, input: DataFrame) -> Result<DataFrame> {
        let df = transform_customers(input, &self.table)?;
        info!("Transformed {} customer(s)", df.height());
        Ok(df)
    }
}

/// Overwrites the target table and logs a preview.
pub struct LoadCustomers<'a> {
    target: &'a dyn Warehouse,
    table: String,
    preview_rows: usize,
}

impl<'a> LoadCustomers<'a> {
    pub fn new(target: &'a dyn Warehouse, table: impl Into<String>, preview_rows: usize) -> Self {
        Self {
            target,
            table: table.into(),
            preview_rows,
        }
    }
}

impl PipelineStep for LoadCustomers<'_> {
    fn name(&self) -> &str {
        "load_customers"
    }

    fn stage(&self) -> RunStage {
        RunStage::Writing
    }

    fn run(&self, input: DataFrame) -> Result<DataFrame> {
        if input.width() == 0 {
            return Err(EtlError::write_failure(&self.table, "nothing to load"));
        }
        self.target.write(&input, &self.table, WriteMode::Overwrite)?;
        info!(
            "Loaded {} customer(s) into {}:\n{}",
            input.height(),
            self.table,
            input.head(Some(self.preview_rows))
        );
        Ok(input)
    }
}

/// Extract from `raw`, transform, load into `analytics`.
pub fn customer_pipeline<'a>(
    raw: &'a dyn Warehouse,
    analytics: &'a dyn Warehouse,
    config: &PipelineConfig,
) -> Result<Pipeline<'a>> {
    Pipeline::builder("customer_pipeline")
        .step(ExtractCustomers::new(raw, config.source_table.clone()))
        .step(TransformCustomers::new(config.source_table.clone()))
        .step(LoadCustomers::new(
            analytics,
            config.target_table.clone(),
            config.preview_rows,
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use pretty_assertions::assert_eq;

    fn raw_customers() -> DataFrame {
        df![
            "customer_id" => [1i64, 2, 3],
            "first_name" => ["Alice", "Bob", "Charlie"],
            "last_name" => ["Smith", "Jones", "Brown"],
        ]
        .unwrap()
    }

    fn full_names(df: &DataFrame) -> Vec<Option<String>> {
        df.column(FULL_NAME_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_transform_adds_full_name() {
        let out = transform_customers(raw_customers(), "raw_customers").unwrap();
        assert_eq!(out.width(), 4);
        assert_eq!(
            full_names(&out),
            vec![
                Some("Alice Smith".to_string()),
                Some("Bob Jones".to_string()),
                Some("Charlie Brown".to_string()),
            ]
        );
    }

    #[test]
    fn test_transform_uppercase_columns_and_nulls() {
        let df = df![
            "FIRST_NAME" => [Some("Ada"), None],
            "LAST_NAME" => [Some("Lovelace"), Some("Hopper")],
        ]
        .unwrap();

        let out = transform_customers(df, "raw_customers").unwrap();
        assert_eq!(full_names(&out), vec![Some("Ada Lovelace".to_string()), None]);
    }

    #[test]
    fn test_transform_missing_column() {
        let df = df!["first_name" => ["Ada"]].unwrap();
        let err = transform_customers(df, "raw_customers").unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("last_name"));
    }

    #[test]
    fn test_customer_pipeline_end_to_end() {
        let raw = MemoryWarehouse::new().with_table("raw_customers", raw_customers());
        let analytics = MemoryWarehouse::new();

        let pipeline = customer_pipeline(&raw, &analytics, &PipelineConfig::default()).unwrap();
        assert_eq!(
            pipeline.step_names(),
            vec!["extract_customers", "transform_customers", "load_customers"]
        );

        let run = pipeline.run().unwrap();
        let loaded = analytics.table("customers_transformed").unwrap();
        assert_eq!(loaded.height(), 3);
        assert_eq!(full_names(&loaded), full_names(&run.output));
        assert_eq!(analytics.writes()[0].mode, WriteMode::Overwrite);
    }

    #[test]
    fn test_customer_pipeline_missing_source() {
        let raw = MemoryWarehouse::new();
        let analytics = MemoryWarehouse::new();

        let err = customer_pipeline(&raw, &analytics, &PipelineConfig::default())
            .unwrap()
            .run()
            .unwrap_err();

        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
        assert!(analytics.writes().is_empty());
    }
}
