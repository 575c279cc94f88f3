//! Configuration types for the quality pass, the customer pipeline and the
//! warehouse connection.
//!
//! Connection parameters are read from the environment at runtime. Nothing
//! secret is ever compiled into the binary.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable holding the warehouse root directory.
pub const WAREHOUSE_DIR_ENV: &str = "WAREHOUSE_DIR";
/// Environment variable holding the default schema.
pub const WAREHOUSE_SCHEMA_ENV: &str = "WAREHOUSE_SCHEMA";

/// A foreign key in the fact table checked against a reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCheck {
    /// Foreign key column in the fact table.
    pub column: String,
    /// Reference (dimension) table holding the valid keys.
    pub reference_table: String,
    /// Primary key column of the reference table.
    pub reference_column: String,
    /// Remediation hint appended to every issue raised by this check.
    pub suggestion: String,
}

impl ReferenceCheck {
    pub fn new(
        column: impl Into<String>,
        reference_table: impl Into<String>,
        reference_column: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            reference_table: reference_table.into(),
            reference_column: reference_column.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Orders must point at a known customer.
    pub fn customers() -> Self {
        Self::new(
            "customer_id",
            "dim_customers",
            "customer_id",
            "Check customer table or assign to 'Unknown Customer'.",
        )
    }

    /// Orders must point at a known product.
    pub fn products() -> Self {
        Self::new(
            "product_id",
            "dim_products",
            "product_id",
            "Validate product mapping or assign to 'Unknown Product'.",
        )
    }
}

/// Configuration for the order quality pass.
///
/// Use [`QualityConfig::builder()`] to create a configuration with a fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use warehouse_etl::config::QualityConfig;
///
/// let config = QualityConfig::builder()
///     .numeric_columns(["quantity", "price", "discount"])
///     .z_threshold(3.5)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Fact table to scan.
    /// Default: "fact_orders"
    pub fact_table: String,

    /// Identifying column cited in every issue.
    /// Default: "order_id"
    pub key_column: String,

    /// Numeric measures scanned for anomalies. Absent columns are skipped.
    /// Default: ["quantity", "price"]
    pub numeric_columns: Vec<String>,

    /// A value is anomalous when `|value - mean| / std` exceeds this.
    /// Default: 3.0
    pub z_threshold: f64,

    /// Columns with fewer non-null values than this are not scanned.
    /// Default: 3
    pub min_sample_size: usize,

    /// Value written over a dangling foreign key.
    /// Default: -1
    pub sentinel: i64,

    /// Foreign keys checked for referential integrity.
    /// Default: customers and products
    pub reference_checks: Vec<ReferenceCheck>,

    /// Destination of the corrected fact table (always overwritten).
    /// Default: "fact_orders_clean"
    pub clean_table: String,

    /// Destination of the issue history (appended to).
    /// Default: "data_quality_issues"
    pub issue_table: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            fact_table: "fact_orders".to_string(),
            key_column: "order_id".to_string(),
            numeric_columns: vec!["quantity".to_string(), "price".to_string()],
            z_threshold: 3.0,
            min_sample_size: 3,
            sentinel: -1,
            reference_checks: vec![ReferenceCheck::customers(), ReferenceCheck::products()],
            clean_table: "fact_orders_clean".to_string(),
            issue_table: "data_quality_issues".to_string(),
        }
    }
}

impl QualityConfig {
    /// Create a new configuration builder.
    pub fn builder() -> QualityConfigBuilder {
        QualityConfigBuilder::default()
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigValidationError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: QualityConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigValidationError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.z_threshold.is_finite() || self.z_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold(self.z_threshold));
        }

        if self.min_sample_size < 2 {
            return Err(ConfigValidationError::InvalidSampleSize(self.min_sample_size));
        }

        for (field, value) in [
            ("fact_table", &self.fact_table),
            ("key_column", &self.key_column),
            ("clean_table", &self.clean_table),
            ("issue_table", &self.issue_table),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyName(field.to_string()));
            }
        }

        if self.numeric_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigValidationError::EmptyName("numeric_columns".to_string()));
        }

        for check in &self.reference_checks {
            if check.column.trim().is_empty()
                || check.reference_table.trim().is_empty()
                || check.reference_column.trim().is_empty()
            {
                return Err(ConfigValidationError::EmptyName(
                    "reference_checks".to_string(),
                ));
            }
        }

        let outputs = [&self.clean_table, &self.issue_table];
        let mut inputs = vec![&self.fact_table];
        inputs.extend(self.reference_checks.iter().map(|c| &c.reference_table));
        for output in outputs {
            if inputs.iter().any(|input| input.eq_ignore_ascii_case(output)) {
                return Err(ConfigValidationError::OutputOverwritesInput(output.clone()));
            }
        }
        if self.clean_table.eq_ignore_ascii_case(&self.issue_table) {
            return Err(ConfigValidationError::OutputOverwritesInput(
                self.issue_table.clone(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid z-score threshold: {0} (must be a positive number)")]
    InvalidThreshold(f64),

    #[error("Invalid minimum sample size: {0} (must be at least 2)")]
    InvalidSampleSize(usize),

    #[error("'{0}' must not be empty")]
    EmptyName(String),

    #[error("Output table '{0}' would overwrite an input or another output")]
    OutputOverwritesInput(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Cannot read configuration from {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

impl From<ConfigValidationError> for crate::error::EtlError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::EtlError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`QualityConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct QualityConfigBuilder {
    fact_table: Option<String>,
    key_column: Option<String>,
    numeric_columns: Option<Vec<String>>,
    z_threshold: Option<f64>,
    min_sample_size: Option<usize>,
    sentinel: Option<i64>,
    reference_checks: Option<Vec<ReferenceCheck>>,
    clean_table: Option<String>,
    issue_table: Option<String>,
}

impl QualityConfigBuilder {
    /// Set the fact table to scan.
    pub fn fact_table(mut self, table: impl Into<String>) -> Self {
        self.fact_table = Some(table.into());
        self
    }

    /// Set the identifying column cited in issues.
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// Set the numeric measures scanned for anomalies.
    pub fn numeric_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set the z-score threshold.
    pub fn z_threshold(mut self, threshold: f64) -> Self {
        self.z_threshold = Some(threshold);
        self
    }

    /// Set the minimum number of non-null values a column needs to be scanned.
    pub fn min_sample_size(mut self, size: usize) -> Self {
        self.min_sample_size = Some(size);
        self
    }

    /// Set the sentinel written over dangling foreign keys.
    pub fn sentinel(mut self, sentinel: i64) -> Self {
        self.sentinel = Some(sentinel);
        self
    }

    /// Replace the referential integrity checks.
    pub fn reference_checks(mut self, checks: Vec<ReferenceCheck>) -> Self {
        self.reference_checks = Some(checks);
        self
    }

    /// Set the destination of the corrected fact table.
    pub fn clean_table(mut self, table: impl Into<String>) -> Self {
        self.clean_table = Some(table.into());
        self
    }

    /// Set the destination of the issue history.
    pub fn issue_table(mut self, table: impl Into<String>) -> Self {
        self.issue_table = Some(table.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `QualityConfig` or an error if validation fails.
    pub fn build(self) -> Result<QualityConfig, ConfigValidationError> {
        let defaults = QualityConfig::default();
        let config = QualityConfig {
            fact_table: self.fact_table.unwrap_or(defaults.fact_table),
            key_column: self.key_column.unwrap_or(defaults.key_column),
            numeric_columns: self.numeric_columns.unwrap_or(defaults.numeric_columns),
            z_threshold: self.z_threshold.unwrap_or(defaults.z_threshold),
            min_sample_size: self.min_sample_size.unwrap_or(defaults.min_sample_size),
            sentinel: self.sentinel.unwrap_or(defaults.sentinel),
            reference_checks: self.reference_checks.unwrap_or(defaults.reference_checks),
            clean_table: self.clean_table.unwrap_or(defaults.clean_table),
            issue_table: self.issue_table.unwrap_or(defaults.issue_table),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Where and how to reach the warehouse.
///
/// Tables live under `<root_dir>/<schema>/<table>.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub root_dir: PathBuf,
    pub schema: String,
}

impl WarehouseConfig {
    pub fn new(root_dir: impl Into<PathBuf>, schema: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            schema: schema.into(),
        }
    }

    /// Read the connection from `WAREHOUSE_DIR` and `WAREHOUSE_SCHEMA`.
    ///
    /// The schema defaults to `ANALYTICS` when unset.
    pub fn from_env() -> Result<Self, ConfigValidationError> {
        let root_dir = env::var(WAREHOUSE_DIR_ENV)
            .map_err(|_| ConfigValidationError::MissingEnv(WAREHOUSE_DIR_ENV.to_string()))?;
        let schema = env::var(WAREHOUSE_SCHEMA_ENV).unwrap_or_else(|_| "ANALYTICS".to_string());
        Ok(Self::new(root_dir, schema))
    }

    /// Same warehouse, different schema.
    pub fn with_schema(&self, schema: impl Into<String>) -> Self {
        Self {
            root_dir: self.root_dir.clone(),
            schema: schema.into(),
        }
    }

    /// Directory holding the tables of the configured schema.
    pub fn schema_dir(&self) -> PathBuf {
        self.root_dir.join(self.schema.to_ascii_lowercase())
    }
}

/// Configuration for the customer extract/transform/load pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Schema the raw customers are extracted from.
    /// Default: "RAW"
    pub raw_schema: String,

    /// Schema the transformed customers are loaded into.
    /// Default: "ANALYTICS"
    pub analytics_schema: String,

    /// Default: "raw_customers"
    pub source_table: String,

    /// Default: "customers_transformed"
    pub target_table: String,

    /// Number of rows logged as a preview when loading.
    /// Default: 5
    pub preview_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_schema: "RAW".to_string(),
            analytics_schema: "ANALYTICS".to_string(),
            source_table: "raw_customers".to_string(),
            target_table: "customers_transformed".to_string(),
            preview_rows: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QualityConfig::default();
        assert_eq!(config.z_threshold, 3.0);
        assert_eq!(config.sentinel, -1);
        assert_eq!(config.numeric_columns, vec!["quantity", "price"]);
        assert_eq!(config.reference_checks.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = QualityConfig::builder()
            .numeric_columns(["amount"])
            .z_threshold(2.5)
            .min_sample_size(10)
            .reference_checks(vec![ReferenceCheck::customers()])
            .build()
            .unwrap();

        assert_eq!(config.numeric_columns, vec!["amount"]);
        assert_eq!(config.z_threshold, 2.5);
        assert_eq!(config.min_sample_size, 10);
        assert_eq!(config.reference_checks.len(), 1);
        assert_eq!(config.clean_table, "fact_orders_clean");
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let result = QualityConfig::builder().z_threshold(0.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold(_)
        ));

        let result = QualityConfig::builder().z_threshold(f64::NAN).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_invalid_sample_size() {
        let result = QualityConfig::builder().min_sample_size(1).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidSampleSize(1)
        ));
    }

    #[test]
    fn test_validation_output_overwrites_input() {
        let result = QualityConfig::builder().clean_table("FACT_ORDERS").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::OutputOverwritesInput(_)
        ));

        let result = QualityConfig::builder()
            .clean_table("same")
            .issue_table("same")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "fact_table": "orders",
            "key_column": "id",
            "numeric_columns": ["qty"],
            "z_threshold": 4.0,
            "min_sample_size": 5,
            "sentinel": -99,
            "reference_checks": [{
                "column": "customer_id",
                "reference_table": "customers",
                "reference_column": "id",
                "suggestion": "Fix it."
            }],
            "clean_table": "orders_clean",
            "issue_table": "orders_issues"
        }"#;

        let config: QualityConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sentinel, -99);
        assert_eq!(config.reference_checks[0].reference_column, "id");
    }

    #[test]
    fn test_warehouse_schema_dir_is_lowercase() {
        let config = WarehouseConfig::new("/data/wh", "ANALYTICS");
        assert_eq!(config.schema_dir(), PathBuf::from("/data/wh/analytics"));
        assert_eq!(config.with_schema("RAW").schema_dir(), PathBuf::from("/data/wh/raw"));
    }
}
