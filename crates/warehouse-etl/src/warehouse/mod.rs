//! Warehouse access.
//!
//! The rest of the crate talks to the warehouse only through the
//! [`Warehouse`] trait: run a read-only SQL query and get a table back, or
//! persist a table with a [`WriteMode`]. Two backends are provided:
//!
//! - [`CsvWarehouse`] - one directory per schema, one CSV file per table
//! - [`MemoryWarehouse`] - an in-memory table map, for tests and embedding
//!
//! Both execute SQL with the Polars SQL engine.
//!
//! # Sessions
//!
//! Connections are scoped. [`with_session`] opens a session, hands it to a
//! closure and releases it on every exit path:
//!
//! ```rust,ignore
//! use warehouse_etl::warehouse::{with_session, Warehouse};
//!
//! let orders = with_session(&config, |wh| wh.query("SELECT * FROM fact_orders"))?;
//! ```

mod csv;
mod memory;
mod sql;

pub use csv::CsvWarehouse;
pub use memory::MemoryWarehouse;
pub use sql::referenced_tables;

use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex: table name"));

/// How a write treats an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the table wholesale.
    Overwrite,
    /// Add rows to the end of the table (created if absent).
    Append,
}

/// A session against one schema of the warehouse.
pub trait Warehouse {
    /// Execute a read-only query and return the result table.
    ///
    /// Fails with [`EtlError::SourceUnavailable`] when the query cannot run.
    fn query(&self, sql: &str) -> Result<DataFrame>;

    /// Persist a table. Each call either fully succeeds or leaves the
    /// destination untouched.
    ///
    /// Fails with [`EtlError::WriteFailure`].
    fn write(&self, table: &DataFrame, destination: &str, mode: WriteMode) -> Result<()>;
}

/// Check that a table name is a plain identifier.
pub fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::InvalidTableName(name.to_string()))
    }
}

/// `SELECT * FROM <table>`, with the table name validated first.
pub fn select_all(warehouse: &dyn Warehouse, table: &str) -> Result<DataFrame> {
    validate_table_name(table)?;
    warehouse.query(&format!("SELECT * FROM {}", table))
}

/// Open a CSV warehouse session, run `f`, and release the session afterwards,
/// whether `f` succeeded or not.
pub fn with_session<T, F>(config: &WarehouseConfig, f: F) -> Result<T>
where
    F: FnOnce(&CsvWarehouse) -> Result<T>,
{
    let session = CsvWarehouse::connect(config)?;
    f(&session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("fact_orders").is_ok());
        assert!(validate_table_name("FACT_ORDERS_CLEAN").is_ok());
        assert!(validate_table_name("_staging1").is_ok());
        assert!(validate_table_name("1table").is_err());
        assert!(validate_table_name("orders; DROP TABLE x").is_err());
        assert!(validate_table_name("../etc/passwd").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_select_all_rejects_bad_names() {
        let wh = MemoryWarehouse::new();
        let err = select_all(&wh, "a b").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TABLE_NAME");
    }

    #[test]
    fn test_with_session_missing_root_is_source_unavailable() {
        let config = WarehouseConfig::new("/definitely/not/a/warehouse", "RAW");
        let err = with_session(&config, |wh| wh.query("SELECT 1")).unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }
}
