use super::sql::{execute, referenced_tables};
use super::{Warehouse, WriteMode, validate_table_name};
use crate::error::{EtlError, Result};
use parking_lot::Mutex;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One completed write, as recorded by [`MemoryWarehouse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub destination: String,
    pub mode: WriteMode,
    pub rows: usize,
}

/// A warehouse schema held entirely in memory.
///
/// Table names are case-insensitive. Writes to destinations registered with
/// [`fail_writes_to`](Self::fail_writes_to) fail without touching the table.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, DataFrame>>,
    failing_destinations: Mutex<HashSet<String>>,
    writes: Mutex<Vec<WriteRecord>>,
}

static_assertions::assert_impl_all!(MemoryWarehouse: Send, Sync);

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_table(self, name: &str, df: DataFrame) -> Self {
        self.insert(name, df);
        self
    }

    /// Create or replace a table without recording a write.
    pub fn insert(&self, name: &str, df: DataFrame) {
        self.tables.lock().insert(name.to_ascii_lowercase(), df);
    }

    /// Current contents of a table.
    pub fn table(&self, name: &str) -> Option<DataFrame> {
        self.tables.lock().get(&name.to_ascii_lowercase()).cloned()
    }

    /// Make every future write to `destination` fail.
    pub fn fail_writes_to(&self, destination: &str) {
        self.failing_destinations
            .lock()
            .insert(destination.to_ascii_lowercase());
    }

    /// Writes performed so far, oldest first.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }
}

impl Warehouse for MemoryWarehouse {
    fn query(&self, sql: &str) -> Result<DataFrame> {
        let referenced = referenced_tables(sql);
        let registered: Vec<(String, DataFrame)> = {
            let tables = self.tables.lock();
            referenced
                .iter()
                .filter_map(|name| {
                    tables
                        .get(&name.to_ascii_lowercase())
                        .map(|df| (name.clone(), df.clone()))
                })
                .collect()
        };

        debug!("Memory query over {} table(s): {}", registered.len(), sql);

        execute(sql, registered).map_err(|e| {
            let source = referenced.first().cloned().unwrap_or_else(|| sql.to_string());
            EtlError::source_unavailable(source, e)
        })
    }

    fn write(&self, table: &DataFrame, destination: &str, mode: WriteMode) -> Result<()> {
        validate_table_name(destination)?;
        let key = destination.to_ascii_lowercase();

        if self.failing_destinations.lock().contains(&key) {
            return Err(EtlError::write_failure(destination, "injected failure"));
        }

        let mut tables = self.tables.lock();
        let next = match (mode, tables.get(&key)) {
            (WriteMode::Append, Some(existing)) => stack_rows(existing, table)
                .map_err(|e| EtlError::write_failure(destination, e))?,
            _ => table.clone(),
        };
        tables.insert(key, next);

        self.writes.lock().push(WriteRecord {
            destination: destination.to_string(),
            mode,
            rows: table.height(),
        });
        Ok(())
    }
}

/// Append `batch` below `existing`, aligning columns by name and casting them
/// to the existing types.
pub(crate) fn stack_rows(existing: &DataFrame, batch: &DataFrame) -> PolarsResult<DataFrame> {
    let mut aligned = Vec::with_capacity(existing.width());
    for column in existing.get_columns() {
        let incoming = batch.column(column.name().as_str())?;
        aligned.push(incoming.cast(column.dtype())?);
    }
    if batch.width() != existing.width() {
        polars_bail!(ShapeMismatch: "cannot append {} columns to a table with {}", batch.width(), existing.width());
    }
    let aligned = DataFrame::new(aligned)?;
    existing.vstack(&aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> DataFrame {
        df![
            "order_id" => [1i64, 2],
            "price" => [10.0, 20.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let wh = MemoryWarehouse::new().with_table("fact_orders", orders());
        let df = wh.query("SELECT * FROM FACT_ORDERS").unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_query_missing_table_is_source_unavailable() {
        let wh = MemoryWarehouse::new();
        let err = wh.query("SELECT * FROM dim_products").unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
        assert!(err.to_string().contains("dim_products"));
    }

    #[test]
    fn test_overwrite_replaces_table() {
        let wh = MemoryWarehouse::new().with_table("clean", orders());
        let replacement = df!["order_id" => [9i64], "price" => [1.0]].unwrap();
        wh.write(&replacement, "clean", WriteMode::Overwrite).unwrap();
        assert_eq!(wh.table("clean").unwrap().height(), 1);
    }

    #[test]
    fn test_append_stacks_rows_and_creates_missing_table() {
        let wh = MemoryWarehouse::new();
        let batch = df!["issue_description" => ["a", "b"]].unwrap();
        wh.write(&batch, "issues", WriteMode::Append).unwrap();
        wh.write(&batch, "issues", WriteMode::Append).unwrap();

        assert_eq!(wh.table("issues").unwrap().height(), 4);
        assert_eq!(wh.writes().len(), 2);
        assert_eq!(wh.writes()[0].mode, WriteMode::Append);
    }

    #[test]
    fn test_append_schema_mismatch_is_write_failure() {
        let wh = MemoryWarehouse::new().with_table("issues", df!["issue_description" => ["a"]].unwrap());
        let err = wh
            .write(&df!["other" => ["b"]].unwrap(), "issues", WriteMode::Append)
            .unwrap_err();
        assert_eq!(err.error_code(), "WRITE_FAILURE");
        assert_eq!(wh.table("issues").unwrap().height(), 1);
    }

    #[test]
    fn test_injected_failure_leaves_table_untouched() {
        let wh = MemoryWarehouse::new().with_table("clean", orders());
        wh.fail_writes_to("CLEAN");
        let err = wh
            .write(&DataFrame::empty(), "clean", WriteMode::Overwrite)
            .unwrap_err();
        assert_eq!(err.error_code(), "WRITE_FAILURE");
        assert_eq!(wh.table("clean").unwrap().height(), 2);
        assert!(wh.writes().is_empty());
    }
}
