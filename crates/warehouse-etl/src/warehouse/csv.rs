use super::memory::stack_rows;
use super::sql::{execute, referenced_tables};
use super::{Warehouse, WriteMode, validate_table_name};
use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A warehouse schema stored as a directory of CSV files, one per table.
///
/// `SELECT * FROM fact_orders` in schema `ANALYTICS` reads
/// `<root>/analytics/fact_orders.csv`. Writes go to a temporary file first and
/// are renamed into place, so a failed write never leaves a half-written table.
#[derive(Debug)]
pub struct CsvWarehouse {
    schema: String,
    schema_dir: PathBuf,
}

impl CsvWarehouse {
    /// Open a session on the configured schema.
    ///
    /// The warehouse root must exist. The schema directory is created on the
    /// first write if needed.
    pub fn connect(config: &WarehouseConfig) -> Result<Self> {
        if !config.root_dir.is_dir() {
            return Err(EtlError::source_unavailable(
                config.root_dir.display().to_string(),
                "warehouse directory does not exist",
            ));
        }

        debug!(
            "Opened warehouse session on {} ({})",
            config.schema,
            config.schema_dir().display()
        );

        Ok(Self {
            schema: config.schema.clone(),
            schema_dir: config.schema_dir(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// File backing a table.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.schema_dir
            .join(format!("{}.csv", table.to_ascii_lowercase()))
    }

    fn read_table(&self, path: &Path) -> PolarsResult<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()
    }

    fn write_atomically(&self, df: &DataFrame, path: &Path) -> std::result::Result<(), String> {
        fs::create_dir_all(&self.schema_dir).map_err(|e| e.to_string())?;

        let tmp_path = path.with_extension("csv.tmp");
        let written = File::create(&tmp_path)
            .map_err(|e| e.to_string())
            .and_then(|mut file| {
                let mut df = df.clone();
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(&mut df)
                    .map_err(|e| e.to_string())
            })
            .and_then(|_| fs::rename(&tmp_path, path).map_err(|e| e.to_string()));

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }
}

impl Warehouse for CsvWarehouse {
    fn query(&self, sql: &str) -> Result<DataFrame> {
        let referenced = referenced_tables(sql);
        let mut tables = Vec::with_capacity(referenced.len());
        for name in &referenced {
            let path = self.table_path(name);
            if !path.is_file() {
                continue;
            }
            let df = self
                .read_table(&path)
                .map_err(|e| EtlError::source_unavailable(name.clone(), e))?;
            tables.push((name.clone(), df));
        }

        debug!("{} query over {} table(s): {}", self.schema, tables.len(), sql);

        execute(sql, tables).map_err(|e| {
            let source = referenced.first().cloned().unwrap_or_else(|| sql.to_string());
            EtlError::source_unavailable(source, e)
        })
    }

    fn write(&self, table: &DataFrame, destination: &str, mode: WriteMode) -> Result<()> {
        validate_table_name(destination)?;
        let path = self.table_path(destination);

        let output = match mode {
            WriteMode::Append if path.is_file() => {
                let existing = self
                    .read_table(&path)
                    .map_err(|e| EtlError::write_failure(destination, e))?;
                stack_rows(&existing, table).map_err(|e| EtlError::write_failure(destination, e))?
            }
            _ => table.clone(),
        };

        self.write_atomically(&output, &path)
            .map_err(|reason| EtlError::write_failure(destination, reason))?;

        info!(
            "Wrote {} row(s) to {}.{} ({:?})",
            table.height(),
            self.schema,
            destination,
            mode
        );
        Ok(())
    }
}

impl Drop for CsvWarehouse {
    fn drop(&mut self) {
        debug!("Released warehouse session on {}", self.schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> CsvWarehouse {
        CsvWarehouse::connect(&WarehouseConfig::new(dir.path(), "ANALYTICS")).unwrap()
    }

    #[test]
    fn test_write_then_query() {
        let dir = TempDir::new().unwrap();
        let wh = session(&dir);
        let df = df![
            "order_id" => [1i64, 2, 3],
            "price" => [10.5, 20.0, 30.0],
        ]
        .unwrap();

        wh.write(&df, "fact_orders", WriteMode::Overwrite).unwrap();
        assert!(dir.path().join("analytics/fact_orders.csv").is_file());

        let result = wh
            .query("SELECT order_id FROM FACT_ORDERS WHERE price > 15")
            .unwrap();
        assert_eq!(result.height(), 2);
    }

    #[test]
    fn test_append_grows_table() {
        let dir = TempDir::new().unwrap();
        let wh = session(&dir);
        let batch = df!["issue_description" => ["first", "second"]].unwrap();

        wh.write(&batch, "data_quality_issues", WriteMode::Append).unwrap();
        wh.write(&batch, "data_quality_issues", WriteMode::Append).unwrap();

        let all = wh.query("SELECT * FROM data_quality_issues").unwrap();
        assert_eq!(all.height(), 4);
    }

    #[test]
    fn test_append_with_other_columns_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let wh = session(&dir);
        wh.write(&df!["a" => [1i64]].unwrap(), "t", WriteMode::Overwrite)
            .unwrap();

        let err = wh
            .write(&df!["b" => [2i64]].unwrap(), "t", WriteMode::Append)
            .unwrap_err();
        assert_eq!(err.error_code(), "WRITE_FAILURE");
        assert_eq!(wh.query("SELECT * FROM t").unwrap().height(), 1);
    }

    #[test]
    fn test_query_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = session(&dir).query("SELECT * FROM dim_customers").unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn test_write_rejects_bad_destination() {
        let dir = TempDir::new().unwrap();
        let err = session(&dir)
            .write(&DataFrame::empty(), "../escape", WriteMode::Overwrite)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TABLE_NAME");
    }
}
