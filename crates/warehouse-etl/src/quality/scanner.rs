//! In-memory anomaly detection and imputation over the fact table.

use super::stats::ColumnStats;
use crate::config::{QualityConfig, ReferenceCheck};
use crate::error::{EtlError, Result, ResultExt};
use crate::types::{QualityIssue, SkipReason, SkippedColumn};
use crate::utils::{
    column_as_f64, column_as_i64, column_keys, column_labels, format_number,
    is_numeric_dtype, require_column, resolve_column,
};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Result of scanning one fact table.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The corrected fact table.
    pub table: DataFrame,
    pub issues: Vec<QualityIssue>,
    pub skipped_columns: Vec<SkippedColumn>,
    /// Statistics of every measure column that was scanned.
    pub column_stats: BTreeMap<String, ColumnStats>,
}

/// Valid keys of one reference table, resolved before anything is corrected.
#[derive(Debug)]
struct ResolvedCheck<'a> {
    check: &'a ReferenceCheck,
    fact_column: String,
    keys: HashSet<String>,
}

/// Detects anomalous measures and dangling foreign keys and corrects them.
///
/// - A measure value is anomalous when its z-score against the column's
///   original mean and population standard deviation exceeds the threshold.
///   It is replaced by the column's original median.
/// - A foreign key is dangling when it is null or absent from the reference
///   key set. It is replaced by the sentinel, which itself is never flagged.
///   Keys are compared by value in their own type; only the dangling cells
///   change.
///
/// Every correction yields exactly one [`QualityIssue`].
#[derive(Debug, Clone)]
pub struct QualityScanner {
    config: QualityConfig,
}

impl QualityScanner {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Scan `fact` against the reference tables, keyed by table name
    /// (case-insensitive).
    ///
    /// Fails before correcting anything when a reference table is missing
    /// ([`EtlError::SourceUnavailable`]) or a key column is absent from either
    /// side of a check ([`EtlError::SchemaMismatch`]).
    pub fn scan(
        &self,
        fact: &DataFrame,
        references: &HashMap<String, DataFrame>,
    ) -> Result<ScanOutcome> {
        let config = &self.config;
        let key_column = require_column(fact, &config.fact_table, &config.key_column)?;
        let order_ids = column_labels(fact, &key_column).context("Rendering order keys")?;
        let checks = self.resolve_checks(fact, references)?;

        let mut table = fact.clone();
        let mut issues = Vec::new();
        let mut skipped_columns = Vec::new();
        let mut column_stats = BTreeMap::new();

        for name in &config.numeric_columns {
            let Some(column) = resolve_column(fact, name) else {
                debug!("Measure column '{}' not present, skipping", name);
                skipped_columns.push(SkippedColumn {
                    column: name.clone(),
                    reason: SkipReason::Missing,
                });
                continue;
            };

            match self.scan_measure(fact, &column, &order_ids)? {
                MeasureScan::Skipped(reason) => {
                    skipped_columns.push(SkippedColumn { column, reason });
                }
                MeasureScan::Scanned {
                    stats,
                    corrected,
                    issues: found,
                } => {
                    info!(
                        "Column '{}': mean={:.4}, std={:.4}, median={}, {} anomaly(ies)",
                        column,
                        stats.mean,
                        stats.std_dev,
                        format_number(stats.median),
                        found.len()
                    );
                    table.replace(&column, corrected)?;
                    column_stats.insert(column, stats);
                    issues.extend(found);
                }
            }
        }

        for resolved in &checks {
            let (corrected, found) = self.check_references(fact, resolved, &order_ids)?;
            info!(
                "Column '{}': {} reference(s) missing from {}",
                resolved.fact_column,
                found.len(),
                resolved.check.reference_table
            );
            table.replace(&resolved.fact_column, corrected)?;
            issues.extend(found);
        }

        for issue in &issues {
            warn!("{}", issue);
        }

        Ok(ScanOutcome {
            table,
            issues,
            skipped_columns,
            column_stats,
        })
    }

    fn resolve_checks<'a>(
        &'a self,
        fact: &DataFrame,
        references: &HashMap<String, DataFrame>,
    ) -> Result<Vec<ResolvedCheck<'a>>> {
        self.config
            .reference_checks
            .iter()
            .map(|check| {
                let reference = references
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&check.reference_table))
                    .map(|(_, df)| df)
                    .ok_or_else(|| {
                        EtlError::source_unavailable(
                            check.reference_table.clone(),
                            "reference table was not loaded",
                        )
                    })?;

                let reference_column =
                    require_column(reference, &check.reference_table, &check.reference_column)?;
                let fact_column = require_column(fact, &self.config.fact_table, &check.column)?;

                let keys: HashSet<String> = column_keys(reference, &reference_column)
                    .context(format!("Reading keys of {}", check.reference_table))?
                    .into_iter()
                    .flatten()
                    .collect();
                debug!(
                    "Loaded {} key(s) from {}.{}",
                    keys.len(),
                    check.reference_table,
                    reference_column
                );

                Ok(ResolvedCheck {
                    check,
                    fact_column,
                    keys,
                })
            })
            .collect()
    }

    fn scan_measure(
        &self,
        fact: &DataFrame,
        column: &str,
        order_ids: &[String],
    ) -> Result<MeasureScan> {
        if !is_numeric_dtype(fact.column(column)?.dtype()) {
            debug!("Measure column '{}' is not numeric, skipping", column);
            return Ok(MeasureScan::Skipped(SkipReason::NotNumeric));
        }

        let values = column_as_f64(fact, column)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.len() < self.config.min_sample_size {
            debug!(
                "Measure column '{}' has {} value(s), fewer than {}, skipping",
                column,
                present.len(),
                self.config.min_sample_size
            );
            return Ok(MeasureScan::Skipped(SkipReason::TooFewValues));
        }

        let Some(stats) = ColumnStats::from_values(&present) else {
            return Ok(MeasureScan::Skipped(SkipReason::TooFewValues));
        };
        if stats.is_degenerate() {
            debug!("Measure column '{}' has zero variance, nothing to flag", column);
            return Ok(MeasureScan::Skipped(SkipReason::ZeroVariance));
        }

        let mut issues = Vec::new();
        let corrected: Vec<Option<f64>> = values
            .iter()
            .zip(order_ids)
            .map(|(value, order_id)| match value {
                Some(v) if stats.is_outlier(*v, self.config.z_threshold) => {
                    issues.push(QualityIssue::anomaly(
                        order_id.clone(),
                        column,
                        format_number(*v),
                    ));
                    Some(stats.median)
                }
                other => *other,
            })
            .collect();

        Ok(MeasureScan::Scanned {
            stats,
            corrected: Series::new(column.into(), corrected),
            issues,
        })
    }

    fn check_references(
        &self,
        fact: &DataFrame,
        resolved: &ResolvedCheck<'_>,
        order_ids: &[String],
    ) -> Result<(Series, Vec<QualityIssue>)> {
        let column = &resolved.fact_column;
        let sentinel_key = self.config.sentinel.to_string();
        let keys = column_keys(fact, column)?;

        let mut issues = Vec::new();
        let dangling: Vec<bool> = keys
            .iter()
            .zip(order_ids)
            .map(|(key, order_id)| match key {
                Some(k) if *k == sentinel_key || resolved.keys.contains(k) => false,
                _ => {
                    issues.push(QualityIssue::missing_reference(
                        order_id.clone(),
                        column.clone(),
                        key.clone().unwrap_or_else(|| "null".to_string()),
                        resolved.check.suggestion.clone(),
                    ));
                    true
                }
            })
            .collect();

        let corrected = self.with_sentinel(fact, column, &keys, &dangling)?;
        Ok((corrected, issues))
    }

    /// Copy of `column` with every dangling cell set to the sentinel.
    ///
    /// Integer keys come back as `Int64` and float keys as `Float64`. Any
    /// other key type is written as text, the sentinel included.
    fn with_sentinel(
        &self,
        fact: &DataFrame,
        column: &str,
        keys: &[Option<String>],
        dangling: &[bool],
    ) -> Result<Series> {
        let sentinel = self.config.sentinel;
        let dtype = fact.column(column)?.dtype().clone();
        let name = PlSmallStr::from(column);

        let series = if dtype.is_integer() {
            let values: Vec<Option<i64>> = column_as_i64(fact, column)?
                .into_iter()
                .zip(dangling)
                .map(|(v, &d)| if d { Some(sentinel) } else { v })
                .collect();
            Series::new(name, values)
        } else if dtype.is_float() {
            let values: Vec<Option<f64>> = column_as_f64(fact, column)?
                .into_iter()
                .zip(dangling)
                .map(|(v, &d)| if d { Some(sentinel as f64) } else { v })
                .collect();
            Series::new(name, values)
        } else {
            let sentinel_key = sentinel.to_string();
            let values: Vec<Option<String>> = keys
                .iter()
                .zip(dangling)
                .map(|(k, &d)| if d { Some(sentinel_key.clone()) } else { k.clone() })
                .collect();
            Series::new(name, values)
        };
        Ok(series)
    }
}

enum MeasureScan {
    Skipped(SkipReason),
    Scanned {
        stats: ColumnStats,
        corrected: Series,
        issues: Vec<QualityIssue>,
    },
}

/// Scan with the default configuration: `customers` and `products` are the
/// `dim_customers` and `dim_products` reference tables.
pub fn scan(
    fact: &DataFrame,
    customers: &DataFrame,
    products: &DataFrame,
) -> Result<(DataFrame, Vec<QualityIssue>)> {
    let config = QualityConfig::default();
    let references = HashMap::from([
        (ReferenceCheck::customers().reference_table, customers.clone()),
        (ReferenceCheck::products().reference_table, products.clone()),
    ]);
    let outcome = QualityScanner::new(config).scan(fact, &references)?;
    Ok((outcome.table, outcome.issues))
}

/// One-column table holding the description of every issue.
pub fn issues_frame(issues: &[QualityIssue]) -> PolarsResult<DataFrame> {
    let descriptions: Vec<String> = issues.iter().map(QualityIssue::description).collect();
    DataFrame::new(vec![
        Series::new(ISSUE_DESCRIPTION_COLUMN.into(), descriptions).into(),
    ])
}

/// Column of the issue history table.
pub const ISSUE_DESCRIPTION_COLUMN: &str = "issue_description";
