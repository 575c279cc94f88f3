//! Error types for warehouse access, the ETL pipeline and the quality pass.
//!
//! Every error is fatal to the run that raised it. Recovery is the scheduler's
//! job: [`EtlError::is_retryable`] tells it whether running the whole job again
//! can help.
//!
//! Errors are serializable so they can be embedded in JSON run reports.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum EtlError {
    /// The run was cancelled before any output was written.
    #[error("Run cancelled")]
    Cancelled,

    /// A source table could not be read.
    #[error("Source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// An expected column is missing from a table.
    #[error("Table '{table}' has no column '{column}'")]
    SchemaMismatch { table: String, column: String },

    /// Persisting a table failed.
    #[error("Failed to write '{destination}': {reason}")]
    WriteFailure { destination: String, reason: String },

    /// A table name is not a plain identifier.
    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EtlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`EtlError::SourceUnavailable`].
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        EtlError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`EtlError::SchemaMismatch`].
    pub fn schema_mismatch(table: impl Into<String>, column: impl Into<String>) -> Self {
        EtlError::SchemaMismatch {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Shorthand for [`EtlError::WriteFailure`].
    pub fn write_failure(destination: impl Into<String>, reason: impl ToString) -> Self {
        EtlError::WriteFailure {
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable error code for reports and exit handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::WriteFailure { .. } => "WRITE_FAILURE",
            Self::InvalidTableName(_) => "INVALID_TABLE_NAME",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether re-running the whole job may succeed.
    ///
    /// Cancellations and configuration mistakes are final; everything the
    /// warehouse can fix between attempts is worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled | Self::InvalidConfig(_) | Self::InvalidTableName(_) => false,
            Self::WithContext { source, .. } => source.is_retryable(),
            _ => true,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for EtlError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("EtlError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(EtlError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            EtlError::schema_mismatch("dim_customers", "customer_id").error_code(),
            "SCHEMA_MISMATCH"
        );
        assert_eq!(
            EtlError::write_failure("fact_orders_clean", "disk full").error_code(),
            "WRITE_FAILURE"
        );
    }

    #[test]
    fn test_is_cancelled_through_context() {
        assert!(EtlError::Cancelled.is_cancelled());
        assert!(EtlError::Cancelled.with_context("step load").is_cancelled());
        assert!(!EtlError::InvalidConfig("x".into()).is_cancelled());
    }

    #[test]
    fn test_is_retryable() {
        assert!(EtlError::source_unavailable("fact_orders", "missing").is_retryable());
        assert!(EtlError::write_failure("issues", "locked").is_retryable());
        assert!(!EtlError::Cancelled.is_retryable());
        assert!(!EtlError::InvalidConfig("bad".into()).is_retryable());
        assert!(
            !EtlError::InvalidTableName("a;b".into())
                .with_context("query")
                .is_retryable()
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = EtlError::schema_mismatch("dim_products", "product_id");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("SCHEMA_MISMATCH"));
        assert!(json.contains("product_id"));
    }

    #[test]
    fn test_with_context() {
        let error = EtlError::source_unavailable("fact_orders", "no such table")
            .with_context("Loading quality inputs");
        assert!(error.to_string().contains("Loading quality inputs"));
        assert_eq!(error.error_code(), "SOURCE_UNAVAILABLE");
    }
}
