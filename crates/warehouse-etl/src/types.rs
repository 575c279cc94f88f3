use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of problem an issue records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A measure whose z-score exceeded the threshold; replaced by the median.
    Anomaly,
    /// A foreign key with no matching reference row; replaced by the sentinel.
    MissingReference,
}

/// One detected (and corrected) data-quality problem.
///
/// The issue history stores only [`QualityIssue::description`]; the structured
/// fields exist for reports and tests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    /// Rendered identifying key of the offending row.
    pub order_id: String,
    pub column: String,
    /// Rendered original value.
    pub value: String,
    pub suggestion: String,
}

impl QualityIssue {
    pub fn anomaly(order_id: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        let column = column.into();
        let suggestion = format!("Compare with average {} across products.", column);
        Self {
            kind: IssueKind::Anomaly,
            order_id: order_id.into(),
            column,
            value: value.into(),
            suggestion,
        }
    }

    pub fn missing_reference(
        order_id: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::MissingReference,
            order_id: order_id.into(),
            column: column.into(),
            value: value.into(),
            suggestion: suggestion.into(),
        }
    }

    /// The human-readable issue text written to the issue history.
    pub fn description(&self) -> String {
        match self.kind {
            IssueKind::Anomaly => format!(
                "Flagged Order ID: {} for unusual {}={}. Suggestion: {}",
                self.order_id, self.column, self.value, self.suggestion
            ),
            IssueKind::MissingReference => format!(
                "Order ID: {} has invalid {}={}. Suggestion: {}",
                self.order_id, self.column, self.value, self.suggestion
            ),
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Why a configured measure column was not scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The fact table has no such column.
    Missing,
    /// The column does not hold numbers.
    NotNumeric,
    /// Fewer non-null values than the configured minimum sample size.
    TooFewValues,
    /// All values are equal; nothing can deviate.
    ZeroVariance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedColumn {
    pub column: String,
    pub reason: SkipReason,
}

/// Timing and size of one executed pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub rows_out: usize,
    pub columns_out: usize,
    pub duration_ms: u64,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub pipeline: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub steps: Vec<StepSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_description() {
        let issue = QualityIssue::anomaly("2", "price", "10000");
        assert_eq!(
            issue.description(),
            "Flagged Order ID: 2 for unusual price=10000. \
             Suggestion: Compare with average price across products."
        );
    }

    #[test]
    fn test_missing_reference_description() {
        let issue = QualityIssue::missing_reference(
            "2",
            "customer_id",
            "999",
            "Check customer table or assign to 'Unknown Customer'.",
        );
        assert_eq!(
            issue.to_string(),
            "Order ID: 2 has invalid customer_id=999. \
             Suggestion: Check customer table or assign to 'Unknown Customer'."
        );
    }

    #[test]
    fn test_issue_serialization() {
        let issue = QualityIssue::anomaly("1", "quantity", "500");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"kind\":\"anomaly\""));
        let back: QualityIssue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, issue);
    }
}
