//! Column statistics used for anomaly detection and imputation.

use serde::{Deserialize, Serialize};

/// Summary of the non-null values of a numeric column.
///
/// Computed once per column, before any cell is changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub median: f64,
}

impl ColumnStats {
    /// Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            median: median(values)?,
        })
    }

    /// True when the column has no spread.
    ///
    /// A spread below one ulp of the mean is rounding left over from summing
    /// identical values, not variance.
    pub fn is_degenerate(&self) -> bool {
        self.std_dev <= f64::EPSILON * self.mean.abs()
    }

    /// Standard score of `value`. Zero for a degenerate column.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            (value - self.mean) / self.std_dev
        }
    }

    pub fn is_outlier(&self, value: f64, threshold: f64) -> bool {
        self.z_score(value).abs() > threshold
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Middle value, or the mean of the two middle values for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// `q`-quantile (0..=1) with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let sorted = sorted(values);
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std() {
        let stats = ColumnStats::from_values(&[10.0, 10.0, 10.0, 10.0, 100.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert!((stats.mean - 28.0).abs() < 1e-9);
        assert!((stats.std_dev - 36.0).abs() < 1e-9);
        assert_eq!(stats.median, 10.0);
        assert!((stats.z_score(100.0) - 2.0).abs() < 1e-9);
        assert!(stats.is_outlier(100.0, 1.5));
        assert!(!stats.is_outlier(100.0, 3.0));
        assert!(!stats.is_outlier(10.0, 0.6));
    }

    #[test]
    fn test_degenerate_column() {
        let stats = ColumnStats::from_values(&[5.0, 5.0, 5.0]).unwrap();
        assert!(stats.is_degenerate());
        assert_eq!(stats.z_score(5.0), 0.0);
        assert!(!stats.is_outlier(1_000_000.0, 3.0));
    }

    #[test]
    fn test_large_magnitude_spread_is_not_degenerate() {
        let mut values = vec![1e13; 99];
        values.push(1e13 + 100.0);
        let stats = ColumnStats::from_values(&values).unwrap();
        assert!(!stats.is_degenerate());
        assert!((stats.std_dev - 99f64.sqrt()).abs() < 1e-9);
        assert!(stats.is_outlier(1e13 + 100.0, 3.0));
        assert!(!stats.is_outlier(1e13, 3.0));
    }

    #[test]
    fn test_rounding_noise_is_degenerate() {
        let stats = ColumnStats::from_values(&[0.1, 0.1, 0.1]).unwrap();
        assert!(stats.is_degenerate());
        assert!(!stats.is_outlier(0.1, 0.5));
    }

    #[test]
    fn test_empty_values() {
        assert!(ColumnStats::from_values(&[]).is_none());
        assert!(median(&[]).is_none());
        assert!(percentile(&[], 0.5).is_none());
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[7.0]), Some(7.0));
    }

    #[test]
    fn test_percentile_linear() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let p90 = percentile(&values, 0.9).unwrap();
        assert!((p90 - 9.1).abs() < 1e-9);
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(10.0));
        assert!(percentile(&values, 1.5).is_none());
    }
}
