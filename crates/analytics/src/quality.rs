//! # Data Quality Validation
//!
//! Gates every series before it reaches the forecaster. Produces a report
//! with per-issue severities and a 0-100 quality score; the engine refuses
//! to train on `error`-level data and may auto-clean `warning`-level data.

use crate::forecast::{SeriesPoint, TimeSeries};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;

/// IQR multiplier for outlier detection.
const OUTLIER_IQR_MULTIPLIER: f64 = 3.0;
/// Default plausibility ceiling for daily values.
const DEFAULT_MAX_PLAUSIBLE: f64 = 999_999_999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyData,
    InsufficientData,
    MissingDates,
    NegativeValues,
    NullValues,
    Outliers,
    Duplicates,
    DataGaps,
    UnreasonableValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub description: String,
    pub count: usize,
    /// At most five concrete examples of affected records.
    pub examples: Vec<String>,
}

impl QualityIssue {
    fn new(
        kind: IssueKind,
        severity: IssueSeverity,
        description: impl Into<String>,
        affected: Vec<String>,
    ) -> Self {
        let count = affected.len();
        let mut examples = affected;
        examples.truncate(5);
        Self {
            kind,
            severity,
            description: description.into(),
            count,
            examples,
        }
    }
}

/// Validation outcome. `is_valid` is true iff no error-level issue exists;
/// the score starts at 100 and loses 20 per error, 5 per warning, 1 per
/// info, floored at zero.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub is_valid: bool,
    pub quality_score: u8,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            quality_score: 100,
            issues: Vec::new(),
        }
    }

    fn add(&mut self, issue: QualityIssue) {
        let penalty: u8 = match issue.severity {
            IssueSeverity::Error => {
                self.is_valid = false;
                20
            }
            IssueSeverity::Warning => 5,
            IssueSeverity::Info => 1,
        };
        self.quality_score = self.quality_score.saturating_sub(penalty);
        self.issues.push(issue);
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }

    pub fn errors(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .count()
    }

    pub fn summary(&self) -> String {
        if self.is_valid {
            format!("valid series, score {}%", self.quality_score)
        } else {
            format!("INVALID series: {} critical issues", self.errors())
        }
    }
}

/// Statistical digest of a series.
#[derive(Debug, Clone, Serialize)]
pub struct DataSummary {
    pub total_records: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub span_days: i64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
}

/// Cleaning steps applied by [`auto_clean`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanAction {
    WinsorizedOutliers,
    InterpolatedMissingDates,
    ClampedNegatives,
}

pub struct DataQualityValidator {
    max_plausible_value: f64,
}

impl Default for DataQualityValidator {
    fn default() -> Self {
        Self {
            max_plausible_value: DEFAULT_MAX_PLAUSIBLE,
        }
    }
}

impl DataQualityValidator {
    pub fn new(max_plausible_value: f64) -> Self {
        Self {
            max_plausible_value,
        }
    }

    /// Run every check over the points. Values may contain NaN (treated as
    /// nulls); dates may repeat.
    pub fn validate(&self, points: &[SeriesPoint]) -> QualityReport {
        let mut report = QualityReport::new();

        if points.is_empty() {
            report.add(QualityIssue::new(
                IssueKind::EmptyData,
                IssueSeverity::Error,
                "series is empty",
                Vec::new(),
            ));
            return report;
        }

        if points.len() < 30 {
            report.add(QualityIssue::new(
                IssueKind::InsufficientData,
                IssueSeverity::Error,
                format!("only {} records (minimum 30 required)", points.len()),
                Vec::new(),
            ));
        }

        self.check_missing_dates(points, &mut report);
        self.check_negative_values(points, &mut report);
        self.check_null_values(points, &mut report);
        self.check_outliers(points, &mut report);
        self.check_duplicates(points, &mut report);
        self.check_time_gaps(points, &mut report);
        self.check_value_range(points, &mut report);

        debug!(
            is_valid = report.is_valid,
            score = report.quality_score,
            issues = report.issues.len(),
            "data quality validation finished"
        );
        report
    }

    fn check_missing_dates(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let (Some(min), Some(max)) = (
            points.iter().map(|p| p.date).min(),
            points.iter().map(|p| p.date).max(),
        ) else {
            return;
        };

        let total_days = (max - min).num_days() + 1;
        let present: std::collections::BTreeSet<NaiveDate> =
            points.iter().map(|p| p.date).collect();

        let mut missing = Vec::new();
        let mut cursor = min;
        while cursor <= max {
            if !present.contains(&cursor) {
                missing.push(cursor.to_string());
            }
            cursor += Duration::days(1);
        }

        if !missing.is_empty() {
            let missing_pct = missing.len() as f64 / total_days as f64 * 100.0;
            let severity = if missing_pct >= 30.0 {
                IssueSeverity::Error
            } else {
                IssueSeverity::Warning
            };
            report.add(QualityIssue::new(
                IssueKind::MissingDates,
                severity,
                format!("{} missing dates ({missing_pct:.1}%)", missing.len()),
                missing,
            ));
        }
    }

    fn check_negative_values(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let negatives: Vec<String> = points
            .iter()
            .filter(|p| p.value < 0.0)
            .map(|p| p.date.to_string())
            .collect();
        if !negatives.is_empty() {
            report.add(QualityIssue::new(
                IssueKind::NegativeValues,
                IssueSeverity::Error,
                format!("{} records with negative values", negatives.len()),
                negatives,
            ));
        }
    }

    fn check_null_values(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let nulls: Vec<String> = points
            .iter()
            .filter(|p| p.value.is_nan())
            .map(|p| p.date.to_string())
            .collect();
        if !nulls.is_empty() {
            let null_pct = nulls.len() as f64 / points.len() as f64 * 100.0;
            let severity = if null_pct >= 10.0 {
                IssueSeverity::Error
            } else {
                IssueSeverity::Warning
            };
            report.add(QualityIssue::new(
                IssueKind::NullValues,
                severity,
                format!("{} null values ({null_pct:.1}%)", nulls.len()),
                nulls,
            ));
        }
    }

    fn check_outliers(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let values: Vec<f64> = points
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < 4 {
            return;
        }

        let q1 = quantile(&values, 0.25);
        let q3 = quantile(&values, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - OUTLIER_IQR_MULTIPLIER * iqr;
        let upper = q3 + OUTLIER_IQR_MULTIPLIER * iqr;

        let outliers: Vec<String> = points
            .iter()
            .filter(|p| p.value.is_finite() && (p.value < lower || p.value > upper))
            .map(|p| format!("{}: {}", p.date, p.value))
            .collect();

        if !outliers.is_empty() {
            let pct = outliers.len() as f64 / points.len() as f64 * 100.0;
            report.add(QualityIssue::new(
                IssueKind::Outliers,
                IssueSeverity::Warning,
                format!("{} outliers detected ({pct:.1}%)", outliers.len()),
                outliers,
            ));
        }
    }

    fn check_duplicates(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let mut seen = std::collections::BTreeMap::new();
        for point in points {
            *seen.entry(point.date).or_insert(0usize) += 1;
        }
        let duplicated: Vec<String> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(date, _)| date.to_string())
            .collect();
        if !duplicated.is_empty() {
            let affected: usize = seen.values().filter(|c| **c > 1).sum();
            report.add(QualityIssue::new(
                IssueKind::Duplicates,
                IssueSeverity::Error,
                format!("{affected} records with duplicated dates"),
                duplicated,
            ));
        }
    }

    fn check_time_gaps(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let mut dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        dates.sort_unstable();

        let gaps: Vec<String> = dates
            .windows(2)
            .filter_map(|pair| {
                let gap = (pair[1] - pair[0]).num_days();
                (gap > 2).then(|| format!("{} days", gap))
            })
            .collect();

        if !gaps.is_empty() {
            report.add(QualityIssue::new(
                IssueKind::DataGaps,
                IssueSeverity::Warning,
                format!("{} gaps > 2 days detected", gaps.len()),
                gaps,
            ));
        }
    }

    fn check_value_range(&self, points: &[SeriesPoint], report: &mut QualityReport) {
        let max = points
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .fold(f64::MIN, f64::max);
        if max > self.max_plausible_value {
            report.add(QualityIssue::new(
                IssueKind::UnreasonableValue,
                IssueSeverity::Warning,
                format!("implausibly high value detected: {max:.0}"),
                Vec::new(),
            ));
        }
    }

    /// Statistical digest of the series.
    pub fn summarize(points: &[SeriesPoint]) -> DataSummary {
        let values: Vec<f64> = points
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .collect();
        let start = points.iter().map(|p| p.date).min();
        let end = points.iter().map(|p| p.date).max();
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };

        DataSummary {
            total_records: points.len(),
            start,
            end,
            span_days: match (start, end) {
                (Some(s), Some(e)) => (e - s).num_days(),
                _ => 0,
            },
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std: crate::forecast::series::population_std(values.iter().copied()),
            median: if values.is_empty() {
                0.0
            } else {
                quantile(&values, 0.5)
            },
        }
    }
}

/// Clean a series according to the report:
/// - winsorize outliers into the [5th, 95th] percentile band,
/// - fill missing calendar dates by linear interpolation,
/// - clamp negative values to zero.
///
/// Existing valid points keep their position and relative order.
pub fn auto_clean(series: &TimeSeries, report: &QualityReport) -> (TimeSeries, Vec<CleanAction>) {
    let mut points: Vec<SeriesPoint> = series.points().to_vec();
    let mut actions = Vec::new();

    if report.has(IssueKind::Outliers) {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let lower = quantile(&values, 0.05);
        let upper = quantile(&values, 0.95);
        for point in &mut points {
            point.value = point.value.clamp(lower, upper);
        }
        actions.push(CleanAction::WinsorizedOutliers);
        debug!(lower, upper, "winsorized series outliers");
    }

    if report.has(IssueKind::MissingDates) && points.len() > 1 {
        let mut filled: Vec<SeriesPoint> = Vec::with_capacity(points.len());
        for window in points.windows(2) {
            let (a, b) = (window[0], window[1]);
            filled.push(a);
            let gap = (b.date - a.date).num_days();
            for offset in 1..gap {
                let fraction = offset as f64 / gap as f64;
                filled.push(SeriesPoint {
                    date: a.date + Duration::days(offset),
                    value: a.value + (b.value - a.value) * fraction,
                });
            }
        }
        filled.push(*points.last().expect("non-empty"));
        points = filled;
        actions.push(CleanAction::InterpolatedMissingDates);
    }

    if report.has(IssueKind::NegativeValues) {
        for point in &mut points {
            if point.value < 0.0 {
                point.value = 0.0;
            }
        }
        actions.push(CleanAction::ClampedNegatives);
    }

    (TimeSeries::from_points(points), actions)
}

/// Linear-interpolated quantile over unsorted values, matching the
/// default dataframe behavior.
fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let position = q * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let fraction = position - low as f64;
        sorted[low] + (sorted[high] - sorted[low]) * fraction
    }
}
