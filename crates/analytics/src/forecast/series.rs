use chrono::NaiveDate;
use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use statrs::distribution::Normal;
use std::collections::BTreeMap;

/// Deterministic seed for the constant-series jitter.
const JITTER_SEED: u64 = 42;

/// One observation of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A cleaned, date-ascending time series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    points: Vec<SeriesPoint>,
}

/// Result of preparing raw rows: the series plus how many rows were
/// dropped as invalid.
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    pub series: TimeSeries,
    pub dropped: usize,
}

impl TimeSeries {
    /// Build from already-clean points (ascending dates, finite values).
    pub fn from_points(points: Vec<SeriesPoint>) -> Self {
        Self { points }
    }

    /// Prepare raw rows for modeling:
    /// - drop rows with a missing date or non-finite value,
    /// - clamp negatives to zero,
    /// - aggregate duplicate dates by summing,
    /// - sort ascending,
    /// - add near-zero seeded jitter when the series is constant so the
    ///   downstream optimizer converges.
    pub fn prepare(raw: Vec<(Option<NaiveDate>, f64)>) -> PreparedSeries {
        let before = raw.len();

        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut kept = 0usize;
        for (date, value) in raw {
            let Some(date) = date else { continue };
            if !value.is_finite() {
                continue;
            }
            kept += 1;
            *by_date.entry(date).or_insert(0.0) += value.max(0.0);
        }

        let mut points: Vec<SeriesPoint> = by_date
            .into_iter()
            .map(|(date, value)| SeriesPoint { date, value })
            .collect();

        if points.len() > 1 && population_std(points.iter().map(|p| p.value)) < 1e-12 {
            let mut rng = ChaCha8Rng::seed_from_u64(JITTER_SEED);
            let noise = Normal::new(0.0, 1e-6).expect("valid jitter distribution");
            for point in &mut points {
                point.value += noise.sample(&mut rng);
            }
        }

        PreparedSeries {
            series: Self { points },
            dropped: before - kept,
        }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn sum(&self) -> f64 {
        self.values().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.points.is_empty() {
            0.0
        } else {
            self.sum() / self.points.len() as f64
        }
    }

    /// Population standard deviation (ddof = 0), so a single point yields
    /// zero instead of NaN.
    pub fn std(&self) -> f64 {
        population_std(self.values())
    }

    /// Mean of the trailing `window` values.
    pub fn tail_mean(&self, window: usize) -> f64 {
        let window = window.min(self.points.len());
        if window == 0 {
            return 0.0;
        }
        let tail = &self.points[self.points.len() - window..];
        tail.iter().map(|p| p.value).sum::<f64>() / window as f64
    }

    /// Deterministic fingerprint of the data a model was trained on:
    /// a digest of `(row_count, sum_of_values, last_5_values)`. This is
    /// the sole invalidation signal for the cached model.
    pub fn fingerprint(&self) -> String {
        let tail: Vec<f64> = self
            .points
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|p| p.value)
            .collect();
        let material = format!("{}_{}_{:?}", self.len(), self.sum(), tail);
        let digest = Sha256::digest(material.as_bytes());
        format!("{digest:x}")
    }
}

pub(crate) fn population_std(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn prepare_drops_invalid_and_sorts() {
        let prepared = TimeSeries::prepare(vec![
            (Some(day(3)), 5.0),
            (Some(day(1)), f64::NAN),
            (None, 7.0),
            (Some(day(2)), -4.0),
            (Some(day(1)), 1.0),
        ]);

        assert_eq!(prepared.dropped, 2);
        let series = prepared.series;
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_date(), Some(day(1)));
        // Negative clamped to zero.
        assert_eq!(series.points()[1].value, 0.0);
    }

    #[test]
    fn prepare_sums_duplicate_dates() {
        let prepared = TimeSeries::prepare(vec![
            (Some(day(1)), 2.0),
            (Some(day(1)), 3.0),
            (Some(day(2)), 4.0),
        ]);
        let series = prepared.series;
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].value, 5.0);
    }

    #[test]
    fn constant_series_gets_deterministic_jitter() {
        let raw: Vec<_> = (1..=20).map(|d| (Some(day(d)), 5.0)).collect();
        let first = TimeSeries::prepare(raw.clone()).series;
        let second = TimeSeries::prepare(raw).series;

        assert!(first.std() > 0.0);
        assert!(first.std() < 1e-4);
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_data_changes() {
        let base: Vec<_> = (1..=10).map(|d| (Some(day(d)), d as f64)).collect();
        let series = TimeSeries::prepare(base.clone()).series;

        let mut changed_raw = base;
        changed_raw[9].1 = 99.0;
        let changed = TimeSeries::prepare(changed_raw).series;

        assert_ne!(series.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn population_std_of_single_point_is_zero() {
        let series = TimeSeries::prepare(vec![(Some(day(1)), 7.0)]).series;
        assert_eq!(series.std(), 0.0);
    }

    #[test]
    fn tail_mean_uses_trailing_window() {
        let raw: Vec<_> = (1..=10).map(|d| (Some(day(d)), d as f64)).collect();
        let series = TimeSeries::prepare(raw).series;
        assert_eq!(series.tail_mean(2), 9.5);
        assert_eq!(series.tail_mean(100), 5.5);
    }
}
