//! Seasonal additive time-series model.
//!
//! A piecewise-linear trend with a fixed changepoint grid plus Fourier
//! terms for weekly and yearly seasonality, fit by ridge least squares.
//! Point estimates only; the confidence band comes from seeded normal
//! draws over the residual scale.

use super::series::{population_std, TimeSeries};
use chrono::{Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};
use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use thiserror::Error;

/// Fourier order of the weekly component.
const WEEKLY_ORDER: usize = 3;
/// Fourier order of the yearly component.
const YEARLY_ORDER: usize = 10;
/// Days per solar year for the yearly period.
const YEAR_DAYS: f64 = 365.25;
/// Seed for the uncertainty draws, fixed for reproducible intervals.
const UNCERTAINTY_SEED: u64 = 7;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("series too short to fit ({0} points)")]
    TooShort(usize),

    #[error("failed to solve for model coefficients: {0}")]
    Solve(String),

    #[error("model payload decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalModelConfig {
    pub weekly_seasonality: bool,
    pub yearly_seasonality: bool,
    /// L2 prior scale on trend changepoints; smaller is stiffer.
    pub changepoint_prior_scale: f64,
    pub n_changepoints: usize,
    /// Confidence interval mass, e.g. 0.95.
    pub interval_width: f64,
    pub uncertainty_samples: usize,
}

impl SeasonalModelConfig {
    /// Seasonality gates: weekly needs two weeks of data, yearly needs a
    /// quarter of history.
    pub fn for_series_len(len: usize) -> Self {
        Self {
            weekly_seasonality: len >= 14,
            yearly_seasonality: len >= 90,
            changepoint_prior_scale: 0.05,
            n_changepoints: 25,
            interval_width: 0.95,
            uncertainty_samples: 200,
        }
    }
}

/// A trained model: coefficient vector over the feature map plus the
/// residual scale. Serializable so the engine can cache it as bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalModel {
    pub config: SeasonalModelConfig,
    origin: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    coefficients: Vec<f64>,
    sigma: f64,
    last_date: NaiveDate,
}

/// One predicted value with its confidence band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Additive decomposition of the fitted signal.
#[derive(Debug, Clone, Serialize)]
pub struct ModelComponents {
    pub trend: Vec<(NaiveDate, f64)>,
    pub weekly: Vec<(NaiveDate, f64)>,
    pub yearly: Vec<(NaiveDate, f64)>,
}

impl SeasonalModel {
    pub fn fit(series: &TimeSeries, config: SeasonalModelConfig) -> Result<Self, ModelError> {
        let n = series.len();
        if n < 2 {
            return Err(ModelError::TooShort(n));
        }

        let origin = series.first_date().expect("non-empty series");
        let last_date = series.last_date().expect("non-empty series");
        let span_days = ((last_date - origin).num_days() as f64).max(1.0);

        // Changepoints sit on the first 80% of normalized history.
        let n_changepoints = config.n_changepoints.min(n.saturating_sub(2));
        let changepoints: Vec<f64> = (1..=n_changepoints)
            .map(|i| 0.8 * i as f64 / (n_changepoints + 1) as f64)
            .collect();

        let feature_count = feature_count(&config, changepoints.len());
        let mut rows = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        for point in series.points() {
            rows.push(features(point.date, origin, span_days, &changepoints, &config));
            targets.push(point.value);
        }

        // Ridge: penalize the changepoint deltas so the trend only bends
        // where the data insists. Penalty weight is the inverse prior.
        let penalty = (1.0 / config.changepoint_prior_scale).sqrt();
        let n_rows = n + changepoints.len();
        let mut x = DMatrix::zeros(n_rows, feature_count);
        let mut y = DVector::zeros(n_rows);
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                x[(i, j)] = *value;
            }
            y[i] = targets[i];
        }
        for (k, _) in changepoints.iter().enumerate() {
            // Delta columns start after intercept and slope.
            x[(n + k, 2 + k)] = penalty;
        }

        let svd = x.clone().svd(true, true);
        let solution = svd
            .solve(&y, 1e-10)
            .map_err(|e| ModelError::Solve(e.to_string()))?;
        let coefficients: Vec<f64> = solution.iter().copied().collect();

        let residuals: Vec<f64> = rows
            .iter()
            .zip(&targets)
            .map(|(row, target)| target - dot(row, &coefficients))
            .collect();
        let sigma = population_std(residuals.iter().copied());

        Ok(Self {
            config,
            origin,
            span_days,
            changepoints,
            coefficients,
            sigma,
            last_date,
        })
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    /// Point estimate for one date.
    pub fn predict_value(&self, date: NaiveDate) -> f64 {
        let row = features(
            date,
            self.origin,
            self.span_days,
            &self.changepoints,
            &self.config,
        );
        dot(&row, &self.coefficients)
    }

    /// Predict a span of dates with confidence intervals from seeded
    /// normal draws over the residual scale.
    pub fn predict(&self, dates: &[NaiveDate]) -> Vec<ForecastPoint> {
        let mut rng = ChaCha8Rng::seed_from_u64(UNCERTAINTY_SEED);
        let noise = if self.sigma > 0.0 {
            Normal::new(0.0, self.sigma).ok()
        } else {
            None
        };
        let tail = (1.0 - self.config.interval_width) / 2.0;

        dates
            .iter()
            .map(|date| {
                let point = self.predict_value(*date);
                let (lower, upper) = match &noise {
                    Some(noise) => {
                        let mut draws: Vec<f64> = (0..self.config.uncertainty_samples)
                            .map(|_| point + noise.sample(&mut rng))
                            .collect();
                        draws.sort_by(|a, b| a.partial_cmp(b).expect("finite draws"));
                        (
                            draw_quantile(&draws, tail),
                            draw_quantile(&draws, 1.0 - tail),
                        )
                    }
                    None => (point, point),
                };
                ForecastPoint {
                    date: *date,
                    point,
                    lower,
                    upper,
                }
            })
            .collect()
    }

    /// The `periods` future dates immediately after the training data.
    pub fn future_dates(&self, periods: usize) -> Vec<NaiveDate> {
        (1..=periods as i64)
            .map(|offset| self.last_date + Duration::days(offset))
            .collect()
    }

    /// Decompose the fitted signal over the given dates.
    pub fn components(&self, dates: &[NaiveDate]) -> ModelComponents {
        let mut trend = Vec::with_capacity(dates.len());
        let mut weekly = Vec::with_capacity(dates.len());
        let mut yearly = Vec::with_capacity(dates.len());

        let trend_cols = 2 + self.changepoints.len();
        let weekly_cols = if self.config.weekly_seasonality {
            WEEKLY_ORDER * 2
        } else {
            0
        };

        for date in dates {
            let row = features(
                *date,
                self.origin,
                self.span_days,
                &self.changepoints,
                &self.config,
            );
            trend.push((*date, dot(&row[..trend_cols], &self.coefficients[..trend_cols])));
            weekly.push((
                *date,
                dot(
                    &row[trend_cols..trend_cols + weekly_cols],
                    &self.coefficients[trend_cols..trend_cols + weekly_cols],
                ),
            ));
            yearly.push((
                *date,
                dot(
                    &row[trend_cols + weekly_cols..],
                    &self.coefficients[trend_cols + weekly_cols..],
                ),
            ));
        }

        ModelComponents {
            trend,
            weekly,
            yearly,
        }
    }

    /// Serialize the model to bytes for the cache.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(self).map_err(|e| ModelError::Decode(e.to_string()))
    }

    /// Deserialize a cached model payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        serde_json::from_slice(bytes).map_err(|e| ModelError::Decode(e.to_string()))
    }
}

fn feature_count(config: &SeasonalModelConfig, n_changepoints: usize) -> usize {
    let mut count = 2 + n_changepoints;
    if config.weekly_seasonality {
        count += WEEKLY_ORDER * 2;
    }
    if config.yearly_seasonality {
        count += YEARLY_ORDER * 2;
    }
    count
}

fn features(
    date: NaiveDate,
    origin: NaiveDate,
    span_days: f64,
    changepoints: &[f64],
    config: &SeasonalModelConfig,
) -> Vec<f64> {
    let days = (date - origin).num_days() as f64;
    let t = days / span_days;

    let mut row = Vec::with_capacity(feature_count(config, changepoints.len()));
    row.push(1.0);
    row.push(t);
    for cp in changepoints {
        row.push((t - cp).max(0.0));
    }
    if config.weekly_seasonality {
        for k in 1..=WEEKLY_ORDER {
            let arg = 2.0 * std::f64::consts::PI * k as f64 * days / 7.0;
            row.push(arg.sin());
            row.push(arg.cos());
        }
    }
    if config.yearly_seasonality {
        for k in 1..=YEARLY_ORDER {
            let arg = 2.0 * std::f64::consts::PI * k as f64 * days / YEAR_DAYS;
            row.push(arg.sin());
            row.push(arg.cos());
        }
    }
    row
}

fn dot(row: &[f64], coefficients: &[f64]) -> f64 {
    row.iter()
        .zip(coefficients)
        .map(|(a, b)| a * b)
        .sum()
}

fn draw_quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
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

/// Training seam: the engine depends on this trait so tests can count or
/// force-fail training.
pub trait ModelTrainer: Send + Sync {
    fn train(
        &self,
        series: &TimeSeries,
        config: SeasonalModelConfig,
    ) -> Result<SeasonalModel, ModelError>;
}

/// Production trainer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeasonalTrainer;

impl ModelTrainer for SeasonalTrainer {
    fn train(
        &self,
        series: &TimeSeries,
        config: SeasonalModelConfig,
    ) -> Result<SeasonalModel, ModelError> {
        SeasonalModel::fit(series, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::series::SeriesPoint;

    fn day(d: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(d)
    }

    fn series_from(values: Vec<f64>) -> TimeSeries {
        TimeSeries::from_points(
            values
                .into_iter()
                .enumerate()
                .map(|(i, value)| SeriesPoint {
                    date: day(i as i64),
                    value,
                })
                .collect(),
        )
    }

    #[test]
    fn config_gates_follow_series_length() {
        let short = SeasonalModelConfig::for_series_len(10);
        assert!(!short.weekly_seasonality);
        assert!(!short.yearly_seasonality);

        let medium = SeasonalModelConfig::for_series_len(30);
        assert!(medium.weekly_seasonality);
        assert!(!medium.yearly_seasonality);

        let long = SeasonalModelConfig::for_series_len(120);
        assert!(long.weekly_seasonality);
        assert!(long.yearly_seasonality);
        assert_eq!(long.changepoint_prior_scale, 0.05);
        assert_eq!(long.uncertainty_samples, 200);
        assert_eq!(long.interval_width, 0.95);
    }

    #[test]
    fn fits_a_linear_trend() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(60)).unwrap();

        // Ten days past the end of the data, expect ~100 + 2*69.
        let predicted = model.predict_value(day(69));
        assert!((predicted - 238.0).abs() < 5.0, "predicted {predicted}");
    }

    #[test]
    fn recovers_weekly_pattern() {
        // Weekends sell double.
        let values: Vec<f64> = (0..70)
            .map(|i| if i % 7 >= 5 { 200.0 } else { 100.0 })
            .collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(70)).unwrap();

        let weekend = model.predict_value(day(75)); // day 75 % 7 == 5
        let weekday = model.predict_value(day(72)); // day 72 % 7 == 2
        assert!(
            weekend - weekday > 50.0,
            "weekend {weekend}, weekday {weekday}"
        );
    }

    #[test]
    fn intervals_bracket_the_point() {
        let values: Vec<f64> = (0..40).map(|i| 50.0 + (i % 5) as f64).collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(40)).unwrap();

        let frame = model.predict(&model.future_dates(14));
        assert_eq!(frame.len(), 14);
        for point in &frame {
            assert!(point.lower <= point.point);
            assert!(point.point <= point.upper);
        }
    }

    #[test]
    fn prediction_intervals_are_deterministic() {
        let values: Vec<f64> = (0..40).map(|i| 50.0 + (i % 5) as f64).collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(40)).unwrap();

        let first = model.predict(&model.future_dates(7));
        let second = model.predict(&model.future_dates(7));
        assert_eq!(first, second);
    }

    #[test]
    fn roundtrips_through_bytes() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(30)).unwrap();

        let bytes = model.to_bytes().unwrap();
        let restored = SeasonalModel::from_bytes(&bytes).unwrap();
        assert_eq!(
            model.predict_value(day(40)),
            restored.predict_value(day(40))
        );

        assert!(SeasonalModel::from_bytes(b"garbage").is_err());
    }

    #[test]
    fn too_short_series_is_rejected() {
        let series = series_from(vec![5.0]);
        let err = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(1)).unwrap_err();
        assert!(matches!(err, ModelError::TooShort(1)));
    }

    #[test]
    fn components_sum_to_prediction() {
        let values: Vec<f64> = (0..70)
            .map(|i| 100.0 + i as f64 + if i % 7 == 0 { 25.0 } else { 0.0 })
            .collect();
        let series = series_from(values);
        let model = SeasonalModel::fit(&series, SeasonalModelConfig::for_series_len(70)).unwrap();

        let dates = model.future_dates(5);
        let components = model.components(&dates);
        for (i, date) in dates.iter().enumerate() {
            let reassembled =
                components.trend[i].1 + components.weekly[i].1 + components.yearly[i].1;
            assert!((reassembled - model.predict_value(*date)).abs() < 1e-9);
        }
    }
}
