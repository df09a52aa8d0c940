//! # Forecast Engine
//!
//! Produces forecasts per scope with model caching keyed by a data
//! fingerprint, a short result cache, and a moving-average fallback when
//! training fails. Cache failures are never fatal; they degrade to
//! on-demand training.

use super::model::{
    ForecastPoint, ModelComponents, ModelTrainer, SeasonalModel, SeasonalModelConfig,
};
use super::series::{PreparedSeries, TimeSeries};
use super::{MODEL_TAG_MOVING_AVERAGE, MODEL_TAG_SEASONAL, MODEL_VERSION};
use crate::error::{AnalyticsError, Result};
use crate::quality::{auto_clean, DataQualityValidator};
use crate::repository::AnalyticsRepository;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use restock_core::{AnalyticsConfig, Clock, DistributedCache};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Identity of a forecast series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastScope {
    /// Company-wide daily sales totals.
    TotalSales,
    /// One product's daily demand.
    Product(i64),
}

impl fmt::Display for ForecastScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastScope::TotalSales => write!(f, "total_sales"),
            ForecastScope::Product(id) => write!(f, "product:{id}"),
        }
    }
}

impl ForecastScope {
    fn model_key(&self) -> String {
        format!("model:{self}")
    }

    fn result_key(&self, periods: usize) -> String {
        format!("forecast:{self}:{periods}")
    }
}

/// A materialized forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrame {
    pub points: Vec<ForecastPoint>,
    pub model_tag: String,
}

impl ForecastFrame {
    /// Sum of the first `days` predicted points.
    pub fn horizon_sum(&self, days: usize) -> f64 {
        self.points.iter().take(days).map(|p| p.point).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyMetrics {
    pub mape: f64,
    pub rmse: f64,
    pub mae: f64,
    pub sample_size: usize,
}

/// Cached model envelope. The fingerprint is the sole invalidation
/// signal; a version mismatch counts as a decode failure and forces a
/// retrain.
#[derive(Debug, Serialize, Deserialize)]
struct ModelEnvelope {
    version: String,
    fingerprint: String,
    cached_at: DateTime<Utc>,
    body: Vec<u8>,
}

enum ModelOutcome {
    Ready(SeasonalModel),
    /// Training failed; serve the moving-average fallback.
    Degraded,
    Empty,
}

pub struct ForecastEngine {
    repo: Arc<dyn AnalyticsRepository>,
    cache: Arc<DistributedCache>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
    trainer: Arc<dyn ModelTrainer>,
    validator: DataQualityValidator,
    /// Best-effort per-scope lock so concurrent callers do not all train
    /// the same model; duplicate trainers remain permitted (last write
    /// wins in the cache).
    train_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ForecastEngine {
    pub fn new(
        repo: Arc<dyn AnalyticsRepository>,
        cache: Arc<DistributedCache>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Self {
        Self {
            repo,
            cache,
            clock,
            config,
            trainer,
            validator: DataQualityValidator::default(),
            train_locks: DashMap::new(),
        }
    }

    /// Pull and clean the historical series for a scope, most recent
    /// `days_history` observations, date ascending.
    pub async fn prepare(
        &self,
        scope: ForecastScope,
        days_history: usize,
    ) -> Result<PreparedSeries> {
        let raw: Vec<(Option<NaiveDate>, f64)> = match scope {
            ForecastScope::TotalSales => self
                .repo
                .daily_sales_tail(days_history as i64)
                .await?
                .into_iter()
                .map(|m| {
                    (
                        Some(m.date),
                        m.total_sales.to_f64().unwrap_or(f64::NAN),
                    )
                })
                .collect(),
            ForecastScope::Product(product_id) => self
                .repo
                .demand_tail_for_product(product_id, days_history as i64)
                .await?
                .into_iter()
                .map(|m| {
                    (
                        Some(m.period_end),
                        m.average_daily_demand.to_f64().unwrap_or(f64::NAN),
                    )
                })
                .collect(),
        };

        let prepared = TimeSeries::prepare(raw);
        if prepared.dropped > 0 {
            debug!(
                %scope,
                dropped = prepared.dropped,
                kept = prepared.series.len(),
                "dropped invalid rows during series preparation"
            );
        }
        Ok(prepared)
    }

    /// Forecast `periods` days ahead for a scope. Returns `None` when the
    /// scope has no history at all. A training failure degrades to the
    /// moving-average fallback and is reported as a normal success frame.
    pub async fn forecast(
        &self,
        scope: ForecastScope,
        periods: usize,
        use_cache: bool,
    ) -> Result<Option<ForecastFrame>> {
        validate_periods(periods)?;

        let series = self.clean_series(scope).await?;
        if series.is_empty() {
            warn!(%scope, "no history available, cannot forecast");
            return Ok(None);
        }

        let last_date = series.last_date().expect("non-empty series");
        match self.obtain_model(scope, &series, use_cache).await? {
            ModelOutcome::Ready(model) => {
                let points = model.predict(&model.future_dates(periods));
                Ok(Some(ForecastFrame {
                    points,
                    model_tag: MODEL_TAG_SEASONAL.to_string(),
                }))
            }
            ModelOutcome::Degraded => Ok(Some(moving_average_frame(&series, last_date, periods))),
            ModelOutcome::Empty => Ok(None),
        }
    }

    /// Result-cached variant for the read path. The cache key carries the
    /// scope and horizon but not the data fingerprint, so a data change
    /// without an explicit invalidation can serve a stale frame for up to
    /// the result TTL.
    pub async fn cached_forecast(
        &self,
        scope: ForecastScope,
        periods: usize,
    ) -> Result<Option<ForecastFrame>> {
        validate_periods(periods)?;

        let key = scope.result_key(periods);
        if let Some(frame) = self.cache.get_json::<ForecastFrame>(&key).await {
            return Ok(Some(frame));
        }

        let frame = self.forecast(scope, periods, true).await?;
        if let Some(frame) = &frame {
            self.cache
                .set_json(
                    &key,
                    frame,
                    Some(StdDuration::from_secs(self.config.forecast_result_ttl_seconds)),
                )
                .await;
        }
        Ok(frame)
    }

    /// Decompose the fitted signal for a scope over its history.
    pub async fn components(&self, scope: ForecastScope) -> Result<Option<ModelComponents>> {
        let series = self.clean_series(scope).await?;
        if series.is_empty() {
            return Ok(None);
        }

        match self.obtain_model(scope, &series, true).await? {
            ModelOutcome::Ready(model) => {
                let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.date).collect();
                Ok(Some(model.components(&dates)))
            }
            _ => Ok(None),
        }
    }

    /// In-sample accuracy: join the history with the model's fitted
    /// values and compute MAPE, RMSE and MAE.
    pub async fn accuracy(&self, scope: ForecastScope) -> Result<Option<AccuracyMetrics>> {
        let series = self.clean_series(scope).await?;
        if series.is_empty() {
            return Ok(None);
        }

        let model = match self.obtain_model(scope, &series, true).await? {
            ModelOutcome::Ready(model) => model,
            _ => return Ok(None),
        };

        let mut abs_errors = Vec::new();
        let mut sq_errors = Vec::new();
        let mut pct_errors = Vec::new();
        for point in series.points() {
            let predicted = model.predict_value(point.date);
            let error = point.value - predicted;
            abs_errors.push(error.abs());
            sq_errors.push(error * error);
            if point.value != 0.0 {
                pct_errors.push((error / point.value).abs());
            }
        }

        if abs_errors.is_empty() {
            return Ok(None);
        }

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let mape = if pct_errors.is_empty() {
            0.0
        } else {
            mean(&pct_errors) * 100.0
        };
        Ok(Some(AccuracyMetrics {
            mape: round2(mape),
            rmse: round2(mean(&sq_errors).sqrt()),
            mae: round2(mean(&abs_errors)),
            sample_size: abs_errors.len(),
        }))
    }

    /// Drop the cached model and every cached result frame for the given
    /// products. Upstream services call this after mutations that change
    /// a product's demand fingerprint.
    pub async fn invalidate_products(&self, product_ids: &[i64]) -> u64 {
        let mut removed = 0;
        for product_id in product_ids {
            let scope = ForecastScope::Product(*product_id);
            if self.cache.delete(&scope.model_key()).await {
                removed += 1;
            }
            removed += self
                .cache
                .delete_pattern(&format!("forecast:product:{product_id}:*"))
                .await;
        }
        info!(products = product_ids.len(), removed, "forecast caches invalidated");
        removed
    }

    async fn clean_series(&self, scope: ForecastScope) -> Result<TimeSeries> {
        let prepared = self.prepare(scope, 365).await?;
        if prepared.series.is_empty() {
            return Ok(prepared.series);
        }

        let report = self.validator.validate(prepared.series.points());
        if report.issues.is_empty() {
            return Ok(prepared.series);
        }

        warn!(
            %scope,
            score = report.quality_score,
            issues = report.issues.len(),
            "data quality issues detected, auto-cleaning"
        );
        let (cleaned, actions) = auto_clean(&prepared.series, &report);
        if !actions.is_empty() {
            debug!(%scope, ?actions, "auto-clean applied");
        }
        Ok(cleaned)
    }

    async fn obtain_model(
        &self,
        scope: ForecastScope,
        series: &TimeSeries,
        use_cache: bool,
    ) -> Result<ModelOutcome> {
        if series.is_empty() {
            return Ok(ModelOutcome::Empty);
        }

        let fingerprint = series.fingerprint();

        if use_cache {
            if let Some(model) = self.load_cached_model(scope, &fingerprint).await {
                debug!(%scope, "using cached forecast model");
                return Ok(ModelOutcome::Ready(model));
            }
        }

        // One trainer per scope per process; losers of the race re-check
        // the cache before training.
        let lock = self
            .train_locks
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if use_cache {
            if let Some(model) = self.load_cached_model(scope, &fingerprint).await {
                return Ok(ModelOutcome::Ready(model));
            }
        }

        let config = SeasonalModelConfig::for_series_len(series.len());
        let trainer = Arc::clone(&self.trainer);
        let training_series = series.clone();
        let trained = tokio::task::spawn_blocking(move || trainer.train(&training_series, config))
            .await
            .map_err(|e| AnalyticsError::Forecast(format!("training task panicked: {e}")))?;

        match trained {
            Ok(model) => {
                if use_cache {
                    self.store_model(scope, &fingerprint, &model).await;
                }
                Ok(ModelOutcome::Ready(model))
            }
            Err(e) => {
                warn!(%scope, error = %e, "model training failed, degrading to moving average");
                Ok(ModelOutcome::Degraded)
            }
        }
    }

    async fn load_cached_model(
        &self,
        scope: ForecastScope,
        fingerprint: &str,
    ) -> Option<SeasonalModel> {
        let envelope: ModelEnvelope = self.cache.get_json(&scope.model_key()).await?;
        if envelope.version != MODEL_VERSION {
            debug!(%scope, version = %envelope.version, "cached model version mismatch");
            return None;
        }
        if envelope.fingerprint != fingerprint {
            debug!(%scope, "cached model fingerprint is stale");
            return None;
        }
        match SeasonalModel::from_bytes(&envelope.body) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(%scope, error = %e, "cached model body failed to decode");
                None
            }
        }
    }

    async fn store_model(&self, scope: ForecastScope, fingerprint: &str, model: &SeasonalModel) {
        let body = match model.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                warn!(%scope, error = %e, "model serialization failed, not caching");
                return;
            }
        };
        let envelope = ModelEnvelope {
            version: MODEL_VERSION.to_string(),
            fingerprint: fingerprint.to_string(),
            cached_at: self.clock.now(),
            body,
        };
        self.cache
            .set_json(
                &scope.model_key(),
                &envelope,
                Some(StdDuration::from_secs(self.config.model_cache_ttl_seconds)),
            )
            .await;
        debug!(%scope, "cached trained model");
    }
}

fn validate_periods(periods: usize) -> Result<()> {
    if !(1..=365).contains(&periods) {
        return Err(AnalyticsError::InvalidInput(format!(
            "periods must be between 1 and 365 (got {periods})"
        )));
    }
    Ok(())
}

/// Graceful-degradation forecast: the mean of the last up-to-7 points,
/// with a flat ±20% band (floored at zero).
pub(crate) fn moving_average_frame(
    series: &TimeSeries,
    last_date: NaiveDate,
    periods: usize,
) -> ForecastFrame {
    let mean = series.tail_mean(7);
    let points = (1..=periods as i64)
        .map(|offset| ForecastPoint {
            date: last_date + Duration::days(offset),
            point: mean,
            lower: (mean * 0.8).max(0.0),
            upper: mean * 1.2,
        })
        .collect();
    ForecastFrame {
        points,
        model_tag: MODEL_TAG_MOVING_AVERAGE.to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::series::SeriesPoint;

    #[test]
    fn scope_keys_match_the_cache_contract() {
        assert_eq!(ForecastScope::TotalSales.to_string(), "total_sales");
        assert_eq!(ForecastScope::Product(7).to_string(), "product:7");
        assert_eq!(ForecastScope::Product(7).model_key(), "model:product:7");
        assert_eq!(
            ForecastScope::Product(7).result_key(30),
            "forecast:product:7:30"
        );
    }

    #[test]
    fn periods_are_validated() {
        assert!(validate_periods(1).is_ok());
        assert!(validate_periods(365).is_ok());
        assert!(validate_periods(0).is_err());
        assert!(validate_periods(366).is_err());
    }

    #[test]
    fn moving_average_fallback_shape() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let points: Vec<SeriesPoint> = (1..=10)
            .map(|d| SeriesPoint {
                date: day(d),
                value: 5.0,
            })
            .collect();
        let series = TimeSeries::from_points(points);

        let frame = moving_average_frame(&series, day(10), 30);
        assert_eq!(frame.points.len(), 30);
        assert_eq!(frame.model_tag, MODEL_TAG_MOVING_AVERAGE);
        assert_eq!(frame.points[0].date, day(11));
        for point in &frame.points {
            assert_eq!(point.point, 5.0);
            assert_eq!(point.lower, 4.0);
            assert_eq!(point.upper, 6.0);
        }
    }

    #[test]
    fn frame_horizon_sums() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let frame = ForecastFrame {
            points: (1..=10)
                .map(|d| ForecastPoint {
                    date: day(d),
                    point: 2.0,
                    lower: 1.0,
                    upper: 3.0,
                })
                .collect(),
            model_tag: MODEL_TAG_SEASONAL.to_string(),
        };
        assert_eq!(frame.horizon_sum(7), 14.0);
        assert_eq!(frame.horizon_sum(100), 20.0);
    }
}
