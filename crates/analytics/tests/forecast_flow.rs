//! Forecast engine flows: fallback, model-cache reuse, fingerprint
//! staleness and explicit invalidation.

use chrono::{Duration, NaiveDate, Utc};
use restock_analytics::forecast::{
    ForecastEngine, ForecastScope, ModelError, ModelTrainer, SeasonalModel, SeasonalModelConfig,
    SeasonalTrainer, TimeSeries,
};
use restock_analytics::model::{DailySalesMetric, DemandTrend, ProductDemandMetric};
use restock_analytics::repository::{AnalyticsRepository, MemoryAnalyticsRepository};
use restock_core::{AnalyticsConfig, Clock, DistributedCache, ManualClock, MemoryCacheBackend};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap() + Duration::days(offset)
}

/// Trainer that counts real trainings, the observable seam for the cache
/// tests.
struct CountingTrainer {
    trained: AtomicUsize,
    inner: SeasonalTrainer,
}

impl CountingTrainer {
    fn new() -> Self {
        Self {
            trained: AtomicUsize::new(0),
            inner: SeasonalTrainer,
        }
    }

    fn count(&self) -> usize {
        self.trained.load(Ordering::SeqCst)
    }
}

impl ModelTrainer for CountingTrainer {
    fn train(
        &self,
        series: &TimeSeries,
        config: SeasonalModelConfig,
    ) -> Result<SeasonalModel, ModelError> {
        self.trained.fetch_add(1, Ordering::SeqCst);
        self.inner.train(series, config)
    }
}

/// Trainer that always fails, forcing the moving-average fallback.
struct FailingTrainer;

impl ModelTrainer for FailingTrainer {
    fn train(
        &self,
        _series: &TimeSeries,
        _config: SeasonalModelConfig,
    ) -> Result<SeasonalModel, ModelError> {
        Err(ModelError::Solve("forced failure".to_string()))
    }
}

async fn seed_daily_sales(repo: &MemoryAnalyticsRepository, days: i64, value: i64) {
    for offset in 0..days {
        let date = day(offset);
        let mut metric = DailySalesMetric::empty(date, Utc::now());
        metric.total_sales = Decimal::from(value);
        metric.total_orders = 1;
        metric.recalculate_average();
        repo.upsert_daily_sales(&metric).await.unwrap();
    }
}

async fn seed_product_demand(repo: &MemoryAnalyticsRepository, product_id: i64, windows: i64) {
    for offset in 0..windows {
        let period_end = day(offset);
        let demand = if offset % 2 == 0 { 8 } else { 12 };
        let metric = ProductDemandMetric {
            product_id,
            product_name: format!("Product {product_id}"),
            product_sku: Some(format!("SKU-{product_id}")),
            period_start: period_end - Duration::days(30),
            period_end,
            period_days: 30,
            total_quantity_sold: demand * 30,
            total_orders: 20,
            average_daily_demand: Decimal::from(demand),
            max_daily_demand: demand + 3,
            min_daily_demand: 0,
            total_revenue: Decimal::from(demand * 300),
            average_price: Decimal::from(10),
            trend: DemandTrend::Stable,
            trend_percentage: Decimal::ZERO,
            calculated_at: Utc::now(),
        };
        repo.upsert_product_demand(&metric).await.unwrap();
    }
}

fn engine_with(
    repo: Arc<MemoryAnalyticsRepository>,
    trainer: Arc<dyn ModelTrainer>,
) -> ForecastEngine {
    let cache = Arc::new(DistributedCache::new(
        "test",
        Arc::new(MemoryCacheBackend::new()),
    ));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_date(day(60)));
    ForecastEngine::new(repo, cache, clock, AnalyticsConfig::default(), trainer)
}

#[tokio::test]
async fn constant_series_with_failed_training_falls_back_to_moving_average() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 40, 5).await;

    let engine = engine_with(Arc::clone(&repo), Arc::new(FailingTrainer));
    let frame = engine
        .forecast(ForecastScope::TotalSales, 30, true)
        .await
        .unwrap()
        .expect("fallback frame");

    assert_eq!(frame.points.len(), 30);
    assert_eq!(frame.model_tag, "moving_average");
    for point in &frame.points {
        assert!((point.point - 5.0).abs() < 1e-3, "point {}", point.point);
        assert!((point.lower - 4.0).abs() < 1e-3, "lower {}", point.lower);
        assert!((point.upper - 6.0).abs() < 1e-3, "upper {}", point.upper);
    }
    // Future dates start the day after the last observation.
    assert_eq!(frame.points[0].date, day(40));
}

#[tokio::test]
async fn unchanged_fingerprint_reuses_the_cached_model() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 60, 100).await;

    let trainer = Arc::new(CountingTrainer::new());
    let engine = engine_with(Arc::clone(&repo), Arc::clone(&trainer) as Arc<dyn ModelTrainer>);

    let first = engine
        .forecast(ForecastScope::TotalSales, 14, true)
        .await
        .unwrap()
        .expect("frame");
    let second = engine
        .forecast(ForecastScope::TotalSales, 14, true)
        .await
        .unwrap()
        .expect("frame");

    assert_eq!(trainer.count(), 1, "second call must reuse the cached model");
    assert_eq!(first.points.len(), second.points.len());
}

#[tokio::test]
async fn changed_data_retrains() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 60, 100).await;

    let trainer = Arc::new(CountingTrainer::new());
    let engine = engine_with(Arc::clone(&repo), Arc::clone(&trainer) as Arc<dyn ModelTrainer>);

    engine
        .forecast(ForecastScope::TotalSales, 14, true)
        .await
        .unwrap();
    assert_eq!(trainer.count(), 1);

    // New data lands; the fingerprint moves and forces a retrain.
    let mut metric = DailySalesMetric::empty(day(60), Utc::now());
    metric.total_sales = Decimal::from(250);
    metric.total_orders = 2;
    metric.recalculate_average();
    repo.upsert_daily_sales(&metric).await.unwrap();

    engine
        .forecast(ForecastScope::TotalSales, 14, true)
        .await
        .unwrap();
    assert_eq!(trainer.count(), 2);
}

#[tokio::test]
async fn invalidation_forces_a_retrain_for_the_product() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_product_demand(&repo, 7, 40).await;

    let trainer = Arc::new(CountingTrainer::new());
    let engine = engine_with(Arc::clone(&repo), Arc::clone(&trainer) as Arc<dyn ModelTrainer>);

    let scope = ForecastScope::Product(7);
    engine.forecast(scope, 14, true).await.unwrap();
    engine.forecast(scope, 14, true).await.unwrap();
    assert_eq!(trainer.count(), 1);

    let removed = engine.invalidate_products(&[7]).await;
    assert!(removed >= 1);

    engine.forecast(scope, 14, true).await.unwrap();
    assert_eq!(trainer.count(), 2);
}

#[tokio::test]
async fn result_cache_serves_repeat_reads() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 60, 100).await;

    let trainer = Arc::new(CountingTrainer::new());
    let engine = engine_with(Arc::clone(&repo), Arc::clone(&trainer) as Arc<dyn ModelTrainer>);

    let first = engine
        .cached_forecast(ForecastScope::TotalSales, 30)
        .await
        .unwrap()
        .expect("frame");
    let second = engine
        .cached_forecast(ForecastScope::TotalSales, 30)
        .await
        .unwrap()
        .expect("frame");

    assert_eq!(first, second);
    assert_eq!(trainer.count(), 1);
}

#[tokio::test]
async fn empty_scope_yields_no_forecast() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    let engine = engine_with(Arc::clone(&repo), Arc::new(SeasonalTrainer));

    let frame = engine
        .forecast(ForecastScope::TotalSales, 30, true)
        .await
        .unwrap();
    assert!(frame.is_none());
}

#[tokio::test]
async fn invalid_periods_are_rejected() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    let engine = engine_with(Arc::clone(&repo), Arc::new(SeasonalTrainer));

    let err = engine
        .forecast(ForecastScope::TotalSales, 0, true)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);

    let err = engine
        .forecast(ForecastScope::TotalSales, 400, true)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn accuracy_reports_in_sample_errors() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 60, 100).await;

    let engine = engine_with(Arc::clone(&repo), Arc::new(SeasonalTrainer));
    let metrics = engine
        .accuracy(ForecastScope::TotalSales)
        .await
        .unwrap()
        .expect("accuracy metrics");

    assert_eq!(metrics.sample_size, 60);
    assert!(metrics.mape >= 0.0);
    assert!(metrics.rmse >= 0.0);
    assert!(metrics.mae >= 0.0);
}

#[tokio::test]
async fn components_decompose_the_signal() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_daily_sales(&repo, 60, 100).await;

    let engine = engine_with(Arc::clone(&repo), Arc::new(SeasonalTrainer));
    let components = engine
        .components(ForecastScope::TotalSales)
        .await
        .unwrap()
        .expect("components");

    assert_eq!(components.trend.len(), 60);
    assert_eq!(components.weekly.len(), 60);
    assert_eq!(components.yearly.len(), 60);
}
