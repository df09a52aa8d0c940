//! Batch forecast flows: top-N isolation and group aggregates.

use chrono::{Duration, NaiveDate, Utc};
use restock_analytics::clients::InventoryApi;
use restock_analytics::forecast::{BatchForecaster, ForecastEngine, SeasonalTrainer};
use restock_analytics::model::{
    DemandTrend, InventoryTurnoverMetric, ProductDemandMetric, RiskLevel, TurnoverClass,
};
use restock_analytics::repository::{AnalyticsRepository, MemoryAnalyticsRepository};
use restock_core::{
    AnalyticsConfig, Clock, DistributedCache, ManualClock, MemoryCacheBackend, ServiceClient,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap() + Duration::days(offset)
}

async fn seed_demand(repo: &MemoryAnalyticsRepository, product_id: i64, windows: i64, revenue: i64) {
    for offset in 0..windows {
        let period_end = day(offset);
        let metric = ProductDemandMetric {
            product_id,
            product_name: format!("Product {product_id}"),
            product_sku: None,
            period_start: period_end - Duration::days(30),
            period_end,
            period_days: 30,
            total_quantity_sold: 300,
            total_orders: 20,
            average_daily_demand: Decimal::from(10),
            max_daily_demand: 14,
            min_daily_demand: 0,
            total_revenue: Decimal::from(revenue),
            average_price: Decimal::from(10),
            trend: DemandTrend::Stable,
            trend_percentage: Decimal::ZERO,
            calculated_at: Utc::now(),
        };
        repo.upsert_product_demand(&metric).await.unwrap();
    }
}

async fn seed_turnover(repo: &MemoryAnalyticsRepository, product_id: i64, warehouse_id: i64) {
    let metric = InventoryTurnoverMetric {
        product_id,
        product_name: format!("Product {product_id}"),
        warehouse_id: Some(warehouse_id),
        warehouse_name: Some(format!("Warehouse {warehouse_id}")),
        period_start: day(0),
        period_end: day(30),
        period_days: 30,
        average_inventory: Decimal::from(100),
        starting_inventory: 150,
        ending_inventory: 50,
        units_sold: 100,
        cost_of_goods_sold: Decimal::from(1000),
        turnover_rate: Decimal::ONE,
        days_of_inventory: Decimal::from(30),
        classification: TurnoverClass::SlowMoving,
        stockout_risk: RiskLevel::Medium,
        overstock_risk: RiskLevel::Low,
        calculated_at: Utc::now(),
    };
    repo.upsert_turnover(&metric).await.unwrap();
}

fn forecaster_for(repo: Arc<MemoryAnalyticsRepository>) -> BatchForecaster {
    let cache = Arc::new(DistributedCache::new(
        "test",
        Arc::new(MemoryCacheBackend::new()),
    ));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_date(day(40)));
    let trainer = Arc::new(SeasonalTrainer);
    let engine = Arc::new(ForecastEngine::new(
        Arc::clone(&repo) as Arc<dyn AnalyticsRepository>,
        cache,
        clock,
        AnalyticsConfig::default(),
        trainer.clone(),
    ));
    let inventory = InventoryApi::new(Arc::new(ServiceClient::new(
        HashMap::new(),
        StdDuration::from_secs(1),
    )));
    BatchForecaster::new(engine, repo, inventory, trainer)
}

#[tokio::test]
async fn top_products_isolate_per_product_failures() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40, 9000).await;
    seed_demand(&repo, 2, 40, 8000).await;
    seed_demand(&repo, 3, 40, 7000).await;
    repo.poison_product(3);

    let forecaster = forecaster_for(Arc::clone(&repo));
    let entries = forecaster.forecast_top_products(10, 14).await.unwrap();

    assert_eq!(entries.len(), 3);
    // Revenue rank orders the entries.
    assert_eq!(entries[0].product_id, 1);
    assert_eq!(entries[1].product_id, 2);
    assert_eq!(entries[0].status, "success");
    assert_eq!(entries[0].forecast.len(), 14);
    assert_eq!(entries[2].product_id, 3);
    assert_eq!(entries[2].status, "error");
    assert!(entries[2].forecast.is_empty());
}

#[tokio::test]
async fn worker_override_preserves_rank_order() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40, 9000).await;
    seed_demand(&repo, 2, 40, 8000).await;

    let forecaster = forecaster_for(Arc::clone(&repo));
    let entries = forecaster
        .forecast_top_products_with_workers(10, 7, 4)
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].product_id, 1);
    assert_eq!(entries[1].product_id, 2);
    assert!(entries.iter().all(|e| e.status == "success"));
}

#[tokio::test]
async fn warehouse_aggregate_sums_member_series() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40, 9000).await;
    seed_demand(&repo, 2, 40, 8000).await;
    seed_turnover(&repo, 1, 5).await;
    seed_turnover(&repo, 2, 5).await;

    let forecaster = forecaster_for(Arc::clone(&repo));
    let group = forecaster.forecast_warehouse(5, 14).await.unwrap();

    assert_eq!(group.id, 5);
    // Upstream name lookup is down; the fallback label is used.
    assert_eq!(group.name, "Warehouse 5");
    assert_eq!(group.products_count, 2);
    assert_eq!(group.forecast.len(), 14);
    // Two products at ~10/day each: the aggregate forecast sits near 20.
    let mean: f64 =
        group.forecast.iter().map(|p| p.point).sum::<f64>() / group.forecast.len() as f64;
    assert!((mean - 20.0).abs() < 3.0, "aggregate mean {mean}");
}

#[tokio::test]
async fn empty_warehouse_is_no_data() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    let forecaster = forecaster_for(Arc::clone(&repo));

    let err = forecaster.forecast_warehouse(9, 14).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn category_lookup_failure_surfaces_upstream_error() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    let forecaster = forecaster_for(Arc::clone(&repo));

    // No inventory upstream is configured, so the category product
    // enumeration itself fails.
    let err = forecaster.forecast_category(3, 14).await.unwrap_err();
    assert_eq!(err.http_status(), 503);
}
