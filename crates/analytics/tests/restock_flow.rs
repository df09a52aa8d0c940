//! Restock analyzer flows: reorder-point math, priority escalation and
//! bulk isolation.

use chrono::{Duration, NaiveDate, Utc};
use restock_analytics::clients::InventoryApi;
use restock_analytics::forecast::{ForecastEngine, SeasonalTrainer};
use restock_analytics::model::{DemandTrend, ProductDemandMetric, RecommendationStatus, ReorderPriority};
use restock_analytics::repository::{AnalyticsRepository, MemoryAnalyticsRepository};
use restock_analytics::restock::{BulkRequest, RestockAnalyzer};
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

/// Alternating 8/12 daily demand: mean 10, population std 2.
async fn seed_demand(repo: &MemoryAnalyticsRepository, product_id: i64, windows: i64) {
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

fn analyzer_for(repo: Arc<MemoryAnalyticsRepository>) -> Arc<RestockAnalyzer> {
    let cache = Arc::new(DistributedCache::new(
        "test",
        Arc::new(MemoryCacheBackend::new()),
    ));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_date(day(40)));
    let config = AnalyticsConfig::default();
    let engine = Arc::new(ForecastEngine::new(
        Arc::clone(&repo) as Arc<dyn AnalyticsRepository>,
        cache,
        Arc::clone(&clock),
        config.clone(),
        Arc::new(SeasonalTrainer),
    ));
    // No inventory upstream is configured; stock lookups degrade to
    // zero, which the bulk tests rely on.
    let inventory = InventoryApi::new(Arc::new(ServiceClient::new(
        HashMap::new(),
        StdDuration::from_secs(1),
    )));
    Arc::new(RestockAnalyzer::new(
        engine,
        repo,
        inventory,
        clock,
        config,
    ))
}

#[tokio::test]
async fn reorder_point_math_matches_the_contract() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 7, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    let analysis = analyzer.reorder_point(7, 7, 0.95, 30).await.unwrap();

    // D = 10/day, sigma = 2, z(0.95) ~ 1.645:
    // safety = round(1.645 * 2 * sqrt(7)) = 9, lead demand = 70.
    assert_eq!(analysis.daily_demand_mean, 10.0);
    assert_eq!(analysis.daily_demand_std, 2.0);
    assert_eq!(analysis.safety_stock, 9);
    assert_eq!(analysis.lead_time_demand, 70);
    assert_eq!(analysis.reorder_point, 79);
    assert_eq!(analysis.economic_order_quantity, 300);
    assert!(analysis.forecast_7d > 0.0);
    assert!(analysis.forecast_30d >= analysis.forecast_7d);
}

#[tokio::test]
async fn invalid_service_level_is_rejected() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 7, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    assert!(analyzer.reorder_point(7, 7, 1.5, 30).await.is_err());
    assert!(analyzer.reorder_point(7, 7, 0.0, 30).await.is_err());
}

#[tokio::test]
async fn zero_stock_is_critical() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 7, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    let risk = analyzer.stockout_risk(7, 0, 7, 30).await.unwrap();
    assert_eq!(risk.priority, ReorderPriority::Critical);
    assert_eq!(risk.priority_score, 100);
    assert!(risk.should_reorder);
    assert!(risk.recommended_order_quantity > 0);
}

#[tokio::test]
async fn stockout_simulation_finds_the_depletion_day() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 7, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    // ~10 units/day of forecast demand against 35 on hand.
    let risk = analyzer.stockout_risk(7, 35, 7, 30).await.unwrap();
    let days = risk.days_until_stockout.expect("stockout within horizon");
    assert!((2..=4).contains(&days), "days {days}");
    assert_eq!(
        risk.stockout_date,
        Some(day(40) + Duration::days(days))
    );
    // 35 on hand is under half the ~79 reorder point.
    assert_eq!(risk.priority, ReorderPriority::Urgent);
    assert_eq!(risk.priority_score, 80);
}

#[tokio::test]
async fn recommendation_is_assembled_for_persistence() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 7, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    let rec = analyzer
        .generate_recommendation(7, Some(2), 35, 5, 7)
        .await
        .unwrap();

    assert_eq!(rec.product_id, 7);
    assert_eq!(rec.product_name, "Product 7");
    assert_eq!(rec.product_sku.as_deref(), Some("SKU-7"));
    assert_eq!(rec.warehouse_id, Some(2));
    assert_eq!(rec.current_stock, 35);
    assert_eq!(rec.min_stock_level, 5);
    assert_eq!(rec.status, RecommendationStatus::Pending);
    // max(EOQ, reorder_point - current + safety) with EOQ = 300.
    assert_eq!(rec.recommended_order_quantity, 300);
    assert!(rec.stockout_date_estimate.is_some());
    assert!(rec.recommended_order_date.is_some());

    assert!(repo.upsert_recommendation(&rec).await.unwrap());
    // Same key on the same day: update, not insert.
    assert!(!repo.upsert_recommendation(&rec).await.unwrap());
}

#[tokio::test]
async fn bulk_isolates_per_product_failures() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40).await;
    seed_demand(&repo, 2, 40).await;
    seed_demand(&repo, 13, 40).await;
    repo.poison_product(13);

    let analyzer = analyzer_for(Arc::clone(&repo));
    let report = analyzer
        .bulk(BulkRequest {
            warehouse_id: None,
            min_priority: ReorderPriority::Low,
            lead_time_days: 7,
            max_products: 50,
        })
        .await
        .unwrap();

    // The poisoned product fails alone; the others still analyze (with
    // zero stock they are all critical).
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].product_id, 13);
    assert_eq!(report.total, 2);
    assert_eq!(report.priority_counts.critical, 2);
}

#[tokio::test]
async fn bulk_filters_by_minimum_priority() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    // Zero stock everywhere: every analysis is critical, so a critical
    // floor keeps them and an impossible-to-beat floor is still matched.
    let all = analyzer
        .bulk(BulkRequest {
            warehouse_id: None,
            min_priority: ReorderPriority::Critical,
            lead_time_days: 7,
            max_products: 50,
        })
        .await
        .unwrap();
    assert_eq!(all.total, 1);

    let counts_only = analyzer
        .bulk(BulkRequest {
            warehouse_id: None,
            min_priority: ReorderPriority::Low,
            lead_time_days: 7,
            max_products: 50,
        })
        .await
        .unwrap();
    assert_eq!(counts_only.priority_counts.critical, 1);
}

#[tokio::test]
async fn bulk_sorts_by_score_then_stockout_date() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    seed_demand(&repo, 1, 40).await;
    seed_demand(&repo, 2, 40).await;
    let analyzer = analyzer_for(Arc::clone(&repo));

    let report = analyzer
        .bulk(BulkRequest {
            warehouse_id: None,
            min_priority: ReorderPriority::Low,
            lead_time_days: 7,
            max_products: 50,
        })
        .await
        .unwrap();

    let scores: Vec<u8> = report
        .recommendations
        .iter()
        .map(|r| r.analysis.priority_score)
        .collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
}

#[tokio::test]
async fn empty_universe_yields_an_empty_report() {
    let repo = Arc::new(MemoryAnalyticsRepository::new());
    let analyzer = analyzer_for(Arc::clone(&repo));

    let report = analyzer
        .bulk(BulkRequest {
            warehouse_id: None,
            min_priority: ReorderPriority::Medium,
            lead_time_days: 7,
            max_products: 50,
        })
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert!(report.recommendations.is_empty());
    assert!(report.errors.is_empty());
}
