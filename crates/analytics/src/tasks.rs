//! Scheduled task catalog.
//!
//! Each task implements `restock_core::TaskHandler` and is registered
//! with the scheduler at startup. Transient failures return
//! `TaskOutcome::Retry` and follow the scheduler's backoff policy;
//! terminal failures are recorded as `error` runs.

use crate::aggregator::MetricsCalculator;
use crate::clients::InventoryApi;
use crate::error::AnalyticsError;
use crate::forecast::{ForecastEngine, ForecastScope};
use crate::model::{ForecastAccuracyRecord, ForecastType, ReorderPriority};
use crate::repository::AnalyticsRepository;
use crate::restock::RestockAnalyzer;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use restock_core::{
    AnalyticsConfig, Clock, Scheduler, ServiceClient, TaskContext, TaskHandler, TaskOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const HOURLY: Duration = Duration::from_secs(3600);
const EVERY_TWO_HOURS: Duration = Duration::from_secs(2 * 3600);
const DAILY: Duration = Duration::from_secs(24 * 3600);
const WEEKLY: Duration = Duration::from_secs(7 * 24 * 3600);
const EVERY_FIVE_MINUTES: Duration = Duration::from_secs(300);

/// How many top products get their forecasts persisted for accuracy
/// tracking.
const ACCURACY_TOP_PRODUCTS: usize = 20;

fn outcome_from(error: AnalyticsError) -> TaskOutcome {
    if error.is_transient() {
        TaskOutcome::Retry(error.to_string())
    } else {
        TaskOutcome::Failed(error.to_string())
    }
}

/// Refresh yesterday's daily sales metric. Hourly.
pub struct CalculateDailyMetricsTask {
    pub calculator: Arc<MetricsCalculator>,
    pub clock: Arc<dyn Clock>,
}

#[async_trait]
impl TaskHandler for CalculateDailyMetricsTask {
    fn name(&self) -> &'static str {
        "calculate_daily_metrics"
    }

    fn cadence(&self) -> Duration {
        HOURLY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let yesterday = self.clock.today() - ChronoDuration::days(1);
        match self.calculator.compute_daily(yesterday).await {
            Ok(outcome) => {
                let status = outcome.status();
                let detail = match outcome.value() {
                    Some(metric) => serde_json::json!({
                        "status": status,
                        "date": yesterday,
                        "total_sales": metric.total_sales,
                        "total_orders": metric.total_orders,
                    }),
                    None => serde_json::json!({"status": status, "date": yesterday}),
                };
                TaskOutcome::Success(detail)
            }
            Err(e) => outcome_from(e),
        }
    }
}

/// Recompute product demand over the default window. Every two hours.
pub struct CalculateProductDemandTask {
    pub calculator: Arc<MetricsCalculator>,
    pub config: AnalyticsConfig,
}

#[async_trait]
impl TaskHandler for CalculateProductDemandTask {
    fn name(&self) -> &'static str {
        "calculate_product_demand"
    }

    fn cadence(&self) -> Duration {
        EVERY_TWO_HOURS
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let period_days = self.config.period_days_default;
        match self.calculator.compute_demand(period_days).await {
            Ok(outcome) => {
                let status = outcome.status();
                let count = outcome.value().map(|v| v.len()).unwrap_or(0);
                TaskOutcome::Success(serde_json::json!({
                    "status": status,
                    "products_count": count,
                    "period_days": period_days,
                }))
            }
            Err(e) => outcome_from(e),
        }
    }
}

/// Inventory turnover plus the coarse recommendation pass. Daily.
pub struct CalculateInventoryTurnoverTask {
    pub calculator: Arc<MetricsCalculator>,
    pub config: AnalyticsConfig,
}

#[async_trait]
impl TaskHandler for CalculateInventoryTurnoverTask {
    fn name(&self) -> &'static str {
        "calculate_inventory_turnover"
    }

    fn cadence(&self) -> Duration {
        DAILY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let period_days = self.config.period_days_default;
        let turnover = match self.calculator.compute_turnover(period_days).await {
            Ok(outcome) => outcome,
            Err(e) => return outcome_from(e),
        };

        let turnover_count = match &turnover {
            crate::aggregator::AggregationOutcome::Success(rows)
            | crate::aggregator::AggregationOutcome::Fallback(rows) => rows.len(),
            crate::aggregator::AggregationOutcome::NoData => 0,
        };

        let recommendations = if turnover_count > 0 {
            match self.calculator.generate_recommendations().await {
                Ok(recommendations) => recommendations.len(),
                Err(e) => {
                    warn!(error = %e, "coarse recommendation pass failed");
                    0
                }
            }
        } else {
            0
        };

        TaskOutcome::Success(serde_json::json!({
            "status": turnover.status(),
            "products_count": turnover_count,
            "recommendations_count": recommendations,
            "period_days": period_days,
        }))
    }
}

/// Forecast-driven recommendations via the restock analyzer. Daily,
/// early morning.
pub struct GenerateRestockRecommendationsTask {
    pub analyzer: Arc<RestockAnalyzer>,
    pub repo: Arc<dyn AnalyticsRepository>,
    pub inventory: InventoryApi,
    pub clock: Arc<dyn Clock>,
    pub config: AnalyticsConfig,
}

#[async_trait]
impl TaskHandler for GenerateRestockRecommendationsTask {
    fn name(&self) -> &'static str {
        "generate_restock_recommendations"
    }

    fn cadence(&self) -> Duration {
        DAILY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let since = self.clock.today() - ChronoDuration::days(60);
        let products = match self.repo.top_demand_products(since, 100).await {
            Ok(products) => products,
            Err(e) => return outcome_from(e),
        };

        if products.is_empty() {
            return TaskOutcome::Success(serde_json::json!({
                "status": "no_data",
                "message": "no product demand data available",
            }));
        }

        let stock_map = match self.inventory.stock_map(None).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "inventory fetch failed, assuming zero stock");
                Default::default()
            }
        };

        let min_priority = ReorderPriority::Medium;
        let mut created = 0u64;
        let mut updated = 0u64;
        let mut failed = 0u64;

        for product in &products {
            let current_stock = stock_map.get(&product.product_id).copied().unwrap_or(0);
            let recommendation = match self
                .analyzer
                .generate_recommendation(
                    product.product_id,
                    None,
                    current_stock,
                    0,
                    self.config.lead_time_days_default,
                )
                .await
            {
                Ok(recommendation) => recommendation,
                Err(e) => {
                    warn!(product_id = product.product_id, error = %e, "recommendation failed");
                    failed += 1;
                    continue;
                }
            };

            if recommendation.reorder_priority < min_priority {
                continue;
            }

            match self.repo.upsert_recommendation(&recommendation).await {
                Ok(true) => created += 1,
                Ok(false) => updated += 1,
                Err(e) => {
                    warn!(product_id = product.product_id, error = %e, "recommendation upsert failed");
                    failed += 1;
                }
            }
        }

        TaskOutcome::Success(serde_json::json!({
            "status": "success",
            "created": created,
            "updated": updated,
            "failed": failed,
            "total_analyzed": products.len(),
        }))
    }
}

/// Persist today's forecasts so the accuracy task can later join them
/// with actuals. Daily.
pub struct SaveDailyForecastsTask {
    pub engine: Arc<ForecastEngine>,
    pub repo: Arc<dyn AnalyticsRepository>,
    pub clock: Arc<dyn Clock>,
}

impl SaveDailyForecastsTask {
    async fn save_scope(
        &self,
        scope: ForecastScope,
        forecast_type: ForecastType,
        scope_id: Option<i64>,
        periods: usize,
    ) -> Result<u64, AnalyticsError> {
        let Some(frame) = self.engine.forecast(scope, periods, true).await? else {
            return Ok(0);
        };

        let today = self.clock.today();
        let mut saved = 0;
        for point in &frame.points {
            let record = ForecastAccuracyRecord::new(
                forecast_type,
                scope_id,
                today,
                point.date,
                crate::model::decimal_from_f64(point.point),
                Some(crate::model::decimal_from_f64(point.lower)),
                Some(crate::model::decimal_from_f64(point.upper)),
                frame.model_tag.clone(),
                self.clock.now(),
            );
            self.repo.insert_accuracy(&record).await?;
            saved += 1;
        }
        Ok(saved)
    }
}

#[async_trait]
impl TaskHandler for SaveDailyForecastsTask {
    fn name(&self) -> &'static str {
        "save_daily_forecasts"
    }

    fn cadence(&self) -> Duration {
        DAILY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let periods = 30;
        let mut saved = match self
            .save_scope(ForecastScope::TotalSales, ForecastType::Sales, None, periods)
            .await
        {
            Ok(saved) => saved,
            Err(e) => return outcome_from(e),
        };

        let top = match self
            .repo
            .top_revenue_products(ACCURACY_TOP_PRODUCTS as i64)
            .await
        {
            Ok(top) => top,
            Err(e) => return outcome_from(e),
        };

        for product in top {
            match self
                .save_scope(
                    ForecastScope::Product(product.product_id),
                    ForecastType::ProductDemand,
                    Some(product.product_id),
                    periods,
                )
                .await
            {
                Ok(count) => saved += count,
                Err(e) => {
                    warn!(product_id = product.product_id, error = %e, "saving forecast failed")
                }
            }
        }

        TaskOutcome::Success(serde_json::json!({
            "status": "success",
            "saved_forecasts": saved,
            "periods": periods,
        }))
    }
}

/// Join past predictions with actual metrics and derive error figures.
/// Daily.
pub struct UpdateForecastAccuracyTask {
    pub repo: Arc<dyn AnalyticsRepository>,
    pub clock: Arc<dyn Clock>,
}

#[async_trait]
impl TaskHandler for UpdateForecastAccuracyTask {
    fn name(&self) -> &'static str {
        "update_forecast_accuracy"
    }

    fn cadence(&self) -> Duration {
        DAILY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let today = self.clock.today();
        let pending = match self.repo.pending_accuracy(today).await {
            Ok(pending) => pending,
            Err(e) => return outcome_from(e),
        };

        let mut updated = 0u64;
        for mut record in pending {
            let actual = match record.forecast_type {
                ForecastType::Sales => match self.repo.daily_sales_on(record.predicted_date).await {
                    Ok(metric) => metric.map(|m| m.total_sales),
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e, "actuals lookup failed");
                        continue;
                    }
                },
                ForecastType::ProductDemand => {
                    let Some(product_id) = record.scope_id else {
                        continue;
                    };
                    match self
                        .repo
                        .demand_covering(product_id, record.predicted_date)
                        .await
                    {
                        Ok(metric) => metric.map(|m| m.average_daily_demand),
                        Err(e) => {
                            warn!(record_id = %record.id, error = %e, "actuals lookup failed");
                            continue;
                        }
                    }
                }
                // Group scopes get their actuals from dedicated rollups,
                // which are out of the accuracy loop for now.
                ForecastType::CategorySales | ForecastType::WarehouseInventory => None,
            };

            if let Some(actual) = actual {
                record.record_actual(actual, self.clock.now());
                if let Err(e) = self.repo.update_accuracy(&record).await {
                    warn!(record_id = %record.id, error = %e, "accuracy update failed");
                    continue;
                }
                updated += 1;
            }
        }

        let stats = match self
            .repo
            .accuracy_stats_since(today - ChronoDuration::days(30))
            .await
        {
            Ok(stats) => stats,
            Err(e) => return outcome_from(e),
        };

        info!(
            updated,
            avg_mape = stats.avg_mape.unwrap_or(0.0),
            confidence_rate = stats.confidence_rate(),
            "forecast accuracy refreshed"
        );

        TaskOutcome::Success(serde_json::json!({
            "status": "success",
            "updated": updated,
            "stats": {
                "avg_mape": stats.avg_mape,
                "avg_mae": stats.avg_mae,
                "confidence_rate": stats.confidence_rate(),
                "total": stats.total,
            },
        }))
    }
}

/// Apply data retention. Weekly. Recommendations already `ordered` are
/// kept regardless of age.
pub struct CleanupOldDataTask {
    pub repo: Arc<dyn AnalyticsRepository>,
    pub clock: Arc<dyn Clock>,
    pub config: AnalyticsConfig,
}

#[async_trait]
impl TaskHandler for CleanupOldDataTask {
    fn name(&self) -> &'static str {
        "cleanup_old_data"
    }

    fn cadence(&self) -> Duration {
        WEEKLY
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let retention = ChronoDuration::days(self.config.retention_days);
        let cutoff_day = self.clock.today() - retention;
        let cutoff_at = self.clock.now() - retention;

        let result: Result<serde_json::Value, AnalyticsError> = async {
            let daily = self.repo.delete_daily_sales_before(cutoff_day).await?;
            let demand = self.repo.delete_product_demand_before(cutoff_day).await?;
            let turnover = self.repo.delete_turnover_before(cutoff_day).await?;
            let accuracy = self.repo.delete_accuracy_before(cutoff_day).await?;
            let recommendations = self
                .repo
                .delete_unordered_recommendations_before(cutoff_at)
                .await?;
            Ok(serde_json::json!({
                "status": "success",
                "deleted": {
                    "daily_sales": daily,
                    "product_demand": demand,
                    "inventory_turnover": turnover,
                    "forecast_accuracy": accuracy,
                    "recommendations": recommendations,
                },
                "retention_days": self.config.retention_days,
            }))
        }
        .await;

        match result {
            Ok(details) => TaskOutcome::Success(details),
            Err(e) => outcome_from(e),
        }
    }
}

/// Probe every configured upstream. Every five minutes.
pub struct CheckServiceHealthTask {
    pub client: Arc<ServiceClient>,
}

#[async_trait]
impl TaskHandler for CheckServiceHealthTask {
    fn name(&self) -> &'static str {
        "check_service_health"
    }

    fn cadence(&self) -> Duration {
        EVERY_FIVE_MINUTES
    }

    async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
        let report = self.client.probe_all().await;
        if report.degraded() {
            warn!(
                healthy = report.healthy,
                unhealthy = report.unhealthy,
                "one or more upstream services are unhealthy"
            );
        }
        TaskOutcome::Success(serde_json::json!({
            "status": "success",
            "overall_health": if report.degraded() { "degraded" } else { "healthy" },
            "healthy_services": report.healthy,
            "unhealthy_services": report.unhealthy,
            "results": report.results,
        }))
    }
}

/// Wire every scheduled task into the scheduler.
#[allow(clippy::too_many_arguments)]
pub fn register_all(
    scheduler: &mut Scheduler,
    calculator: Arc<MetricsCalculator>,
    analyzer: Arc<RestockAnalyzer>,
    engine: Arc<ForecastEngine>,
    repo: Arc<dyn AnalyticsRepository>,
    inventory: InventoryApi,
    client: Arc<ServiceClient>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
) {
    scheduler.register(Arc::new(CalculateDailyMetricsTask {
        calculator: Arc::clone(&calculator),
        clock: Arc::clone(&clock),
    }));
    scheduler.register(Arc::new(CalculateProductDemandTask {
        calculator: Arc::clone(&calculator),
        config: config.clone(),
    }));
    scheduler.register(Arc::new(CalculateInventoryTurnoverTask {
        calculator,
        config: config.clone(),
    }));
    scheduler.register(Arc::new(GenerateRestockRecommendationsTask {
        analyzer,
        repo: Arc::clone(&repo),
        inventory: inventory.clone(),
        clock: Arc::clone(&clock),
        config: config.clone(),
    }));
    scheduler.register(Arc::new(SaveDailyForecastsTask {
        engine,
        repo: Arc::clone(&repo),
        clock: Arc::clone(&clock),
    }));
    scheduler.register(Arc::new(UpdateForecastAccuracyTask {
        repo: Arc::clone(&repo),
        clock: Arc::clone(&clock),
    }));
    scheduler.register(Arc::new(CleanupOldDataTask { repo, clock, config }));
    scheduler.register(Arc::new(CheckServiceHealthTask { client }));
}
