//! # Restock Analyzer
//!
//! Converts forecasts into inventory actions: reorder points, safety
//! stock, stockout risk and prioritized recommendations. Bulk analysis
//! fans out across products with a bounded worker pool; a failed product
//! is reported per item and never aborts the batch.

use crate::clients::InventoryApi;
use crate::error::{AnalyticsError, Result};
use crate::forecast::{ForecastEngine, ForecastScope};
use crate::model::{
    decimal_from_f64, RecommendationStatus, ReorderPriority, StockReorderRecommendation,
};
use crate::repository::AnalyticsRepository;
use chrono::{Duration, NaiveDate};
use restock_core::{AnalyticsConfig, Clock};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Reorder-point math for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderPointAnalysis {
    pub product_id: i64,
    pub reorder_point: i64,
    pub safety_stock: i64,
    pub lead_time_demand: i64,
    pub economic_order_quantity: i64,
    pub daily_demand_mean: f64,
    pub daily_demand_std: f64,
    pub forecast_7d: f64,
    pub forecast_30d: f64,
    pub service_level: f64,
    pub lead_time_days: u32,
}

/// Day-by-day stockout simulation plus the priority decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockoutRiskAnalysis {
    pub product_id: i64,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub safety_stock: i64,
    pub priority: ReorderPriority,
    pub priority_score: u8,
    pub days_until_stockout: Option<i64>,
    pub stockout_date: Option<NaiveDate>,
    pub recommended_order_quantity: i64,
    pub should_reorder: bool,
    pub forecast_7d: f64,
    pub forecast_30d: f64,
}

/// Bulk request parameters.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub warehouse_id: Option<i64>,
    pub min_priority: ReorderPriority,
    pub lead_time_days: u32,
    pub max_products: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRecommendation {
    pub product_name: String,
    pub product_sku: Option<String>,
    #[serde(flatten)]
    pub analysis: StockoutRiskAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub product_id: i64,
    pub product_name: String,
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriorityCounts {
    pub critical: u64,
    pub urgent: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl PriorityCounts {
    pub fn increment(&mut self, priority: ReorderPriority) {
        match priority {
            ReorderPriority::Critical => self.critical += 1,
            ReorderPriority::Urgent => self.urgent += 1,
            ReorderPriority::High => self.high += 1,
            ReorderPriority::Medium => self.medium += 1,
            ReorderPriority::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub recommendations: Vec<BulkRecommendation>,
    pub total: usize,
    pub priority_counts: PriorityCounts,
    pub errors: Vec<BulkItemError>,
    pub processing_time_ms: u64,
}

#[derive(Clone)]
pub struct RestockAnalyzer {
    engine: Arc<ForecastEngine>,
    repo: Arc<dyn AnalyticsRepository>,
    inventory: InventoryApi,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl RestockAnalyzer {
    pub fn new(
        engine: Arc<ForecastEngine>,
        repo: Arc<dyn AnalyticsRepository>,
        inventory: InventoryApi,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            engine,
            repo,
            inventory,
            clock,
            config,
        }
    }

    /// Reorder point from forecast and recent history:
    /// `reorder_point = D·L + z(service_level)·σ_D·√L`, with the EOQ
    /// simplified to a month of demand.
    pub async fn reorder_point(
        &self,
        product_id: i64,
        lead_time_days: u32,
        service_level: f64,
        periods: usize,
    ) -> Result<ReorderPointAnalysis> {
        if !(0.0..1.0).contains(&service_level) || service_level <= 0.0 {
            return Err(AnalyticsError::InvalidInput(format!(
                "service_level must be in (0, 1) (got {service_level})"
            )));
        }

        let scope = ForecastScope::Product(product_id);
        let frame = self
            .engine
            .forecast(scope, periods, true)
            .await?
            .ok_or_else(|| {
                AnalyticsError::NoData(format!("unable to forecast product {product_id}"))
            })?;

        // Recent 90 days of history; sparse history degrades to
        // conservative zeros rather than failing.
        let history = self.engine.prepare(scope, 90).await?.series;
        let (daily_demand_mean, daily_demand_std) = if history.len() < 2 {
            (0.0, 0.0)
        } else {
            // Population std (ddof = 0) avoids NaN on tiny samples.
            (history.mean(), history.std())
        };

        let z = Normal::new(0.0, 1.0)
            .expect("unit normal")
            .inverse_cdf(service_level);
        let lead = lead_time_days as f64;
        let safety_stock = (z * daily_demand_std * lead.sqrt()).round() as i64;
        let lead_time_demand = (daily_demand_mean * lead) as i64;
        let reorder_point = lead_time_demand + safety_stock;
        let economic_order_quantity = (daily_demand_mean * 30.0) as i64;

        Ok(ReorderPointAnalysis {
            product_id,
            reorder_point,
            safety_stock,
            lead_time_demand,
            economic_order_quantity,
            daily_demand_mean: round2(daily_demand_mean),
            daily_demand_std: round2(daily_demand_std),
            forecast_7d: round2(frame.horizon_sum(7)),
            forecast_30d: round2(frame.horizon_sum(30)),
            service_level,
            lead_time_days,
        })
    }

    /// Simulate stock depletion over the forecast and decide the reorder
    /// priority.
    pub async fn stockout_risk(
        &self,
        product_id: i64,
        current_stock: i64,
        lead_time_days: u32,
        periods: usize,
    ) -> Result<StockoutRiskAnalysis> {
        let scope = ForecastScope::Product(product_id);
        let frame = self
            .engine
            .forecast(scope, periods, true)
            .await?
            .ok_or_else(|| {
                AnalyticsError::NoData(format!("unable to forecast product {product_id}"))
            })?;

        let reorder = self
            .reorder_point(
                product_id,
                lead_time_days,
                self.config.service_level_default,
                periods,
            )
            .await?;

        let mut stock_remaining = current_stock as f64;
        let mut days_until_stockout = None;
        let mut stockout_date = None;
        for (offset, point) in frame.points.iter().enumerate() {
            stock_remaining -= point.point;
            if stock_remaining <= 0.0 {
                days_until_stockout = Some(offset as i64);
                stockout_date = Some(self.clock.today() + Duration::days(offset as i64));
                break;
            }
        }

        let (priority, priority_score) = decide_priority(
            current_stock,
            reorder.reorder_point,
            days_until_stockout,
            lead_time_days as i64,
        );

        let recommended_order_quantity = if current_stock < reorder.reorder_point {
            reorder
                .economic_order_quantity
                .max(reorder.reorder_point - current_stock + reorder.safety_stock)
        } else {
            0
        };

        Ok(StockoutRiskAnalysis {
            product_id,
            current_stock,
            reorder_point: reorder.reorder_point,
            safety_stock: reorder.safety_stock,
            priority,
            priority_score,
            days_until_stockout,
            stockout_date,
            recommended_order_quantity,
            should_reorder: current_stock <= reorder.reorder_point,
            forecast_7d: reorder.forecast_7d,
            forecast_30d: reorder.forecast_30d,
        })
    }

    /// Assemble a persistable recommendation for one product. The caller
    /// owns the upsert.
    pub async fn generate_recommendation(
        &self,
        product_id: i64,
        warehouse_id: Option<i64>,
        current_stock: i64,
        min_stock_level: i64,
        lead_time_days: u32,
    ) -> Result<StockReorderRecommendation> {
        let risk = self
            .stockout_risk(product_id, current_stock, lead_time_days, 30)
            .await?;

        let demand = self.repo.latest_demand_for_product(product_id).await?;
        let (product_name, product_sku, average_daily_demand) = match &demand {
            Some(demand) => (
                demand.product_name.clone(),
                demand.product_sku.clone(),
                demand.average_daily_demand,
            ),
            None => (
                format!("Product {product_id}"),
                None,
                decimal_from_f64(0.0),
            ),
        };

        let today = self.clock.today();
        let recommended_order_date = risk.days_until_stockout.map(|days| {
            today + Duration::days((days - lead_time_days as i64).max(0))
        });

        let now = self.clock.now();
        Ok(StockReorderRecommendation {
            product_id,
            product_name,
            product_sku,
            warehouse_id,
            warehouse_name: None,
            current_stock,
            min_stock_level,
            average_daily_demand,
            predicted_demand_7d: risk.forecast_7d as i64,
            predicted_demand_30d: risk.forecast_30d as i64,
            recommended_order_quantity: risk.recommended_order_quantity,
            reorder_priority: risk.priority,
            safety_stock: risk.safety_stock,
            reorder_point: risk.reorder_point,
            stockout_date_estimate: risk.stockout_date,
            recommended_order_date,
            status: RecommendationStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Analyze many products in parallel with a bounded worker pool.
    /// Per-item failures land in `errors`; the rest of the batch
    /// proceeds. Results below `min_priority` are dropped, the remainder
    /// sorted by descending score then soonest stockout.
    pub async fn bulk(&self, request: BulkRequest) -> Result<BulkReport> {
        let started = Instant::now();

        let since = self.clock.today() - Duration::days(60);
        let max_products = request.max_products.min(self.config.bulk_max_products);
        let products = self
            .repo
            .top_demand_products(since, max_products as i64)
            .await?;

        if products.is_empty() {
            return Ok(BulkReport {
                recommendations: Vec::new(),
                total: 0,
                priority_counts: PriorityCounts::default(),
                errors: Vec::new(),
                processing_time_ms: started.elapsed().as_millis() as u64,
            });
        }

        let stock_map = match self.inventory.stock_map(request.warehouse_id).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "inventory fetch failed, assuming zero stock");
                Default::default()
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.bulk_worker_pool));
        let mut joins = JoinSet::new();
        for product in products {
            let analyzer = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let current_stock = stock_map.get(&product.product_id).copied().unwrap_or(0);
            let lead_time_days = request.lead_time_days;

            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let analysis = analyzer
                    .stockout_risk(product.product_id, current_stock, lead_time_days, 30)
                    .await;
                (product, analysis)
            });
        }

        let mut recommendations = Vec::new();
        let mut errors = Vec::new();
        let mut priority_counts = PriorityCounts::default();

        while let Some(joined) = joins.join_next().await {
            let (product, analysis) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "bulk analysis task panicked");
                    continue;
                }
            };

            match analysis {
                Ok(analysis) => {
                    priority_counts.increment(analysis.priority);
                    if analysis.priority >= request.min_priority {
                        recommendations.push(BulkRecommendation {
                            product_name: product.product_name.clone(),
                            product_sku: product.product_sku.clone(),
                            analysis,
                        });
                    }
                }
                Err(e) => errors.push(BulkItemError {
                    product_id: product.product_id,
                    product_name: product.product_name.clone(),
                    status: "error",
                    message: e.to_string(),
                }),
            }
        }

        recommendations.sort_by(|a, b| {
            b.analysis
                .priority_score
                .cmp(&a.analysis.priority_score)
                .then_with(|| {
                    let a_days = a.analysis.days_until_stockout.unwrap_or(i64::MAX);
                    let b_days = b.analysis.days_until_stockout.unwrap_or(i64::MAX);
                    a_days.cmp(&b_days)
                })
        });

        let report = BulkReport {
            total: recommendations.len(),
            recommendations,
            priority_counts,
            errors,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = report.total,
            errors = report.errors.len(),
            elapsed_ms = report.processing_time_ms,
            "bulk restock analysis finished"
        );
        Ok(report)
    }
}

/// Priority decision table; first matching row wins.
pub fn decide_priority(
    current_stock: i64,
    reorder_point: i64,
    days_until_stockout: Option<i64>,
    lead_time_days: i64,
) -> (ReorderPriority, u8) {
    if current_stock <= 0 {
        return (ReorderPriority::Critical, 100);
    }
    if current_stock as f64 <= reorder_point as f64 * 0.5 {
        return (ReorderPriority::Urgent, 80);
    }
    if current_stock <= reorder_point {
        return (ReorderPriority::High, 60);
    }
    match days_until_stockout {
        Some(days) if days < lead_time_days => (ReorderPriority::Urgent, 75),
        Some(days) if days < lead_time_days * 2 => (ReorderPriority::High, 55),
        Some(days) if days < 30 => (ReorderPriority::Medium, 40),
        _ => (ReorderPriority::Low, 20),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stock_is_critical() {
        assert_eq!(decide_priority(0, 50, None, 7), (ReorderPriority::Critical, 100));
        assert_eq!(
            decide_priority(-3, 50, Some(1), 7),
            (ReorderPriority::Critical, 100)
        );
    }

    #[test]
    fn half_reorder_point_is_urgent() {
        assert_eq!(decide_priority(20, 50, None, 7), (ReorderPriority::Urgent, 80));
        assert_eq!(decide_priority(25, 50, None, 7), (ReorderPriority::Urgent, 80));
    }

    #[test]
    fn at_reorder_point_is_high() {
        assert_eq!(decide_priority(40, 50, None, 7), (ReorderPriority::High, 60));
        assert_eq!(decide_priority(50, 50, None, 7), (ReorderPriority::High, 60));
    }

    #[test]
    fn stockout_inside_lead_time_is_urgent() {
        // Stock is above the reorder point but the forecast burns through
        // it before a replenishment could arrive.
        assert_eq!(
            decide_priority(60, 50, Some(3), 7),
            (ReorderPriority::Urgent, 75)
        );
        assert_eq!(
            decide_priority(60, 50, Some(10), 7),
            (ReorderPriority::High, 55)
        );
        assert_eq!(
            decide_priority(60, 50, Some(20), 7),
            (ReorderPriority::Medium, 40)
        );
        assert_eq!(decide_priority(60, 50, Some(45), 7), (ReorderPriority::Low, 20));
        assert_eq!(decide_priority(60, 50, None, 7), (ReorderPriority::Low, 20));
    }

    #[test]
    fn smaller_reorder_point_never_worsens_priority() {
        for current in [10_i64, 30, 60, 100] {
            let (large_priority, _) = decide_priority(current, 80, None, 7);
            let (small_priority, _) = decide_priority(current, 20, None, 7);
            assert!(small_priority <= large_priority);
        }
    }

    #[test]
    fn priority_counts_accumulate() {
        let mut counts = PriorityCounts::default();
        counts.increment(ReorderPriority::Critical);
        counts.increment(ReorderPriority::Low);
        counts.increment(ReorderPriority::Low);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.low, 2);
    }
}
