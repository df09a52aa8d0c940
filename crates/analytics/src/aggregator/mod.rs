//! # Metric Aggregator
//!
//! Computes daily sales, product demand and inventory turnover metrics
//! for a window, plus the coarse reorder recommendations used by the
//! scheduled job. Data comes from the sales and inventory services first;
//! when an upstream cannot be reached the aggregator falls back to direct
//! SQL against the shared datastore and reports the outcome accordingly.

mod fallback;

pub use fallback::SqlFallback;

use crate::clients::{InventoryApi, SalesApi, DAILY_ORDER_PAGE, DEMAND_ORDER_PAGE};
use crate::error::{AnalyticsError, Result};
use crate::model::{
    decimal_from_f64, DailySalesMetric, DemandTrend, InventoryTurnoverMetric,
    ProductDemandMetric, RecommendationStatus, ReorderPriority, RiskLevel,
    StockReorderRecommendation, TurnoverClass,
};
use crate::repository::AnalyticsRepository;
use chrono::{Duration, NaiveDate};
use restock_core::{AnalyticsConfig, Clock};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// How a metric computation was satisfied. Callers distinguish the happy
/// path from the SQL fallback and from an empty universe.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome<T> {
    Success(T),
    Fallback(T),
    NoData,
}

impl<T> AggregationOutcome<T> {
    pub fn status(&self) -> &'static str {
        match self {
            AggregationOutcome::Success(_) => "success",
            AggregationOutcome::Fallback(_) => "fallback",
            AggregationOutcome::NoData => "no_data",
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            AggregationOutcome::Success(value) | AggregationOutcome::Fallback(value) => Some(value),
            AggregationOutcome::NoData => None,
        }
    }
}

/// Per-product per-day sales facts, the common shape both the HTTP path
/// and the SQL fallback reduce to.
#[derive(Debug, Clone)]
pub(crate) struct ProductDaySales {
    pub product_id: i64,
    pub day: NaiveDate,
    pub quantity: i64,
    pub revenue: Decimal,
    pub orders: i64,
    pub price_sum: Decimal,
    pub price_lines: i64,
}

/// Current stock snapshot per product, from either source.
#[derive(Debug, Clone)]
pub(crate) struct ProductStock {
    pub product_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub current_stock: i64,
    pub min_stock: i64,
    pub warehouse_id: Option<i64>,
    pub warehouse_name: Option<String>,
}

pub struct MetricsCalculator {
    sales: SalesApi,
    inventory: InventoryApi,
    repo: Arc<dyn AnalyticsRepository>,
    fallback: Option<SqlFallback>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl MetricsCalculator {
    pub fn new(
        sales: SalesApi,
        inventory: InventoryApi,
        repo: Arc<dyn AnalyticsRepository>,
        fallback: Option<SqlFallback>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            sales,
            inventory,
            repo,
            fallback,
            clock,
            config,
        }
    }

    /// Compute and upsert the daily sales metric for one date.
    pub async fn compute_daily(
        &self,
        date: NaiveDate,
    ) -> Result<AggregationOutcome<DailySalesMetric>> {
        let orders = match self.sales.completed_orders(date, date, DAILY_ORDER_PAGE).await {
            Ok(orders) => orders,
            Err(e) if e.is_transient() => {
                warn!(%date, error = %e, "sales service unreachable, trying SQL fallback");
                return self.daily_via_fallback(date, e).await;
            }
            Err(e) => return Err(e),
        };

        let mut metric = DailySalesMetric::empty(date, self.clock.now());
        let mut unique_products = HashSet::new();
        let mut unique_customers = HashSet::new();

        for order in &orders {
            metric.total_sales += order.total;
            metric.total_orders += 1;
            if let Some(customer_id) = order.customer_id {
                unique_customers.insert(customer_id);
            }
            for item in &order.details {
                metric.products_sold += item.quantity as i32;
                if let Some(product_id) = item.product_id {
                    unique_products.insert(product_id);
                }
            }
        }

        metric.unique_products = unique_products.len() as i32;
        metric.unique_customers = unique_customers.len() as i32;
        metric.recalculate_average();

        self.repo.upsert_daily_sales(&metric).await?;
        info!(
            %date,
            total_sales = %metric.total_sales,
            total_orders = metric.total_orders,
            "daily sales metric upserted"
        );
        Ok(AggregationOutcome::Success(metric))
    }

    async fn daily_via_fallback(
        &self,
        date: NaiveDate,
        upstream_error: AnalyticsError,
    ) -> Result<AggregationOutcome<DailySalesMetric>> {
        let Some(fallback) = &self.fallback else {
            return Err(upstream_error);
        };
        match fallback.daily_sales(date, self.clock.now()).await? {
            Some(metric) => {
                self.repo.upsert_daily_sales(&metric).await?;
                Ok(AggregationOutcome::Fallback(metric))
            }
            None => Ok(AggregationOutcome::NoData),
        }
    }

    /// Compute and upsert product demand metrics over the trailing window.
    pub async fn compute_demand(
        &self,
        period_days: u32,
    ) -> Result<AggregationOutcome<Vec<ProductDemandMetric>>> {
        let period_end = self.clock.today();
        let period_start = period_end - Duration::days(period_days as i64);

        let rows = match self.fetch_demand_rows(period_start, period_end).await {
            Ok(rows) => rows,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "sales service unreachable, trying SQL fallback for demand");
                match &self.fallback {
                    Some(fallback) => {
                        let rows = fallback.demand_rows(period_start, period_end).await?;
                        let names = fallback.product_names().await.unwrap_or_default();
                        let metrics = assemble_demand_metrics(
                            rows,
                            &names,
                            period_start,
                            period_end,
                            period_days,
                            self.clock.now(),
                        );
                        return self.persist_demand(metrics, true).await;
                    }
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        // Enrich names and SKUs; a failure here degrades to placeholders.
        let names = match self.inventory.products().await {
            Ok(products) => products
                .into_iter()
                .map(|p| (p.id, (p.name, p.sku)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not enrich product names from inventory");
                HashMap::new()
            }
        };

        let metrics = assemble_demand_metrics(
            rows,
            &names,
            period_start,
            period_end,
            period_days,
            self.clock.now(),
        );
        self.persist_demand(metrics, false).await
    }

    async fn fetch_demand_rows(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ProductDaySales>> {
        // Walk the window in 7-day chunks to bound each response.
        let mut facts: Vec<ProductDaySales> = Vec::new();
        let mut start = period_start;
        while start <= period_end {
            let end = (start + Duration::days(6)).min(period_end);
            let orders = self
                .sales
                .completed_orders(start, end, DEMAND_ORDER_PAGE)
                .await?;

            for order in orders {
                let Some(day) = order.order_day() else {
                    warn!(order_id = order.id, "order without a parseable date, skipping");
                    continue;
                };
                for item in &order.details {
                    let Some(product_id) = item.product_id else {
                        continue;
                    };
                    facts.push(ProductDaySales {
                        product_id,
                        day,
                        quantity: item.quantity,
                        revenue: Decimal::from(item.quantity) * item.unit_price,
                        orders: 1,
                        price_sum: item.unit_price,
                        price_lines: 1,
                    });
                }
            }
            start = end + Duration::days(1);
        }
        Ok(facts)
    }

    async fn persist_demand(
        &self,
        metrics: Vec<ProductDemandMetric>,
        via_fallback: bool,
    ) -> Result<AggregationOutcome<Vec<ProductDemandMetric>>> {
        if metrics.is_empty() {
            return Ok(AggregationOutcome::NoData);
        }
        for metric in &metrics {
            self.repo.upsert_product_demand(metric).await?;
        }
        info!(products = metrics.len(), via_fallback, "product demand metrics upserted");
        if via_fallback {
            Ok(AggregationOutcome::Fallback(metrics))
        } else {
            Ok(AggregationOutcome::Success(metrics))
        }
    }

    /// Compute and upsert inventory turnover metrics for the window.
    pub async fn compute_turnover(
        &self,
        period_days: u32,
    ) -> Result<AggregationOutcome<Vec<InventoryTurnoverMetric>>> {
        let period_end = self.clock.today();
        let period_start = period_end - Duration::days(period_days as i64);

        let (stocks, via_fallback) = match self.inventory.products().await {
            Ok(products) => {
                let stocks = products
                    .into_iter()
                    .map(|p| ProductStock {
                        product_id: p.id,
                        name: p.name,
                        sku: p.sku,
                        current_stock: p.quantity,
                        min_stock: p.min_stock,
                        warehouse_id: p.warehouse_id,
                        warehouse_name: p.warehouse_name,
                    })
                    .collect::<Vec<_>>();
                (stocks, false)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "inventory service unreachable, trying SQL fallback");
                match &self.fallback {
                    Some(fallback) => (fallback.product_stocks().await?, true),
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let demand = self.repo.demand_window(period_start, period_end).await?;
        let demand_map: HashMap<i64, &ProductDemandMetric> =
            demand.iter().map(|d| (d.product_id, d)).collect();

        let mut metrics = Vec::new();
        for stock in stocks {
            let Some(demand) = demand_map.get(&stock.product_id) else {
                continue;
            };
            let metric = build_turnover_metric(
                &stock,
                demand,
                period_start,
                period_end,
                period_days,
                self.clock.now(),
            );
            self.repo.upsert_turnover(&metric).await?;
            metrics.push(metric);
        }

        if metrics.is_empty() {
            return Ok(AggregationOutcome::NoData);
        }
        info!(products = metrics.len(), via_fallback, "turnover metrics upserted");
        if via_fallback {
            Ok(AggregationOutcome::Fallback(metrics))
        } else {
            Ok(AggregationOutcome::Success(metrics))
        }
    }

    /// Coarse recommendation pass over recent turnover and demand, used by
    /// the daily turnover job. The forecast-driven analyzer produces the
    /// richer variant.
    pub async fn generate_recommendations(&self) -> Result<Vec<StockReorderRecommendation>> {
        let today = self.clock.today();
        let since = today - Duration::days(30);
        let lead_time_days = self.config.lead_time_days_default as i64;

        let at_risk = self.repo.turnover_at_risk_since(since).await?;
        let recent_demand = self.repo.top_demand_products(since, i64::MAX).await?;
        let demand_map: HashMap<i64, &ProductDemandMetric> =
            recent_demand.iter().map(|d| (d.product_id, d)).collect();

        // Stock minimums are best-effort enrichment.
        let min_stock_map: HashMap<i64, i64> = match self.inventory.products().await {
            Ok(products) => products.into_iter().map(|p| (p.id, p.min_stock)).collect(),
            Err(e) => {
                warn!(error = %e, "could not fetch stock minimums");
                HashMap::new()
            }
        };

        let mut recommendations = Vec::new();
        for turnover in &at_risk {
            let Some(demand) = demand_map.get(&turnover.product_id) else {
                continue;
            };

            let daily_demand = demand.average_daily_demand.to_f64().unwrap_or(0.0);
            let predicted_7d = (daily_demand * 7.0) as i64;
            let predicted_30d = (daily_demand * 30.0) as i64;
            let safety_stock = (daily_demand * 14.0) as i64;
            let lead_time_demand = (daily_demand * lead_time_days as f64) as i64;
            let reorder_point = lead_time_demand + safety_stock;

            let current_stock = turnover.ending_inventory;
            let recommended_quantity = (predicted_30d + safety_stock - current_stock).max(0);
            if recommended_quantity == 0 {
                continue;
            }

            let priority = match (turnover.stockout_risk, current_stock < reorder_point) {
                (RiskLevel::High, true) => ReorderPriority::Urgent,
                (RiskLevel::High, false) => ReorderPriority::High,
                (_, true) => ReorderPriority::High,
                (_, false) => ReorderPriority::Medium,
            };

            let stockout_date = if daily_demand > 0.0 && current_stock > 0 {
                let days = (current_stock as f64 / daily_demand) as i64;
                Some(today + Duration::days(days))
            } else {
                None
            };
            let recommended_order_date =
                stockout_date.map(|date| date - Duration::days(lead_time_days));

            let now = self.clock.now();
            let recommendation = StockReorderRecommendation {
                product_id: turnover.product_id,
                product_name: turnover.product_name.clone(),
                product_sku: demand.product_sku.clone(),
                warehouse_id: turnover.warehouse_id,
                warehouse_name: turnover.warehouse_name.clone(),
                current_stock,
                min_stock_level: min_stock_map
                    .get(&turnover.product_id)
                    .copied()
                    .unwrap_or(0),
                average_daily_demand: demand.average_daily_demand,
                predicted_demand_7d: predicted_7d,
                predicted_demand_30d: predicted_30d,
                recommended_order_quantity: recommended_quantity,
                reorder_priority: priority,
                safety_stock,
                reorder_point,
                stockout_date_estimate: stockout_date,
                recommended_order_date,
                status: RecommendationStatus::Pending,
                created_at: now,
                updated_at: now,
            };

            self.repo.upsert_recommendation(&recommendation).await?;
            recommendations.push(recommendation);
        }

        info!(count = recommendations.len(), "coarse reorder recommendations generated");
        Ok(recommendations)
    }
}

/// Reduce per-product per-day facts into demand metrics with trend
/// classification.
pub(crate) fn assemble_demand_metrics(
    rows: Vec<ProductDaySales>,
    names: &HashMap<i64, (String, Option<String>)>,
    period_start: NaiveDate,
    period_end: NaiveDate,
    period_days: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<ProductDemandMetric> {
    struct Acc {
        total_quantity: i64,
        total_orders: i64,
        total_revenue: Decimal,
        price_sum: Decimal,
        price_lines: i64,
        daily: BTreeMap<NaiveDate, i64>,
    }

    let mut per_product: BTreeMap<i64, Acc> = BTreeMap::new();
    for row in rows {
        let acc = per_product.entry(row.product_id).or_insert_with(|| Acc {
            total_quantity: 0,
            total_orders: 0,
            total_revenue: Decimal::ZERO,
            price_sum: Decimal::ZERO,
            price_lines: 0,
            daily: BTreeMap::new(),
        });
        acc.total_quantity += row.quantity;
        acc.total_orders += row.orders;
        acc.total_revenue += row.revenue;
        acc.price_sum += row.price_sum;
        acc.price_lines += row.price_lines;
        *acc.daily.entry(row.day).or_insert(0) += row.quantity;
    }

    let mid_date = period_start + Duration::days((period_days / 2) as i64);

    per_product
        .into_iter()
        .map(|(product_id, acc)| {
            let daily_values: Vec<i64> = acc.daily.values().copied().collect();
            let max_daily = daily_values.iter().copied().max().unwrap_or(0);
            // Days without sales count as zero-demand days, so the minimum
            // is zero unless the product sold every day of the window.
            let min_daily = if acc.daily.len() < period_days as usize {
                0
            } else {
                daily_values.iter().copied().min().unwrap_or(0)
            };

            let average_daily = Decimal::from(acc.total_quantity)
                / Decimal::from(period_days.max(1));
            let average_price = if acc.price_lines > 0 {
                acc.price_sum / Decimal::from(acc.price_lines)
            } else {
                Decimal::ZERO
            };

            let first_half: i64 = acc
                .daily
                .iter()
                .filter(|(day, _)| **day < mid_date)
                .map(|(_, qty)| qty)
                .sum();
            let second_half: i64 = acc
                .daily
                .iter()
                .filter(|(day, _)| **day >= mid_date)
                .map(|(_, qty)| qty)
                .sum();
            let (trend, trend_pct) = classify_trend(first_half, second_half);

            let (name, sku) = names
                .get(&product_id)
                .cloned()
                .unwrap_or_else(|| (format!("Product {product_id}"), None));

            ProductDemandMetric {
                product_id,
                product_name: name,
                product_sku: sku,
                period_start,
                period_end,
                period_days: period_days as i32,
                total_quantity_sold: acc.total_quantity,
                total_orders: acc.total_orders as i32,
                average_daily_demand: average_daily,
                max_daily_demand: max_daily,
                min_daily_demand: min_daily,
                total_revenue: acc.total_revenue,
                average_price,
                trend,
                trend_percentage: decimal_from_f64(trend_pct),
                calculated_at: now,
            }
        })
        .collect()
}

/// Split-window trend: second half against the first with a ±10% band.
/// A silent first half classifies as stable.
pub(crate) fn classify_trend(first_half: i64, second_half: i64) -> (DemandTrend, f64) {
    if first_half <= 0 {
        return (DemandTrend::Stable, 0.0);
    }
    let pct = (second_half - first_half) as f64 / first_half as f64 * 100.0;
    let trend = if pct > 10.0 {
        DemandTrend::Increasing
    } else if pct < -10.0 {
        DemandTrend::Decreasing
    } else {
        DemandTrend::Stable
    };
    (trend, pct)
}

pub(crate) fn build_turnover_metric(
    stock: &ProductStock,
    demand: &ProductDemandMetric,
    period_start: NaiveDate,
    period_end: NaiveDate,
    period_days: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> InventoryTurnoverMetric {
    let current = stock.current_stock;
    let units_sold = demand.total_quantity_sold;
    let starting_inventory = current + units_sold;
    let average_inventory =
        Decimal::from(starting_inventory + current) / Decimal::from(2);

    let sentinel = Decimal::from_str_exact(crate::model::DAYS_OF_INVENTORY_CAP)
        .expect("sentinel parses");
    let (turnover_rate, days_of_inventory) = if average_inventory > Decimal::ZERO {
        let rate = Decimal::from(units_sold) / average_inventory;
        let days = if rate > Decimal::ZERO {
            (Decimal::from(period_days) / rate).min(sentinel)
        } else {
            sentinel
        };
        (rate, days)
    } else {
        (Decimal::ZERO, sentinel)
    };

    let stockout_risk = stockout_risk_band(current, demand.average_daily_demand);
    let overstock_risk = if days_of_inventory > Decimal::from(90) {
        RiskLevel::High
    } else if days_of_inventory > Decimal::from(60) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    InventoryTurnoverMetric {
        product_id: stock.product_id,
        product_name: stock.name.clone(),
        warehouse_id: stock.warehouse_id,
        warehouse_name: stock.warehouse_name.clone(),
        period_start,
        period_end,
        period_days: period_days as i32,
        average_inventory,
        starting_inventory,
        ending_inventory: current,
        units_sold,
        // The revenue stands in for cost of goods sold.
        cost_of_goods_sold: demand.total_revenue,
        turnover_rate,
        days_of_inventory,
        classification: TurnoverClass::from_rate(turnover_rate),
        stockout_risk,
        overstock_risk,
        calculated_at: now,
    }
}

/// Days-of-stock bands at current daily demand: high under 7, medium
/// under 14.
fn stockout_risk_band(current_stock: i64, average_daily_demand: Decimal) -> RiskLevel {
    let daily = average_daily_demand.to_f64().unwrap_or(0.0);
    if daily <= 0.0 {
        return RiskLevel::Low;
    }
    let days_remaining = current_stock as f64 / daily;
    if days_remaining < 7.0 {
        RiskLevel::High
    } else if days_remaining < 14.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn facts_for(quantities: &[(u32, i64)]) -> Vec<ProductDaySales> {
        quantities
            .iter()
            .map(|(d, qty)| ProductDaySales {
                product_id: 1,
                day: day(*d),
                quantity: *qty,
                revenue: Decimal::from(*qty) * Decimal::from(10),
                orders: 1,
                price_sum: Decimal::from(10),
                price_lines: 1,
            })
            .collect()
    }

    #[test]
    fn trend_increasing_at_thirty_percent() {
        // Days 1-15 average 10/day, days 16-30 average 13/day.
        let mut quantities = Vec::new();
        for d in 1..=15 {
            quantities.push((d, 10));
        }
        for d in 16..=30 {
            quantities.push((d, 13));
        }

        let metrics = assemble_demand_metrics(
            facts_for(&quantities),
            &HashMap::new(),
            day(1),
            day(31),
            30,
            Utc::now(),
        );

        assert_eq!(metrics.len(), 1);
        let metric = &metrics[0];
        assert_eq!(metric.trend, DemandTrend::Increasing);
        assert_eq!(metric.trend_percentage, Decimal::from(30));
    }

    #[test]
    fn trend_bands() {
        assert_eq!(classify_trend(100, 111).0, DemandTrend::Increasing);
        assert_eq!(classify_trend(100, 110).0, DemandTrend::Stable);
        assert_eq!(classify_trend(100, 90).0, DemandTrend::Stable);
        assert_eq!(classify_trend(100, 89).0, DemandTrend::Decreasing);
        assert_eq!(classify_trend(0, 50), (DemandTrend::Stable, 0.0));
    }

    #[test]
    fn demand_invariant_min_avg_max() {
        let metrics = assemble_demand_metrics(
            facts_for(&[(1, 5), (2, 9), (3, 1)]),
            &HashMap::new(),
            day(1),
            day(31),
            30,
            Utc::now(),
        );
        let metric = &metrics[0];
        let avg = metric.average_daily_demand;
        assert!(Decimal::from(metric.min_daily_demand) <= avg);
        assert!(avg <= Decimal::from(metric.max_daily_demand));
        assert_eq!(metric.min_daily_demand, 0);
        assert_eq!(metric.max_daily_demand, 9);
    }

    #[test]
    fn turnover_math_and_classification() {
        let stock = ProductStock {
            product_id: 1,
            name: "Oil filter".into(),
            sku: None,
            current_stock: 50,
            min_stock: 5,
            warehouse_id: Some(1),
            warehouse_name: Some("Central".into()),
        };
        let demand = demand_metric(150, Decimal::from(5));

        let metric =
            build_turnover_metric(&stock, &demand, day(1), day(31), 30, Utc::now());

        assert_eq!(metric.starting_inventory, 200);
        assert_eq!(metric.average_inventory, Decimal::from(125));
        // 150 / 125 = 1.2 -> slow moving, 30 / 1.2 = 25 days of inventory.
        assert_eq!(metric.turnover_rate, Decimal::new(12, 1));
        assert_eq!(metric.days_of_inventory, Decimal::from(25));
        assert_eq!(metric.classification, TurnoverClass::SlowMoving);
        // 50 / 5 = 10 days of stock -> medium stockout risk.
        assert_eq!(metric.stockout_risk, RiskLevel::Medium);
        assert_eq!(metric.overstock_risk, RiskLevel::Low);
    }

    #[test]
    fn zero_demand_gets_sentinel_days() {
        let stock = ProductStock {
            product_id: 2,
            name: "Gasket".into(),
            sku: None,
            current_stock: 0,
            min_stock: 0,
            warehouse_id: None,
            warehouse_name: None,
        };
        let demand = demand_metric(0, Decimal::ZERO);

        let metric =
            build_turnover_metric(&stock, &demand, day(1), day(31), 30, Utc::now());

        assert_eq!(metric.turnover_rate, Decimal::ZERO);
        assert_eq!(
            metric.days_of_inventory,
            Decimal::from_str_exact("999.99").unwrap()
        );
        assert_eq!(metric.classification, TurnoverClass::Obsolete);
        assert_eq!(metric.overstock_risk, RiskLevel::High);
        assert_eq!(metric.stockout_risk, RiskLevel::Low);
    }

    fn demand_metric(total_quantity: i64, average_daily: Decimal) -> ProductDemandMetric {
        ProductDemandMetric {
            product_id: 1,
            product_name: "Oil filter".into(),
            product_sku: None,
            period_start: day(1),
            period_end: day(31),
            period_days: 30,
            total_quantity_sold: total_quantity,
            total_orders: 10,
            average_daily_demand: average_daily,
            max_daily_demand: 10,
            min_daily_demand: 0,
            total_revenue: Decimal::from(1500),
            average_price: Decimal::from(10),
            trend: DemandTrend::Stable,
            trend_percentage: Decimal::ZERO,
            calculated_at: Utc::now(),
        }
    }
}
