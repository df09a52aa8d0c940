use super::{AccuracyStats, AnalyticsRepository};
use crate::error::Result;
use crate::model::{
    DailySalesMetric, ForecastAccuracyRecord, InventoryTurnoverMetric, ProductDemandMetric,
    RecommendationStatus, RiskLevel, StockReorderRecommendation,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory repository mirroring the Postgres semantics. Injected in
/// tests wherever production code takes an `Arc<dyn AnalyticsRepository>`.
#[derive(Default)]
pub struct MemoryAnalyticsRepository {
    inner: Mutex<Inner>,
    poisoned_products: Mutex<std::collections::HashSet<i64>>,
}

#[derive(Default)]
struct Inner {
    daily_sales: BTreeMap<NaiveDate, DailySalesMetric>,
    demand: BTreeMap<(i64, NaiveDate, NaiveDate), ProductDemandMetric>,
    turnover: BTreeMap<(i64, Option<i64>, NaiveDate, NaiveDate), InventoryTurnoverMetric>,
    recommendations: BTreeMap<(i64, Option<i64>, NaiveDate), StockReorderRecommendation>,
    accuracy: Vec<ForecastAccuracyRecord>,
    positions: BTreeMap<(String, String), String>,
}

impl MemoryAnalyticsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recommendation_count(&self) -> usize {
        self.inner.lock().expect("repo lock").recommendations.len()
    }

    pub fn accuracy_count(&self) -> usize {
        self.inner.lock().expect("repo lock").accuracy.len()
    }

    /// Make demand reads for one product fail, simulating a datastore
    /// error for batch-isolation tests.
    pub fn poison_product(&self, product_id: i64) {
        self.poisoned_products
            .lock()
            .expect("poison lock")
            .insert(product_id);
    }

    fn check_poisoned(&self, product_id: i64) -> Result<()> {
        if self
            .poisoned_products
            .lock()
            .expect("poison lock")
            .contains(&product_id)
        {
            return Err(restock_core::Error::Internal(format!(
                "simulated datastore failure for product {product_id}"
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsRepository for MemoryAnalyticsRepository {
    async fn upsert_daily_sales(&self, metric: &DailySalesMetric) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        inner.daily_sales.insert(metric.date, metric.clone());
        Ok(())
    }

    async fn daily_sales_on(&self, date: NaiveDate) -> Result<Option<DailySalesMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        Ok(inner.daily_sales.get(&date).cloned())
    }

    async fn daily_sales_tail(&self, limit: i64) -> Result<Vec<DailySalesMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        let rows: Vec<_> = inner.daily_sales.values().cloned().collect();
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn delete_daily_sales_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.lock().expect("repo lock");
        let before = inner.daily_sales.len();
        inner.daily_sales.retain(|date, _| *date >= cutoff);
        Ok((before - inner.daily_sales.len()) as u64)
    }

    async fn upsert_product_demand(&self, metric: &ProductDemandMetric) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        inner.demand.insert(
            (metric.product_id, metric.period_start, metric.period_end),
            metric.clone(),
        );
        Ok(())
    }

    async fn demand_tail_for_product(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>> {
        self.check_poisoned(product_id)?;
        let inner = self.inner.lock().expect("repo lock");
        let mut rows: Vec<_> = inner
            .demand
            .values()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.period_end);
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn latest_demand_for_product(
        &self,
        product_id: i64,
    ) -> Result<Option<ProductDemandMetric>> {
        Ok(self
            .demand_tail_for_product(product_id, i64::MAX)
            .await?
            .pop())
    }

    async fn demand_covering(
        &self,
        product_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ProductDemandMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        let mut rows: Vec<_> = inner
            .demand
            .values()
            .filter(|m| {
                m.product_id == product_id && m.period_start <= date && m.period_end >= date
            })
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.period_end);
        Ok(rows.pop())
    }

    async fn demand_window(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ProductDemandMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        Ok(inner
            .demand
            .values()
            .filter(|m| m.period_start == period_start && m.period_end == period_end)
            .cloned()
            .collect())
    }

    async fn top_demand_products(
        &self,
        since: NaiveDate,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        let mut latest: BTreeMap<i64, ProductDemandMetric> = BTreeMap::new();
        for metric in inner.demand.values() {
            if metric.period_end < since {
                continue;
            }
            let slot = latest.entry(metric.product_id).or_insert_with(|| metric.clone());
            if metric.period_end > slot.period_end {
                *slot = metric.clone();
            }
        }
        let mut rows: Vec<_> = latest.into_values().collect();
        rows.sort_by(|a, b| b.average_daily_demand.cmp(&a.average_daily_demand));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn top_revenue_products(&self, limit: i64) -> Result<Vec<ProductDemandMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        let mut latest: BTreeMap<i64, ProductDemandMetric> = BTreeMap::new();
        for metric in inner.demand.values() {
            let slot = latest.entry(metric.product_id).or_insert_with(|| metric.clone());
            if metric.period_end > slot.period_end {
                *slot = metric.clone();
            }
        }
        let mut rows: Vec<_> = latest.into_values().collect();
        rows.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn delete_product_demand_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.lock().expect("repo lock");
        let before = inner.demand.len();
        inner.demand.retain(|_, m| m.period_end >= cutoff);
        Ok((before - inner.demand.len()) as u64)
    }

    async fn upsert_turnover(&self, metric: &InventoryTurnoverMetric) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        inner.turnover.insert(
            (
                metric.product_id,
                metric.warehouse_id,
                metric.period_start,
                metric.period_end,
            ),
            metric.clone(),
        );
        Ok(())
    }

    async fn turnover_at_risk_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<InventoryTurnoverMetric>> {
        let inner = self.inner.lock().expect("repo lock");
        let mut rows: Vec<_> = inner
            .turnover
            .values()
            .filter(|m| m.period_end >= since && m.stockout_risk >= RiskLevel::Medium)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        Ok(rows)
    }

    async fn warehouse_products(&self, warehouse_id: i64) -> Result<Vec<i64>> {
        let inner = self.inner.lock().expect("repo lock");
        let mut ids: Vec<i64> = inner
            .turnover
            .values()
            .filter(|m| m.warehouse_id == Some(warehouse_id))
            .map(|m| m.product_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn delete_turnover_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.lock().expect("repo lock");
        let before = inner.turnover.len();
        inner.turnover.retain(|_, m| m.period_end >= cutoff);
        Ok((before - inner.turnover.len()) as u64)
    }

    async fn upsert_recommendation(&self, rec: &StockReorderRecommendation) -> Result<bool> {
        let mut inner = self.inner.lock().expect("repo lock");
        let key = (
            rec.product_id,
            rec.warehouse_id,
            rec.created_at.date_naive(),
        );
        let created = !inner.recommendations.contains_key(&key);
        // Last writer wins for mutable fields; insertion is idempotent.
        inner.recommendations.insert(key, rec.clone());
        Ok(created)
    }

    async fn get_recommendation(
        &self,
        product_id: i64,
        warehouse_id: Option<i64>,
        created_day: NaiveDate,
    ) -> Result<Option<StockReorderRecommendation>> {
        let inner = self.inner.lock().expect("repo lock");
        Ok(inner
            .recommendations
            .get(&(product_id, warehouse_id, created_day))
            .cloned())
    }

    async fn save_recommendation_status(&self, rec: &StockReorderRecommendation) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        let key = (
            rec.product_id,
            rec.warehouse_id,
            rec.created_at.date_naive(),
        );
        if let Some(existing) = inner.recommendations.get_mut(&key) {
            existing.status = rec.status;
            existing.updated_at = rec.updated_at;
        }
        Ok(())
    }

    async fn delete_unordered_recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().expect("repo lock");
        let before = inner.recommendations.len();
        inner
            .recommendations
            .retain(|_, r| r.created_at >= cutoff || r.status == RecommendationStatus::Ordered);
        Ok((before - inner.recommendations.len()) as u64)
    }

    async fn insert_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        inner.accuracy.push(record.clone());
        Ok(())
    }

    async fn pending_accuracy(&self, as_of: NaiveDate) -> Result<Vec<ForecastAccuracyRecord>> {
        let inner = self.inner.lock().expect("repo lock");
        Ok(inner
            .accuracy
            .iter()
            .filter(|r| r.actual_value.is_none() && r.predicted_date <= as_of)
            .cloned()
            .collect())
    }

    async fn update_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        if let Some(existing) = inner.accuracy.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn accuracy_stats_since(&self, since: NaiveDate) -> Result<AccuracyStats> {
        let inner = self.inner.lock().expect("repo lock");
        let resolved: Vec<_> = inner
            .accuracy
            .iter()
            .filter(|r| r.actual_value.is_some() && r.forecast_date >= since)
            .collect();

        let total = resolved.len() as i64;
        let mapes: Vec<f64> = resolved
            .iter()
            .filter_map(|r| r.percentage_error.and_then(|p| p.abs().to_f64()))
            .collect();
        let maes: Vec<f64> = resolved
            .iter()
            .filter_map(|r| r.absolute_error.and_then(|e| e.to_f64()))
            .collect();

        Ok(AccuracyStats {
            total,
            avg_mape: mean(&mapes),
            avg_mae: mean(&maes),
            within_confidence: resolved
                .iter()
                .filter(|r| r.within_confidence == Some(true))
                .count() as i64,
        })
    }

    async fn delete_accuracy_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.lock().expect("repo lock");
        let before = inner.accuracy.len();
        inner.accuracy.retain(|r| r.forecast_date >= cutoff);
        Ok((before - inner.accuracy.len()) as u64)
    }

    async fn load_position(&self, consumer: &str, stream: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().expect("repo lock");
        Ok(inner
            .positions
            .get(&(consumer.to_string(), stream.to_string()))
            .cloned())
    }

    async fn store_position(
        &self,
        consumer: &str,
        stream: &str,
        event_id: &str,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("repo lock");
        inner.positions.insert(
            (consumer.to_string(), stream.to_string()),
            event_id.to_string(),
        );
        Ok(())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
