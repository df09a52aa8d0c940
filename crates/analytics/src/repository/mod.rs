//! Data access layer for the analytics entities.
//!
//! All writes are upserts keyed per the uniqueness rules of the data
//! model, so retried batches and replayed events stay idempotent. The
//! Postgres implementation is the production path; the in-memory
//! implementation backs tests and exercises identical semantics.

mod memory;
mod postgres;

pub use memory::MemoryAnalyticsRepository;
pub use postgres::PostgresAnalyticsRepository;

use crate::error::Result;
use crate::model::{
    DailySalesMetric, ForecastAccuracyRecord, InventoryTurnoverMetric, ProductDemandMetric,
    StockReorderRecommendation,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Aggregate accuracy figures over a trailing window.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AccuracyStats {
    pub total: i64,
    pub avg_mape: Option<f64>,
    pub avg_mae: Option<f64>,
    pub within_confidence: i64,
}

impl AccuracyStats {
    pub fn confidence_rate(&self) -> f64 {
        if self.total > 0 {
            self.within_confidence as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    // Daily sales metrics
    async fn upsert_daily_sales(&self, metric: &DailySalesMetric) -> Result<()>;
    async fn daily_sales_on(&self, date: NaiveDate) -> Result<Option<DailySalesMetric>>;
    /// Last `limit` days in ascending date order.
    async fn daily_sales_tail(&self, limit: i64) -> Result<Vec<DailySalesMetric>>;
    async fn delete_daily_sales_before(&self, cutoff: NaiveDate) -> Result<u64>;

    // Product demand metrics
    async fn upsert_product_demand(&self, metric: &ProductDemandMetric) -> Result<()>;
    /// Last `limit` windows for a product in ascending `period_end` order.
    async fn demand_tail_for_product(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>>;
    async fn latest_demand_for_product(&self, product_id: i64)
        -> Result<Option<ProductDemandMetric>>;
    /// The window whose `[period_start, period_end]` covers `date`.
    async fn demand_covering(
        &self,
        product_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ProductDemandMetric>>;
    async fn demand_window(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ProductDemandMetric>>;
    /// Products with recent demand, highest average daily demand first.
    async fn top_demand_products(
        &self,
        since: NaiveDate,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>>;
    /// Products by recent total revenue, highest first (one row per product).
    async fn top_revenue_products(&self, limit: i64) -> Result<Vec<ProductDemandMetric>>;
    async fn delete_product_demand_before(&self, cutoff: NaiveDate) -> Result<u64>;

    // Inventory turnover metrics
    async fn upsert_turnover(&self, metric: &InventoryTurnoverMetric) -> Result<()>;
    /// Recent turnover rows with medium or high stockout risk.
    async fn turnover_at_risk_since(&self, since: NaiveDate)
        -> Result<Vec<InventoryTurnoverMetric>>;
    /// Distinct product ids observed in a warehouse.
    async fn warehouse_products(&self, warehouse_id: i64) -> Result<Vec<i64>>;
    async fn delete_turnover_before(&self, cutoff: NaiveDate) -> Result<u64>;

    // Reorder recommendations
    /// Upsert keyed by `(product_id, warehouse_id, created_day)`.
    /// Returns `true` when a new row was inserted.
    async fn upsert_recommendation(&self, rec: &StockReorderRecommendation) -> Result<bool>;
    async fn get_recommendation(
        &self,
        product_id: i64,
        warehouse_id: Option<i64>,
        created_day: NaiveDate,
    ) -> Result<Option<StockReorderRecommendation>>;
    async fn save_recommendation_status(&self, rec: &StockReorderRecommendation) -> Result<()>;
    /// Retention: drop old recommendations except those already `ordered`.
    async fn delete_unordered_recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // Forecast accuracy history
    async fn insert_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()>;
    /// Records with no actual value whose predicted date has passed.
    async fn pending_accuracy(&self, as_of: NaiveDate) -> Result<Vec<ForecastAccuracyRecord>>;
    async fn update_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()>;
    async fn accuracy_stats_since(&self, since: NaiveDate) -> Result<AccuracyStats>;
    async fn delete_accuracy_before(&self, cutoff: NaiveDate) -> Result<u64>;

    // Event stream positions
    async fn load_position(&self, consumer: &str, stream: &str) -> Result<Option<String>>;
    async fn store_position(
        &self,
        consumer: &str,
        stream: &str,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
