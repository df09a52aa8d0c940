//! # Analytics Data Models
//!
//! Persisted entities of the analytics engine: aggregated metrics, reorder
//! recommendations, forecast accuracy history and event stream positions.
//!
//! Metric tables are owned by the aggregator (writes) and read by the
//! forecast and restock subsystems. Recommendations are owned by the
//! analyzer and mutate only through the explicit status transitions below.

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sentinel for "infinite" days of inventory when turnover is zero.
pub const DAYS_OF_INVENTORY_CAP: &str = "999.99";

/// Aggregated sales for one calendar day. Unique by `date`.
///
/// Invariant: `average_order_value = total_sales / total_orders` when
/// `total_orders > 0`, else 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailySalesMetric {
    pub date: NaiveDate,
    pub total_sales: Decimal,
    pub total_orders: i32,
    pub average_order_value: Decimal,
    pub products_sold: i32,
    pub unique_products: i32,
    pub unique_customers: i32,
    pub calculated_at: DateTime<Utc>,
}

impl DailySalesMetric {
    pub fn empty(date: NaiveDate, calculated_at: DateTime<Utc>) -> Self {
        Self {
            date,
            total_sales: Decimal::ZERO,
            total_orders: 0,
            average_order_value: Decimal::ZERO,
            products_sold: 0,
            unique_products: 0,
            unique_customers: 0,
            calculated_at,
        }
    }

    /// Recompute the derived average after mutating totals.
    pub fn recalculate_average(&mut self) {
        self.average_order_value = if self.total_orders > 0 {
            self.total_sales / Decimal::from(self.total_orders)
        } else {
            Decimal::ZERO
        };
    }

    /// Fold one completed order into the day.
    pub fn apply_order(&mut self, total: Decimal, quantity_sum: i64) {
        self.total_sales += total;
        self.total_orders += 1;
        self.products_sold += quantity_sum as i32;
        self.recalculate_average();
    }

    /// Reverse one cancelled order, floored at zero.
    pub fn apply_cancellation(&mut self, total: Decimal) {
        self.total_orders = (self.total_orders - 1).max(0);
        self.total_sales = (self.total_sales - total).max(Decimal::ZERO);
        self.recalculate_average();
    }
}

/// Demand trend classification over a period: the second half of the window
/// against the first, with a ±10% dead band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "demand_trend", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DemandTrend {
    Increasing,
    Stable,
    Decreasing,
}

/// Per-product demand over a sliding window.
/// Unique by `(product_id, period_start, period_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductDemandMetric {
    pub product_id: i64,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_days: i32,
    pub total_quantity_sold: i64,
    pub total_orders: i32,
    pub average_daily_demand: Decimal,
    pub max_daily_demand: i64,
    pub min_daily_demand: i64,
    pub total_revenue: Decimal,
    pub average_price: Decimal,
    pub trend: DemandTrend,
    pub trend_percentage: Decimal,
    pub calculated_at: DateTime<Utc>,
}

/// Turnover speed classification from the turnover rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "turnover_class", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TurnoverClass {
    FastMoving,
    MediumMoving,
    SlowMoving,
    Obsolete,
}

impl TurnoverClass {
    /// Thresholds: rate ≥ 4 fast, ≥ 2 medium, ≥ 0.5 slow, else obsolete.
    pub fn from_rate(rate: Decimal) -> Self {
        if rate >= Decimal::from(4) {
            TurnoverClass::FastMoving
        } else if rate >= Decimal::from(2) {
            TurnoverClass::MediumMoving
        } else if rate >= Decimal::new(5, 1) {
            TurnoverClass::SlowMoving
        } else {
            TurnoverClass::Obsolete
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "risk_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Inventory turnover over a window.
/// Unique by `(product_id, warehouse_id, period_start, period_end)`.
///
/// Invariant: `days_of_inventory = period_days / turnover_rate` when the
/// rate is positive, else the capped sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InventoryTurnoverMetric {
    pub product_id: i64,
    pub product_name: String,
    pub warehouse_id: Option<i64>,
    pub warehouse_name: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_days: i32,
    pub average_inventory: Decimal,
    pub starting_inventory: i64,
    pub ending_inventory: i64,
    pub units_sold: i64,
    pub cost_of_goods_sold: Decimal,
    pub turnover_rate: Decimal,
    pub days_of_inventory: Decimal,
    pub classification: TurnoverClass,
    pub stockout_risk: RiskLevel,
    pub overstock_risk: RiskLevel,
    pub calculated_at: DateTime<Utc>,
}

/// Reorder urgency. The ordering is semantic:
/// `low < medium < high < urgent < critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "reorder_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReorderPriority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl ReorderPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReorderPriority::Low => "low",
            ReorderPriority::Medium => "medium",
            ReorderPriority::High => "high",
            ReorderPriority::Urgent => "urgent",
            ReorderPriority::Critical => "critical",
        }
    }

    pub fn all() -> [ReorderPriority; 5] {
        [
            ReorderPriority::Low,
            ReorderPriority::Medium,
            ReorderPriority::High,
            ReorderPriority::Urgent,
            ReorderPriority::Critical,
        ]
    }
}

impl std::str::FromStr for ReorderPriority {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(ReorderPriority::Low),
            "medium" => Ok(ReorderPriority::Medium),
            "high" => Ok(ReorderPriority::High),
            "urgent" => Ok(ReorderPriority::Urgent),
            "critical" => Ok(ReorderPriority::Critical),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unknown priority `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recommendation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Reviewed,
    Ordered,
    Dismissed,
}

/// A reorder recommendation. Unique by `(product_id, warehouse_id,
/// created_day)`; mutable fields resolve last-writer-wins on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockReorderRecommendation {
    pub product_id: i64,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub warehouse_id: Option<i64>,
    pub warehouse_name: Option<String>,
    pub current_stock: i64,
    pub min_stock_level: i64,
    pub average_daily_demand: Decimal,
    pub predicted_demand_7d: i64,
    pub predicted_demand_30d: i64,
    pub recommended_order_quantity: i64,
    pub reorder_priority: ReorderPriority,
    pub safety_stock: i64,
    pub reorder_point: i64,
    pub stockout_date_estimate: Option<NaiveDate>,
    pub recommended_order_date: Option<NaiveDate>,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockReorderRecommendation {
    fn transition(&mut self, to: RecommendationStatus, at: DateTime<Utc>) -> Result<()> {
        use RecommendationStatus::*;
        let allowed = matches!(
            (self.status, to),
            (Pending, Reviewed) | (Reviewed, Ordered) | (Pending, Dismissed) | (Reviewed, Dismissed)
        );
        if !allowed {
            return Err(AnalyticsError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_reviewed(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(RecommendationStatus::Reviewed, at)
    }

    pub fn mark_ordered(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(RecommendationStatus::Ordered, at)
    }

    pub fn dismiss(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(RecommendationStatus::Dismissed, at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "forecast_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    Sales,
    ProductDemand,
    CategorySales,
    WarehouseInventory,
}

/// One persisted prediction awaiting (or joined with) its actual value.
///
/// Invariant: `horizon_days = predicted_date − forecast_date`; error
/// fields are present only once `actual_value` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ForecastAccuracyRecord {
    pub id: Uuid,
    pub forecast_type: ForecastType,
    pub scope_id: Option<i64>,
    pub forecast_date: NaiveDate,
    pub predicted_date: NaiveDate,
    pub horizon_days: i32,
    pub predicted_value: Decimal,
    pub actual_value: Option<Decimal>,
    pub confidence_lower: Option<Decimal>,
    pub confidence_upper: Option<Decimal>,
    pub absolute_error: Option<Decimal>,
    pub percentage_error: Option<Decimal>,
    pub within_confidence: Option<bool>,
    pub model_name: String,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ForecastAccuracyRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        forecast_type: ForecastType,
        scope_id: Option<i64>,
        forecast_date: NaiveDate,
        predicted_date: NaiveDate,
        predicted_value: Decimal,
        confidence_lower: Option<Decimal>,
        confidence_upper: Option<Decimal>,
        model_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            forecast_type,
            scope_id,
            forecast_date,
            predicted_date,
            horizon_days: (predicted_date - forecast_date).num_days() as i32,
            predicted_value,
            actual_value: None,
            confidence_lower,
            confidence_upper,
            absolute_error: None,
            percentage_error: None,
            within_confidence: None,
            model_name: model_name.into(),
            model_version: Some(crate::forecast::MODEL_VERSION.to_string()),
            created_at,
            updated_at: created_at,
        }
    }

    /// Join the actual value and derive the error metrics.
    pub fn record_actual(&mut self, actual: Decimal, at: DateTime<Utc>) {
        self.actual_value = Some(actual);
        self.absolute_error = Some((self.predicted_value - actual).abs());
        if !actual.is_zero() {
            self.percentage_error =
                Some((self.predicted_value - actual) / actual * Decimal::from(100));
        }
        if let (Some(lower), Some(upper)) = (self.confidence_lower, self.confidence_upper) {
            self.within_confidence = Some(lower <= actual && actual <= upper);
        }
        self.updated_at = at;
    }
}

/// Durable read position of one consumer over one stream. Monotonically
/// non-decreasing per `(consumer_name, stream_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventStreamPosition {
    pub consumer_name: String,
    pub stream_name: String,
    pub last_event_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Helper for converting forecast-space `f64` values into stored decimals.
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_metric_average_follows_totals() {
        let mut metric = DailySalesMetric::empty(day(2025, 3, 10), Utc::now());
        metric.apply_order(Decimal::from(1000), 2);
        metric.apply_order(Decimal::from(500), 1);

        assert_eq!(metric.total_sales, Decimal::from(1500));
        assert_eq!(metric.total_orders, 2);
        assert_eq!(metric.products_sold, 3);
        assert_eq!(metric.average_order_value, Decimal::from(750));
    }

    #[test]
    fn cancellation_floors_at_zero() {
        let mut metric = DailySalesMetric::empty(day(2025, 3, 10), Utc::now());
        metric.apply_order(Decimal::from(500), 1);

        metric.apply_cancellation(Decimal::from(500));
        metric.apply_cancellation(Decimal::from(500));

        assert_eq!(metric.total_orders, 0);
        assert_eq!(metric.total_sales, Decimal::ZERO);
        assert_eq!(metric.average_order_value, Decimal::ZERO);
    }

    #[test]
    fn turnover_classification_thresholds() {
        assert_eq!(
            TurnoverClass::from_rate(Decimal::new(41, 1)),
            TurnoverClass::FastMoving
        );
        assert_eq!(
            TurnoverClass::from_rate(Decimal::from(4)),
            TurnoverClass::FastMoving
        );
        assert_eq!(
            TurnoverClass::from_rate(Decimal::from(3)),
            TurnoverClass::MediumMoving
        );
        assert_eq!(
            TurnoverClass::from_rate(Decimal::new(5, 1)),
            TurnoverClass::SlowMoving
        );
        assert_eq!(
            TurnoverClass::from_rate(Decimal::new(4, 1)),
            TurnoverClass::Obsolete
        );
    }

    #[test]
    fn priority_order_is_strict() {
        use ReorderPriority::*;
        assert!(Low < Medium);
        assert!(Medium < High);
        assert!(High < Urgent);
        assert!(Urgent < Critical);
    }

    #[test]
    fn recommendation_transitions() {
        let now = Utc::now();
        let mut rec = sample_recommendation(now);

        assert!(rec.mark_ordered(now).is_err());
        rec.mark_reviewed(now).unwrap();
        rec.mark_ordered(now).unwrap();
        assert_eq!(rec.status, RecommendationStatus::Ordered);

        // Terminal states reject further transitions.
        assert!(rec.dismiss(now).is_err());

        let mut rec = sample_recommendation(now);
        rec.dismiss(now).unwrap();
        assert!(rec.mark_reviewed(now).is_err());
    }

    #[test]
    fn accuracy_record_derives_errors() {
        let created = Utc::now();
        let mut record = ForecastAccuracyRecord::new(
            ForecastType::Sales,
            None,
            day(2025, 3, 1),
            day(2025, 3, 8),
            Decimal::from(110),
            Some(Decimal::from(90)),
            Some(Decimal::from(130)),
            "seasonal",
            created,
        );

        assert_eq!(record.horizon_days, 7);
        assert!(record.absolute_error.is_none());

        record.record_actual(Decimal::from(100), created);
        assert_eq!(record.absolute_error, Some(Decimal::from(10)));
        assert_eq!(record.percentage_error, Some(Decimal::from(10)));
        assert_eq!(record.within_confidence, Some(true));
    }

    #[test]
    fn accuracy_record_skips_percentage_on_zero_actual() {
        let created = Utc::now();
        let mut record = ForecastAccuracyRecord::new(
            ForecastType::Sales,
            None,
            day(2025, 3, 1),
            day(2025, 3, 2),
            Decimal::from(5),
            None,
            None,
            "seasonal",
            created,
        );
        record.record_actual(Decimal::ZERO, created);
        assert_eq!(record.absolute_error, Some(Decimal::from(5)));
        assert!(record.percentage_error.is_none());
        assert!(record.within_confidence.is_none());
    }

    fn sample_recommendation(now: DateTime<Utc>) -> StockReorderRecommendation {
        StockReorderRecommendation {
            product_id: 1,
            product_name: "Brake pad".into(),
            product_sku: Some("BP-100".into()),
            warehouse_id: None,
            warehouse_name: None,
            current_stock: 10,
            min_stock_level: 0,
            average_daily_demand: Decimal::from(5),
            predicted_demand_7d: 35,
            predicted_demand_30d: 150,
            recommended_order_quantity: 150,
            reorder_priority: ReorderPriority::High,
            safety_stock: 70,
            reorder_point: 105,
            stockout_date_estimate: None,
            recommended_order_date: None,
            status: RecommendationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
