use super::{AccuracyStats, AnalyticsRepository};
use crate::error::Result;
use crate::model::{
    DailySalesMetric, ForecastAccuracyRecord, InventoryTurnoverMetric, ProductDemandMetric,
    StockReorderRecommendation,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

/// Postgres-backed repository. Schema lives in `migrations/`.
pub struct PostgresAnalyticsRepository {
    pool: PgPool,
}

impl PostgresAnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsRepository for PostgresAnalyticsRepository {
    async fn upsert_daily_sales(&self, metric: &DailySalesMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_sales_metrics
                (date, total_sales, total_orders, average_order_value,
                 products_sold, unique_products, unique_customers, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date) DO UPDATE SET
                total_sales = EXCLUDED.total_sales,
                total_orders = EXCLUDED.total_orders,
                average_order_value = EXCLUDED.average_order_value,
                products_sold = EXCLUDED.products_sold,
                unique_products = EXCLUDED.unique_products,
                unique_customers = EXCLUDED.unique_customers,
                calculated_at = EXCLUDED.calculated_at
            "#,
        )
        .bind(metric.date)
        .bind(metric.total_sales)
        .bind(metric.total_orders)
        .bind(metric.average_order_value)
        .bind(metric.products_sold)
        .bind(metric.unique_products)
        .bind(metric.unique_customers)
        .bind(metric.calculated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn daily_sales_on(&self, date: NaiveDate) -> Result<Option<DailySalesMetric>> {
        let metric = sqlx::query_as::<_, DailySalesMetric>(
            "SELECT * FROM daily_sales_metrics WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metric)
    }

    async fn daily_sales_tail(&self, limit: i64) -> Result<Vec<DailySalesMetric>> {
        let mut rows = sqlx::query_as::<_, DailySalesMetric>(
            "SELECT * FROM daily_sales_metrics ORDER BY date DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    async fn delete_daily_sales_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_sales_metrics WHERE date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_product_demand(&self, metric: &ProductDemandMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_demand_metrics
                (product_id, product_name, product_sku, period_start, period_end, period_days,
                 total_quantity_sold, total_orders, average_daily_demand,
                 max_daily_demand, min_daily_demand, total_revenue, average_price,
                 trend, trend_percentage, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (product_id, period_start, period_end) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                product_sku = EXCLUDED.product_sku,
                period_days = EXCLUDED.period_days,
                total_quantity_sold = EXCLUDED.total_quantity_sold,
                total_orders = EXCLUDED.total_orders,
                average_daily_demand = EXCLUDED.average_daily_demand,
                max_daily_demand = EXCLUDED.max_daily_demand,
                min_daily_demand = EXCLUDED.min_daily_demand,
                total_revenue = EXCLUDED.total_revenue,
                average_price = EXCLUDED.average_price,
                trend = EXCLUDED.trend,
                trend_percentage = EXCLUDED.trend_percentage,
                calculated_at = EXCLUDED.calculated_at
            "#,
        )
        .bind(metric.product_id)
        .bind(&metric.product_name)
        .bind(&metric.product_sku)
        .bind(metric.period_start)
        .bind(metric.period_end)
        .bind(metric.period_days)
        .bind(metric.total_quantity_sold)
        .bind(metric.total_orders)
        .bind(metric.average_daily_demand)
        .bind(metric.max_daily_demand)
        .bind(metric.min_daily_demand)
        .bind(metric.total_revenue)
        .bind(metric.average_price)
        .bind(metric.trend)
        .bind(metric.trend_percentage)
        .bind(metric.calculated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn demand_tail_for_product(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>> {
        let mut rows = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT * FROM product_demand_metrics
            WHERE product_id = $1
            ORDER BY period_end DESC
            LIMIT $2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    async fn latest_demand_for_product(
        &self,
        product_id: i64,
    ) -> Result<Option<ProductDemandMetric>> {
        let metric = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT * FROM product_demand_metrics
            WHERE product_id = $1
            ORDER BY period_end DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metric)
    }

    async fn demand_covering(
        &self,
        product_id: i64,
        date: NaiveDate,
    ) -> Result<Option<ProductDemandMetric>> {
        let metric = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT * FROM product_demand_metrics
            WHERE product_id = $1 AND period_start <= $2 AND period_end >= $2
            ORDER BY period_end DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metric)
    }

    async fn demand_window(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ProductDemandMetric>> {
        let rows = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT * FROM product_demand_metrics
            WHERE period_start = $1 AND period_end = $2
            "#,
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn top_demand_products(
        &self,
        since: NaiveDate,
        limit: i64,
    ) -> Result<Vec<ProductDemandMetric>> {
        let rows = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT DISTINCT ON (product_id) *
            FROM product_demand_metrics
            WHERE period_end >= $1
            ORDER BY product_id, period_end DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut rows = rows;
        rows.sort_by(|a, b| b.average_daily_demand.cmp(&a.average_daily_demand));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn top_revenue_products(&self, limit: i64) -> Result<Vec<ProductDemandMetric>> {
        let rows = sqlx::query_as::<_, ProductDemandMetric>(
            r#"
            SELECT DISTINCT ON (product_id) *
            FROM product_demand_metrics
            ORDER BY product_id, period_end DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut rows = rows;
        rows.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn delete_product_demand_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM product_demand_metrics WHERE period_end < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_turnover(&self, metric: &InventoryTurnoverMetric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_turnover_metrics
                (product_id, product_name, warehouse_id, warehouse_name,
                 period_start, period_end, period_days,
                 average_inventory, starting_inventory, ending_inventory, units_sold,
                 cost_of_goods_sold, turnover_rate, days_of_inventory,
                 classification, stockout_risk, overstock_risk, calculated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (product_id, warehouse_id, period_start, period_end) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                warehouse_name = EXCLUDED.warehouse_name,
                period_days = EXCLUDED.period_days,
                average_inventory = EXCLUDED.average_inventory,
                starting_inventory = EXCLUDED.starting_inventory,
                ending_inventory = EXCLUDED.ending_inventory,
                units_sold = EXCLUDED.units_sold,
                cost_of_goods_sold = EXCLUDED.cost_of_goods_sold,
                turnover_rate = EXCLUDED.turnover_rate,
                days_of_inventory = EXCLUDED.days_of_inventory,
                classification = EXCLUDED.classification,
                stockout_risk = EXCLUDED.stockout_risk,
                overstock_risk = EXCLUDED.overstock_risk,
                calculated_at = EXCLUDED.calculated_at
            "#,
        )
        .bind(metric.product_id)
        .bind(&metric.product_name)
        .bind(metric.warehouse_id)
        .bind(&metric.warehouse_name)
        .bind(metric.period_start)
        .bind(metric.period_end)
        .bind(metric.period_days)
        .bind(metric.average_inventory)
        .bind(metric.starting_inventory)
        .bind(metric.ending_inventory)
        .bind(metric.units_sold)
        .bind(metric.cost_of_goods_sold)
        .bind(metric.turnover_rate)
        .bind(metric.days_of_inventory)
        .bind(metric.classification)
        .bind(metric.stockout_risk)
        .bind(metric.overstock_risk)
        .bind(metric.calculated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn turnover_at_risk_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<InventoryTurnoverMetric>> {
        let rows = sqlx::query_as::<_, InventoryTurnoverMetric>(
            r#"
            SELECT * FROM inventory_turnover_metrics
            WHERE period_end >= $1 AND stockout_risk IN ('medium', 'high')
            ORDER BY calculated_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn warehouse_products(&self, warehouse_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT DISTINCT product_id FROM inventory_turnover_metrics WHERE warehouse_id = $1",
        )
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    async fn delete_turnover_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM inventory_turnover_metrics WHERE period_end < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_recommendation(&self, rec: &StockReorderRecommendation) -> Result<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_reorder_recommendations
                (product_id, product_name, product_sku, warehouse_id, warehouse_name,
                 current_stock, min_stock_level, average_daily_demand,
                 predicted_demand_7d, predicted_demand_30d, recommended_order_quantity,
                 reorder_priority, safety_stock, reorder_point,
                 stockout_date_estimate, recommended_order_date, status,
                 created_day, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (product_id, warehouse_id, created_day) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                product_sku = EXCLUDED.product_sku,
                warehouse_name = EXCLUDED.warehouse_name,
                current_stock = EXCLUDED.current_stock,
                min_stock_level = EXCLUDED.min_stock_level,
                average_daily_demand = EXCLUDED.average_daily_demand,
                predicted_demand_7d = EXCLUDED.predicted_demand_7d,
                predicted_demand_30d = EXCLUDED.predicted_demand_30d,
                recommended_order_quantity = EXCLUDED.recommended_order_quantity,
                reorder_priority = EXCLUDED.reorder_priority,
                safety_stock = EXCLUDED.safety_stock,
                reorder_point = EXCLUDED.reorder_point,
                stockout_date_estimate = EXCLUDED.stockout_date_estimate,
                recommended_order_date = EXCLUDED.recommended_order_date,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(rec.product_id)
        .bind(&rec.product_name)
        .bind(&rec.product_sku)
        .bind(rec.warehouse_id)
        .bind(&rec.warehouse_name)
        .bind(rec.current_stock)
        .bind(rec.min_stock_level)
        .bind(rec.average_daily_demand)
        .bind(rec.predicted_demand_7d)
        .bind(rec.predicted_demand_30d)
        .bind(rec.recommended_order_quantity)
        .bind(rec.reorder_priority)
        .bind(rec.safety_stock)
        .bind(rec.reorder_point)
        .bind(rec.stockout_date_estimate)
        .bind(rec.recommended_order_date)
        .bind(rec.status)
        .bind(rec.created_at.date_naive())
        .bind(rec.created_at)
        .bind(rec.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<bool, _>("inserted").unwrap_or(false))
    }

    async fn get_recommendation(
        &self,
        product_id: i64,
        warehouse_id: Option<i64>,
        created_day: NaiveDate,
    ) -> Result<Option<StockReorderRecommendation>> {
        let rec = sqlx::query_as::<_, StockReorderRecommendation>(
            r#"
            SELECT * FROM stock_reorder_recommendations
            WHERE product_id = $1 AND warehouse_id IS NOT DISTINCT FROM $2 AND created_day = $3
            "#,
        )
        .bind(product_id)
        .bind(warehouse_id)
        .bind(created_day)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn save_recommendation_status(&self, rec: &StockReorderRecommendation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE stock_reorder_recommendations
            SET status = $4, updated_at = $5
            WHERE product_id = $1 AND warehouse_id IS NOT DISTINCT FROM $2 AND created_day = $3
            "#,
        )
        .bind(rec.product_id)
        .bind(rec.warehouse_id)
        .bind(rec.created_at.date_naive())
        .bind(rec.status)
        .bind(rec.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_unordered_recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM stock_reorder_recommendations
            WHERE created_at < $1 AND status <> 'ordered'
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO forecast_accuracy
                (id, forecast_type, scope_id, forecast_date, predicted_date, horizon_days,
                 predicted_value, actual_value, confidence_lower, confidence_upper,
                 absolute_error, percentage_error, within_confidence,
                 model_name, model_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(record.id)
        .bind(record.forecast_type)
        .bind(record.scope_id)
        .bind(record.forecast_date)
        .bind(record.predicted_date)
        .bind(record.horizon_days)
        .bind(record.predicted_value)
        .bind(record.actual_value)
        .bind(record.confidence_lower)
        .bind(record.confidence_upper)
        .bind(record.absolute_error)
        .bind(record.percentage_error)
        .bind(record.within_confidence)
        .bind(&record.model_name)
        .bind(&record.model_version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_accuracy(&self, as_of: NaiveDate) -> Result<Vec<ForecastAccuracyRecord>> {
        let rows = sqlx::query_as::<_, ForecastAccuracyRecord>(
            r#"
            SELECT * FROM forecast_accuracy
            WHERE actual_value IS NULL AND predicted_date <= $1
            ORDER BY predicted_date
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_accuracy(&self, record: &ForecastAccuracyRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE forecast_accuracy
            SET actual_value = $2, absolute_error = $3, percentage_error = $4,
                within_confidence = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.actual_value)
        .bind(record.absolute_error)
        .bind(record.percentage_error)
        .bind(record.within_confidence)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn accuracy_stats_since(&self, since: NaiveDate) -> Result<AccuracyStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                AVG(ABS(percentage_error))::float8 AS avg_mape,
                AVG(absolute_error)::float8 AS avg_mae,
                COUNT(*) FILTER (WHERE within_confidence) AS within_confidence
            FROM forecast_accuracy
            WHERE actual_value IS NOT NULL AND forecast_date >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(AccuracyStats {
            total: row.try_get("total")?,
            avg_mape: row.try_get("avg_mape")?,
            avg_mae: row.try_get("avg_mae")?,
            within_confidence: row.try_get("within_confidence")?,
        })
    }

    async fn delete_accuracy_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM forecast_accuracy WHERE forecast_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn load_position(&self, consumer: &str, stream: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT last_event_id FROM event_stream_positions
            WHERE consumer_name = $1 AND stream_name = $2
            "#,
        )
        .bind(consumer)
        .bind(stream)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.get::<String, _>(0)))
    }

    async fn store_position(
        &self,
        consumer: &str,
        stream: &str,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_stream_positions (consumer_name, stream_name, last_event_id, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (consumer_name, stream_name) DO UPDATE SET
                last_event_id = EXCLUDED.last_event_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(consumer)
        .bind(stream)
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
