use super::{ProductDaySales, ProductStock};
use crate::error::Result;
use crate::model::DailySalesMetric;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::info;

/// Direct-datastore fallback used when the sales or inventory service is
/// unreachable. Reads the shared `sales_orders` / `sales_order_items` /
/// `products` tables and produces the same shapes as the HTTP path.
pub struct SqlFallback {
    pool: PgPool,
}

impl SqlFallback {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Daily sales aggregate for one date, or `None` when the day has no
    /// completed orders.
    pub async fn daily_sales(
        &self,
        date: NaiveDate,
        calculated_at: DateTime<Utc>,
    ) -> Result<Option<DailySalesMetric>> {
        let totals = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(o.total), 0)::numeric AS total_sales,
                COUNT(*) AS total_orders,
                COUNT(DISTINCT o.customer_id) AS unique_customers
            FROM sales_orders o
            WHERE o.status = 'COMPLETED' AND o.order_date::date = $1
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        let total_orders: i64 = totals.try_get("total_orders")?;
        if total_orders == 0 {
            return Ok(None);
        }

        let items = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(i.quantity), 0)::bigint AS products_sold,
                COUNT(DISTINCT i.product_id) AS unique_products
            FROM sales_order_items i
            JOIN sales_orders o ON o.id = i.order_id
            WHERE o.status = 'COMPLETED' AND o.order_date::date = $1
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        let total_sales: Decimal = totals.try_get("total_sales")?;
        let mut metric = DailySalesMetric {
            date,
            total_sales,
            total_orders: total_orders as i32,
            average_order_value: Decimal::ZERO,
            products_sold: items.try_get::<i64, _>("products_sold")? as i32,
            unique_products: items.try_get::<i64, _>("unique_products")? as i32,
            unique_customers: totals.try_get::<i64, _>("unique_customers")? as i32,
            calculated_at,
        };
        metric.recalculate_average();

        info!(%date, "daily sales computed via SQL fallback");
        Ok(Some(metric))
    }

    /// Per-product per-day sales facts for the demand window.
    pub(crate) async fn demand_rows(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ProductDaySales>> {
        let rows = sqlx::query(
            r#"
            SELECT
                i.product_id,
                o.order_date::date AS day,
                SUM(i.quantity)::bigint AS quantity,
                SUM(i.quantity * i.unit_price)::numeric AS revenue,
                COUNT(DISTINCT o.id) AS orders,
                SUM(i.unit_price)::numeric AS price_sum,
                COUNT(*) AS price_lines
            FROM sales_order_items i
            JOIN sales_orders o ON o.id = i.order_id
            WHERE o.status = 'COMPLETED'
              AND o.order_date::date BETWEEN $1 AND $2
              AND i.product_id IS NOT NULL
            GROUP BY i.product_id, day
            ORDER BY i.product_id, day
            "#,
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        let mut facts = Vec::with_capacity(rows.len());
        for row in rows {
            facts.push(ProductDaySales {
                product_id: row.try_get("product_id")?,
                day: row.try_get("day")?,
                quantity: row.try_get("quantity")?,
                revenue: row.try_get("revenue")?,
                orders: row.try_get("orders")?,
                price_sum: row.try_get("price_sum")?,
                price_lines: row.try_get("price_lines")?,
            });
        }

        info!(rows = facts.len(), "demand facts read via SQL fallback");
        Ok(facts)
    }

    /// Product `id -> (name, sku)` lookup from the shared catalog.
    pub(crate) async fn product_names(
        &self,
    ) -> Result<HashMap<i64, (String, Option<String>)>> {
        let rows = sqlx::query("SELECT id, name, sku FROM products")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<i64, _>("id"),
                    (row.get::<String, _>("name"), row.get::<Option<String>, _>("sku")),
                )
            })
            .collect())
    }

    /// Current stock snapshot per product from the shared catalog.
    pub(crate) async fn product_stocks(&self) -> Result<Vec<ProductStock>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.sku, p.quantity, p.min_stock,
                   p.warehouse_id, w.name AS warehouse_name
            FROM products p
            LEFT JOIN warehouses w ON w.id = p.warehouse_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stocks = Vec::with_capacity(rows.len());
        for row in rows {
            stocks.push(ProductStock {
                product_id: row.try_get("id")?,
                name: row.try_get("name")?,
                sku: row.try_get("sku")?,
                current_stock: row.try_get("quantity")?,
                min_stock: row.try_get("min_stock")?,
                warehouse_id: row.try_get("warehouse_id")?,
                warehouse_name: row.try_get("warehouse_name")?,
            });
        }

        info!(products = stocks.len(), "stock snapshot read via SQL fallback");
        Ok(stocks)
    }
}
