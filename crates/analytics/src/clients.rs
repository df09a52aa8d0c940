//! Typed clients for the sales and inventory services.
//!
//! Upstream JSON is decoded into DTOs here, at the boundary, so the
//! business logic downstream only sees statically typed values. Both
//! clients tolerate the two shapes the services answer with: a bare JSON
//! array or a `{ results: [...], count: n }` page.

use crate::error::Result;
use chrono::NaiveDate;
use restock_core::{ServiceClient, UpstreamError, UpstreamErrorKind};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

pub const SALES_SERVICE: &str = "sales";
pub const INVENTORY_SERVICE: &str = "inventory";

/// Completed-order page size for the daily computation.
pub const DAILY_ORDER_PAGE: usize = 500;
/// Completed-order page size for the windowed demand computation.
pub const DEMAND_ORDER_PAGE: usize = 800;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDto {
    pub id: i64,
    /// ISO date or datetime string; only the date part is used.
    #[serde(default)]
    pub order_date: String,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default, alias = "details_read")]
    pub details: Vec<OrderItemDto>,
}

impl OrderDto {
    pub fn order_day(&self) -> Option<NaiveDate> {
        self.order_date.get(..10)?.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemDto {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductDto {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    /// Current stock on hand.
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default, alias = "warehouse")]
    pub warehouse_id: Option<i64>,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRowDto {
    #[serde(default, alias = "product")]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub warehouse_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseDto {
    pub id: i64,
    pub name: String,
}

/// Normalize a bare-array or paged response into a row list.
fn decode_rows<T: DeserializeOwned>(
    service: &str,
    value: serde_json::Value,
) -> Result<Vec<T>> {
    let rows = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(ref map) => match map.get("results") {
            Some(results) => results.clone(),
            None => {
                return Err(UpstreamError::new(
                    service,
                    UpstreamErrorKind::Decode,
                    "response is neither an array nor a results page",
                )
                .into())
            }
        },
        _ => {
            return Err(UpstreamError::new(
                service,
                UpstreamErrorKind::Decode,
                "unexpected response shape",
            )
            .into())
        }
    };

    let decoded = serde_json::from_value(rows)
        .map_err(|e| UpstreamError::new(service, UpstreamErrorKind::Decode, e.to_string()))?;
    Ok(decoded)
}

/// Sales service client.
#[derive(Clone)]
pub struct SalesApi {
    client: Arc<ServiceClient>,
}

impl SalesApi {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// Completed orders inside `[from, to]`, ordered by order date.
    pub async fn completed_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        limit: usize,
    ) -> Result<Vec<OrderDto>> {
        let query = [
            ("status".to_string(), "COMPLETED".to_string()),
            ("date_from".to_string(), from.to_string()),
            ("date_to".to_string(), to.to_string()),
            ("limit".to_string(), limit.to_string()),
            ("ordering".to_string(), "order_date".to_string()),
        ];
        let value = self
            .client
            .get(SALES_SERVICE, "/api/sales/orders/", Some(&query))
            .await?;
        decode_rows(SALES_SERVICE, value)
    }
}

/// Inventory service client.
#[derive(Clone)]
pub struct InventoryApi {
    client: Arc<ServiceClient>,
}

impl InventoryApi {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// All products with current stock levels.
    pub async fn products(&self) -> Result<Vec<ProductDto>> {
        let value = self
            .client
            .get(INVENTORY_SERVICE, "/api/products/", None)
            .await?;
        decode_rows(INVENTORY_SERVICE, value)
    }

    pub async fn product(&self, product_id: i64) -> Result<ProductDto> {
        let value = self
            .client
            .get(
                INVENTORY_SERVICE,
                &format!("/api/products/{product_id}/"),
                None,
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| {
                UpstreamError::new(INVENTORY_SERVICE, UpstreamErrorKind::Decode, e.to_string())
                    .into()
            })
    }

    pub async fn products_in_category(&self, category_id: i64) -> Result<Vec<ProductDto>> {
        let query = [("category_id".to_string(), category_id.to_string())];
        let value = self
            .client
            .get(INVENTORY_SERVICE, "/api/products/", Some(&query))
            .await?;
        decode_rows(INVENTORY_SERVICE, value)
    }

    /// Raw per-warehouse inventory rows, optionally filtered by warehouse.
    pub async fn inventory_rows(&self, warehouse_id: Option<i64>) -> Result<Vec<InventoryRowDto>> {
        let query: Vec<(String, String)> = warehouse_id
            .map(|id| vec![("warehouse_id".to_string(), id.to_string())])
            .unwrap_or_default();
        let query = if query.is_empty() {
            None
        } else {
            Some(query.as_slice())
        };
        let value = self
            .client
            .get(INVENTORY_SERVICE, "/api/inventory/", query)
            .await?;
        decode_rows(INVENTORY_SERVICE, value)
    }

    /// Aggregate stock per product across matching inventory rows.
    pub async fn stock_map(
        &self,
        warehouse_id: Option<i64>,
    ) -> Result<std::collections::HashMap<i64, i64>> {
        let rows = self.inventory_rows(warehouse_id).await?;
        let mut map = std::collections::HashMap::new();
        for row in rows {
            if let Some(product_id) = row.product_id {
                *map.entry(product_id).or_insert(0) += row.quantity;
            }
        }
        Ok(map)
    }

    pub async fn warehouse(&self, warehouse_id: i64) -> Result<WarehouseDto> {
        let value = self
            .client
            .get(
                INVENTORY_SERVICE,
                &format!("/api/warehouses/{warehouse_id}/"),
                None,
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| {
                UpstreamError::new(INVENTORY_SERVICE, UpstreamErrorKind::Decode, e.to_string())
                    .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rows_accepts_bare_arrays_and_pages() {
        let bare = serde_json::json!([{"id": 1, "name": "Oil filter"}]);
        let products: Vec<ProductDto> = decode_rows("inventory", bare).unwrap();
        assert_eq!(products.len(), 1);

        let paged = serde_json::json!({"results": [{"id": 2, "name": "Brake pad"}], "count": 1});
        let products: Vec<ProductDto> = decode_rows("inventory", paged).unwrap();
        assert_eq!(products[0].id, 2);

        let bogus = serde_json::json!("nope");
        assert!(decode_rows::<ProductDto>("inventory", bogus).is_err());
    }

    #[test]
    fn order_day_parses_date_and_datetime() {
        let order = OrderDto {
            id: 1,
            order_date: "2025-03-10T12:00:00Z".into(),
            total: Decimal::from(100),
            customer_id: None,
            details: vec![],
        };
        assert_eq!(
            order.order_day(),
            Some(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
        );

        let bad = OrderDto {
            order_date: "".into(),
            ..order
        };
        assert_eq!(bad.order_day(), None);
    }

    #[test]
    fn inventory_rows_tolerate_alternate_product_key() {
        let value = serde_json::json!([
            {"product": 7, "quantity": 4},
            {"product_id": 8, "quantity": 2, "warehouse_id": 1}
        ]);
        let rows: Vec<InventoryRowDto> = decode_rows("inventory", value).unwrap();
        assert_eq!(rows[0].product_id, Some(7));
        assert_eq!(rows[1].warehouse_id, Some(1));
    }
}
