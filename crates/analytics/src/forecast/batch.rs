//! Batch forecast variants: top-N products, category aggregates and
//! warehouse aggregates.

use super::engine::{ForecastEngine, ForecastScope};
use super::model::{ForecastPoint, ModelTrainer, SeasonalModelConfig};
use super::series::{SeriesPoint, TimeSeries};
use super::MODEL_TAG_SEASONAL;
use crate::clients::InventoryApi;
use crate::error::{AnalyticsError, Result};
use crate::repository::AnalyticsRepository;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Per-product entry of a top-N batch. A failed product is reported in
/// place instead of aborting the batch.
#[derive(Debug, Clone, Serialize)]
pub struct ProductForecastEntry {
    pub product_id: i64,
    pub product_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub periods: usize,
    pub forecast: Vec<ForecastPoint>,
}

/// Aggregate forecast for a category or warehouse.
#[derive(Debug, Clone, Serialize)]
pub struct GroupForecast {
    pub id: i64,
    pub name: String,
    pub products_count: usize,
    pub periods: usize,
    pub model_tag: String,
    pub forecast: Vec<ForecastPoint>,
}

pub struct BatchForecaster {
    engine: Arc<ForecastEngine>,
    repo: Arc<dyn AnalyticsRepository>,
    inventory: InventoryApi,
    trainer: Arc<dyn ModelTrainer>,
}

impl BatchForecaster {
    pub fn new(
        engine: Arc<ForecastEngine>,
        repo: Arc<dyn AnalyticsRepository>,
        inventory: InventoryApi,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Self {
        Self {
            engine,
            repo,
            inventory,
            trainer,
        }
    }

    /// Forecast the N products with the highest recent revenue. Runs
    /// sequentially per product to keep the training CPU budget bounded.
    pub async fn forecast_top_products(
        &self,
        top_n: usize,
        periods: usize,
    ) -> Result<Vec<ProductForecastEntry>> {
        let top = self.repo.top_revenue_products(top_n as i64).await?;
        let mut entries = Vec::with_capacity(top.len());

        for product in top {
            let scope = ForecastScope::Product(product.product_id);
            let result = self.engine.forecast(scope, periods, true).await;
            entries.push(entry_from(&product.product_name, product.product_id, periods, result));
        }

        info!(products = entries.len(), "top-product forecasts generated");
        Ok(entries)
    }

    /// Variant with a caller-supplied worker count for deployments that
    /// can spare the forecasting CPU budget. Entry order still follows
    /// revenue rank.
    pub async fn forecast_top_products_with_workers(
        &self,
        top_n: usize,
        periods: usize,
        workers: usize,
    ) -> Result<Vec<ProductForecastEntry>> {
        let top = self.repo.top_revenue_products(top_n as i64).await?;
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut joins = JoinSet::new();

        for (rank, product) in top.into_iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let result = engine
                    .forecast(ForecastScope::Product(product.product_id), periods, true)
                    .await;
                (rank, product, result)
            });
        }

        let mut ranked = Vec::new();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((rank, product, result)) => ranked.push((
                    rank,
                    entry_from(&product.product_name, product.product_id, periods, result),
                )),
                Err(e) => warn!(error = %e, "top-product forecast task panicked"),
            }
        }
        ranked.sort_by_key(|(rank, _)| *rank);

        let entries: Vec<ProductForecastEntry> =
            ranked.into_iter().map(|(_, entry)| entry).collect();
        info!(products = entries.len(), workers, "top-product forecasts generated");
        Ok(entries)
    }

    /// Aggregate forecast across every product in a category.
    pub async fn forecast_category(&self, category_id: i64, periods: usize) -> Result<GroupForecast> {
        let products = self.inventory.products_in_category(category_id).await?;
        if products.is_empty() {
            return Err(AnalyticsError::NoData(format!(
                "no products found in category {category_id}"
            )));
        }

        let product_ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let forecast = self.forecast_group(&product_ids, periods).await?;

        Ok(GroupForecast {
            id: category_id,
            name: format!("Category {category_id}"),
            products_count: product_ids.len(),
            periods,
            model_tag: MODEL_TAG_SEASONAL.to_string(),
            forecast,
        })
    }

    /// Aggregate forecast across every product observed in a warehouse.
    pub async fn forecast_warehouse(
        &self,
        warehouse_id: i64,
        periods: usize,
    ) -> Result<GroupForecast> {
        let product_ids = self.repo.warehouse_products(warehouse_id).await?;
        if product_ids.is_empty() {
            return Err(AnalyticsError::NoData(format!(
                "no products found in warehouse {warehouse_id}"
            )));
        }

        // Name lookup is best-effort.
        let name = match self.inventory.warehouse(warehouse_id).await {
            Ok(warehouse) => warehouse.name,
            Err(e) => {
                warn!(warehouse_id, error = %e, "warehouse name lookup failed");
                format!("Warehouse {warehouse_id}")
            }
        };

        let forecast = self.forecast_group(&product_ids, periods).await?;
        Ok(GroupForecast {
            id: warehouse_id,
            name,
            products_count: product_ids.len(),
            periods,
            model_tag: MODEL_TAG_SEASONAL.to_string(),
            forecast,
        })
    }

    /// Sum each product's historical series by date and train a fresh
    /// model on the aggregate (group aggregates are not model-cached).
    async fn forecast_group(
        &self,
        product_ids: &[i64],
        periods: usize,
    ) -> Result<Vec<ForecastPoint>> {
        let mut daily_totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for product_id in product_ids {
            let prepared = self
                .engine
                .prepare(ForecastScope::Product(*product_id), 365)
                .await?;
            for point in prepared.series.points() {
                *daily_totals.entry(point.date).or_insert(0.0) += point.value;
            }
        }

        if daily_totals.len() < 7 {
            return Err(AnalyticsError::NoData(
                "insufficient aggregated data".to_string(),
            ));
        }

        let series = TimeSeries::from_points(
            daily_totals
                .into_iter()
                .map(|(date, value)| SeriesPoint { date, value })
                .collect(),
        );

        let config = SeasonalModelConfig::for_series_len(series.len());
        let trainer = Arc::clone(&self.trainer);
        let training_series = series.clone();
        let model = tokio::task::spawn_blocking(move || trainer.train(&training_series, config))
            .await
            .map_err(|e| AnalyticsError::Forecast(format!("training task panicked: {e}")))?
            .map_err(|e| AnalyticsError::Forecast(e.to_string()))?;

        Ok(model.predict(&model.future_dates(periods)))
    }
}

fn entry_from(
    product_name: &str,
    product_id: i64,
    periods: usize,
    result: Result<Option<super::engine::ForecastFrame>>,
) -> ProductForecastEntry {
    match result {
        Ok(Some(frame)) => ProductForecastEntry {
            product_id,
            product_name: product_name.to_string(),
            status: "success",
            message: None,
            periods,
            forecast: frame.points,
        },
        Ok(None) => ProductForecastEntry {
            product_id,
            product_name: product_name.to_string(),
            status: "error",
            message: Some("insufficient data for forecasting".to_string()),
            periods,
            forecast: Vec::new(),
        },
        Err(e) => {
            warn!(product_id, error = %e, "product forecast failed");
            ProductForecastEntry {
                product_id,
                product_name: product_name.to_string(),
                status: "error",
                message: Some(e.to_string()),
                periods,
                forecast: Vec::new(),
            }
        }
    }
}
