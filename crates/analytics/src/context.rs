//! Application context: one explicitly constructed object graph built at
//! startup and injected everywhere. Every seam (repository, cache
//! backend, event stream, clock, trainer) is a trait object so tests can
//! swap implementations.

use crate::aggregator::{MetricsCalculator, SqlFallback};
use crate::clients::{InventoryApi, SalesApi, INVENTORY_SERVICE, SALES_SERVICE};
use crate::events::{EventConsumer, RedisEventStream};
use crate::forecast::{BatchForecaster, ForecastEngine, SeasonalTrainer};
use crate::repository::{AnalyticsRepository, PostgresAnalyticsRepository};
use crate::restock::RestockAnalyzer;
use restock_core::{
    Clock, Config, DatabasePool, DistributedCache, PostgresTaskRunStore, RedisCacheBackend,
    ServiceClient, SystemClock, TaskRunStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AppContext {
    pub config: Config,
    pub db: DatabasePool,
    pub cache: Arc<DistributedCache>,
    pub client: Arc<ServiceClient>,
    pub clock: Arc<dyn Clock>,
    pub repo: Arc<dyn AnalyticsRepository>,
    pub task_store: Arc<dyn TaskRunStore>,
    pub consumer: Arc<EventConsumer>,
    pub calculator: Arc<MetricsCalculator>,
    pub engine: Arc<ForecastEngine>,
    pub batch: Arc<BatchForecaster>,
    pub analyzer: Arc<RestockAnalyzer>,
}

impl AppContext {
    /// Connect the backing stores and assemble the engine graph.
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        let db = DatabasePool::new(&config.database).await?;

        let redis_client = redis::Client::open(config.redis.url.as_str())?;
        let redis = redis::aio::ConnectionManager::new(redis_client).await?;
        info!("redis connection established");

        let cache = Arc::new(DistributedCache::new(
            config.analytics.cache_prefix.clone(),
            Arc::new(RedisCacheBackend::new(redis.clone())),
        ));

        let mut bases = HashMap::new();
        bases.insert(SALES_SERVICE.to_string(), config.services.sales_url.clone());
        bases.insert(
            INVENTORY_SERVICE.to_string(),
            config.services.inventory_url.clone(),
        );
        for (name, url) in &config.services.probe_targets {
            bases.entry(name.clone()).or_insert_with(|| url.clone());
        }
        let client = Arc::new(
            ServiceClient::new(
                bases,
                Duration::from_secs(config.services.request_timeout_seconds),
            )
            .with_probe_timeout(Duration::from_secs(
                config.analytics.health_probe_timeout_seconds,
            )),
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let repo: Arc<dyn AnalyticsRepository> =
            Arc::new(PostgresAnalyticsRepository::new(db.get().clone()));
        let task_store: Arc<dyn TaskRunStore> =
            Arc::new(PostgresTaskRunStore::new(db.get().clone()));

        let sales = SalesApi::new(Arc::clone(&client));
        let inventory = InventoryApi::new(Arc::clone(&client));

        let consumer = Arc::new(EventConsumer::new(
            "analytics",
            Arc::new(RedisEventStream::new(redis)),
            Arc::clone(&repo),
            Arc::clone(&clock),
            config.analytics.consumer_batch_size,
        ));

        let calculator = Arc::new(MetricsCalculator::new(
            sales,
            inventory.clone(),
            Arc::clone(&repo),
            Some(SqlFallback::new(db.get().clone())),
            Arc::clone(&clock),
            config.analytics.clone(),
        ));

        let trainer = Arc::new(SeasonalTrainer);
        let engine = Arc::new(ForecastEngine::new(
            Arc::clone(&repo),
            Arc::clone(&cache),
            Arc::clone(&clock),
            config.analytics.clone(),
            trainer.clone(),
        ));

        let batch = Arc::new(BatchForecaster::new(
            Arc::clone(&engine),
            Arc::clone(&repo),
            inventory.clone(),
            trainer,
        ));

        let analyzer = Arc::new(RestockAnalyzer::new(
            Arc::clone(&engine),
            Arc::clone(&repo),
            inventory,
            Arc::clone(&clock),
            config.analytics.clone(),
        ));

        info!("application context initialized");
        Ok(Self {
            config,
            db,
            cache,
            client,
            clock,
            repo,
            task_store,
            consumer,
            calculator,
            engine,
            batch,
            analyzer,
        })
    }

    pub fn inventory_api(&self) -> InventoryApi {
        InventoryApi::new(Arc::clone(&self.client))
    }
}
