// Analytics & Restock Orchestration Engine
//
// Event ingestion, metric aggregation, forecasting and restock
// recommendation for the retail platform backend.

pub mod aggregator;
pub mod clients;
pub mod context;
pub mod error;
pub mod events;
pub mod forecast;
pub mod model;
pub mod quality;
pub mod repository;
pub mod restock;
pub mod tasks;

pub use aggregator::{AggregationOutcome, MetricsCalculator, SqlFallback};
pub use clients::{InventoryApi, SalesApi};
pub use context::AppContext;
pub use error::{AnalyticsError, Result};
pub use events::{EventConsumer, EventStream, MemoryEventStream, RedisEventStream};
pub use forecast::{
    BatchForecaster, ForecastEngine, ForecastFrame, ForecastScope, SeasonalModel, SeasonalTrainer,
    TimeSeries,
};
pub use model::{
    DailySalesMetric, DemandTrend, ForecastAccuracyRecord, ForecastType, InventoryTurnoverMetric,
    ProductDemandMetric, RecommendationStatus, ReorderPriority, RiskLevel,
    StockReorderRecommendation, TurnoverClass,
};
pub use quality::{DataQualityValidator, QualityReport};
pub use repository::{AnalyticsRepository, MemoryAnalyticsRepository, PostgresAnalyticsRepository};
pub use restock::{BulkRequest, RestockAnalyzer};
