//! Forecasting: series preparation, the seasonal model, the cached
//! engine and the batch variants.

pub mod batch;
pub mod engine;
pub mod model;
pub mod series;

pub use batch::{BatchForecaster, GroupForecast, ProductForecastEntry};
pub use engine::{AccuracyMetrics, ForecastEngine, ForecastFrame, ForecastScope};
pub use model::{
    ForecastPoint, ModelComponents, ModelError, ModelTrainer, SeasonalModel, SeasonalModelConfig,
    SeasonalTrainer,
};
pub use series::{PreparedSeries, SeriesPoint, TimeSeries};

/// Version tag carried in cached model envelopes; bump on any change to
/// the serialized model layout.
pub const MODEL_VERSION: &str = "1";

/// Model tag reported on frames produced by the seasonal model.
pub const MODEL_TAG_SEASONAL: &str = "seasonal";
/// Model tag reported on frames produced by the moving-average fallback.
pub const MODEL_TAG_MOVING_AVERAGE: &str = "moving_average";
