pub mod http;
pub mod config;
pub mod stats;

pub use http::{ErrorResponse, FeatureVector, PredictResponse};
pub use config::{BenchmarkConfig, ModelsConfig, ScenarioConfig};
pub use stats::Statistics;
