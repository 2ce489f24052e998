pub mod audit;
pub mod config;
pub mod error;
pub mod features;
pub mod invoker;
pub mod metrics;
pub mod model;
pub mod routes;
pub mod store;

pub use config::ServerConfig;
pub use error::{AppError, InferenceError, ModelError, StorageError, ValidationError};
pub use model::{load_model, LoadedModel, ModelSource, Regressor};
pub use routes::{router, AppState, METRICS_ENDPOINT, PREDICT_ENDPOINT};
pub use store::Store;
