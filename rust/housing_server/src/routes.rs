//! HTTP surface: `POST /predict` and `GET /metrics`.

use crate::{
    audit,
    error::{AppError, StorageError, ValidationError},
    features, invoker,
    metrics::{self, MetricsFormat, PROMETHEUS_CONTENT_TYPE},
    model::LoadedModel,
    store::Store,
};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use common::PredictResponse;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

pub const PREDICT_ENDPOINT: &str = "/predict";
pub const METRICS_ENDPOINT: &str = "/metrics";

/// Request bodies longer than this are cut when logged.
const LOGGED_BODY_LIMIT: usize = 256;

// Application state
pub struct AppState {
    pub model: LoadedModel,
    pub store: Store,
}

impl AppState {
    pub fn new(model: LoadedModel, store: Store) -> Self {
        Self { model, store }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(PREDICT_ENDPOINT, post(predict))
        .route(METRICS_ENDPOINT, get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PredictResponse>, AppError> {
    serve_prediction(&state, &headers, &body)
        .await
        .map(Json)
        .map_err(|err| {
            log_failure(PREDICT_ENDPOINT, &body, &err);
            err
        })
}

async fn serve_prediction(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<PredictResponse, AppError> {
    // released (and rolled back unless committed) on every return path
    let mut scope = state.store.begin().await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let input = features::validate(content_type, body)?;

    let predictions = invoker::predict(state.model.regressor(), input.records())?;
    let response = PredictResponse { predictions };

    let input_json = input.to_json().map_err(StorageError::from)?;
    let output_json = serde_json::to_value(&response).map_err(StorageError::from)?;

    let id = audit::record(scope.conn(), &input_json, &output_json).await?;
    metrics::increment(scope.conn(), PREDICT_ENDPOINT).await?;
    scope.commit().await?;

    debug!(audit_id = id, records = input.len(), "Prediction served");
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    #[serde(default)]
    format: MetricsFormat,
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
    uri: Uri,
) -> Result<Response, AppError> {
    let fail = |err: AppError| {
        log_failure(METRICS_ENDPOINT, uri.query().unwrap_or_default().as_bytes(), &err);
        err
    };

    let Query(query) = query.map_err(|rejection| {
        fail(ValidationError::InvalidQuery(rejection.body_text()).into())
    })?;
    let mut counts = metrics::snapshot(&state.store)
        .await
        .map_err(|err| fail(err.into()))?;
    counts.entry(PREDICT_ENDPOINT.to_string()).or_insert(0);

    let response = match query.format {
        MetricsFormat::Json => Json(counts).into_response(),
        MetricsFormat::Prometheus => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            metrics::to_prometheus(&counts),
        )
            .into_response(),
    };
    Ok(response)
}

fn log_failure(endpoint: &str, body: &[u8], err: &AppError) {
    let input = truncate_body(body);
    match err {
        AppError::Validation(_) => warn!(endpoint, input = %input, error = %err, "Rejected request"),
        _ => error!(endpoint, input = %input, error = %err, "Request failed"),
    }
}

fn truncate_body(body: &[u8]) -> String {
    let end = body.len().min(LOGGED_BODY_LIMIT);
    let mut text = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > end {
        text.push_str("...");
    }
    text
}
