use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use common::ErrorResponse;
use thiserror::Error;

/// Client-side faults found while decoding a prediction request.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("No input data provided")]
    MissingInput,

    #[error(
        "Unsupported media type '{}': expected application/json",
        .0.as_deref().unwrap_or("none")
    )]
    UnsupportedMediaType(Option<String>),

    #[error("Malformed JSON body: {0}")]
    MalformedJson(String),

    #[error("Expected a JSON object or an array of objects, got {0}")]
    NotARecord(&'static str),

    #[error("Record {record}: missing field '{field}'")]
    MissingField { record: usize, field: &'static str },

    #[error("Record {record}: field '{field}' {reason}")]
    InvalidField {
        record: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid query string: {0}")]
    InvalidQuery(String),
}

/// Failures loading or evaluating a model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model artifact not found: {0}")]
    NotFound(String),

    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model artifact: {0}")]
    Invalid(String),

    #[error("Model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Model registry error: {0}")]
    Registry(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference failed: {0}")]
    Model(#[from] ModelError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Model returned {actual} predictions for {expected} records")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Model returned a non-finite prediction for record {0}")]
    NonFinite(usize),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to serialize audit payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

// Error handling
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Inference(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let validation = AppError::from(ValidationError::MissingInput);
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let inference = AppError::from(InferenceError::NonFinite(0));
        assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let storage = AppError::from(StorageError::from(sqlx::Error::PoolClosed));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_inference_error_keeps_model_message() {
        let err = AppError::from(InferenceError::from(ModelError::FeatureMismatch {
            expected: 8,
            actual: 3,
        }));

        assert_eq!(
            err.to_string(),
            "Inference failed: Model expects 8 features, got 3"
        );
    }

    #[test]
    fn test_validation_messages_name_the_field() {
        let err = ValidationError::InvalidField {
            record: 2,
            field: "AveRooms",
            reason: "is not a number: \"abc\"".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Record 2: field 'AveRooms' is not a number: \"abc\""
        );
    }
}
