//! Decoding of `POST /predict` bodies into [`FeatureVector`]s.
//!
//! A body is either one JSON object or a non-empty array of objects. Each
//! object must carry the eight feature fields; values may be JSON numbers or
//! numeric strings. Any other keys are ignored.

use crate::error::ValidationError;
use common::FeatureVector;
use serde_json::{Map, Value};

/// A validated request, remembering whether the caller sent one record or many.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionInput {
    Single(FeatureVector),
    Batch(Vec<FeatureVector>),
}

impl PredictionInput {
    pub fn records(&self) -> &[FeatureVector] {
        match self {
            PredictionInput::Single(record) => std::slice::from_ref(record),
            PredictionInput::Batch(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn into_batch(self) -> Vec<FeatureVector> {
        match self {
            PredictionInput::Single(record) => vec![record],
            PredictionInput::Batch(records) => records,
        }
    }

    /// JSON form of the validated input, shaped like the request.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            PredictionInput::Single(record) => serde_json::to_value(record),
            PredictionInput::Batch(records) => serde_json::to_value(records),
        }
    }
}

/// True for `application/json` and `application/*+json`, ignoring parameters.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

pub fn validate(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<PredictionInput, ValidationError> {
    match content_type {
        Some(ct) if is_json_content_type(ct) => {}
        other => {
            return Err(ValidationError::UnsupportedMediaType(
                other.map(str::to_string),
            ))
        }
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingInput);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

    decode(&value)
}

/// Decodes an already-parsed JSON document.
pub fn decode(value: &Value) -> Result<PredictionInput, ValidationError> {
    match value {
        Value::Null => Err(ValidationError::MissingInput),
        Value::Object(fields) => Ok(PredictionInput::Single(decode_record(0, fields)?)),
        Value::Array(items) if items.is_empty() => Err(ValidationError::MissingInput),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(record, item)| match item {
                Value::Object(fields) => decode_record(record, fields),
                other => Err(ValidationError::NotARecord(type_name(other))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PredictionInput::Batch),
        other => Err(ValidationError::NotARecord(type_name(other))),
    }
}

fn decode_record(record: usize, fields: &Map<String, Value>) -> Result<FeatureVector, ValidationError> {
    let mut values = [0.0; FeatureVector::LEN];

    for (slot, field) in values.iter_mut().zip(FeatureVector::FIELD_NAMES) {
        let raw = fields
            .get(field)
            .ok_or(ValidationError::MissingField { record, field })?;
        *slot = coerce(raw).map_err(|reason| ValidationError::InvalidField {
            record,
            field,
            reason,
        })?;
    }

    Ok(FeatureVector::from_array(values))
}

fn coerce(value: &Value) -> Result<f64, String> {
    let number = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("is not representable as a float: {}", n))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("is not a number: {:?}", s))?,
        other => return Err(format!("must be a number, got {}", type_name(other))),
    };

    if !number.is_finite() {
        return Err(format!("must be finite, got {}", number));
    }

    Ok(number)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
