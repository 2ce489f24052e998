use crate::{error::InferenceError, model::Regressor};
use common::FeatureVector;
use ndarray::Array2;

/// Runs the model once over the whole batch, returning one prediction per record in order.
pub fn predict(model: &dyn Regressor, records: &[FeatureVector]) -> Result<Vec<f64>, InferenceError> {
    let batch_size = records.len();
    let flat: Vec<f64> = records.iter().flat_map(|r| r.to_array()).collect();
    let features = Array2::from_shape_vec((batch_size, FeatureVector::LEN), flat)?;

    let predictions = model.predict(features.view())?;

    if predictions.len() != batch_size {
        return Err(InferenceError::CountMismatch {
            expected: batch_size,
            actual: predictions.len(),
        });
    }
    if let Some(record) = predictions.iter().position(|p| !p.is_finite()) {
        return Err(InferenceError::NonFinite(record));
    }

    Ok(predictions.to_vec())
}
