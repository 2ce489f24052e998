//! Pre-trained regression models exported as JSON artifacts.
//!
//! Training happens elsewhere; this module only evaluates what was exported.

use crate::error::ModelError;
use common::{FeatureVector, ModelsConfig};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::info;

/// A fitted regressor over rows of `n_features()` columns.
pub trait Regressor: Send + Sync {
    fn kind(&self) -> &'static str;

    fn n_features(&self) -> usize;

    /// One prediction per row of `features`.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LinearRegression {
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    DecisionTree {
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        n_features: usize,
        children_left: Vec<i64>,
        children_right: Vec<i64>,
        feature: Vec<i64>,
        threshold: Vec<f64>,
        value: Vec<f64>,
    },
}

impl ModelArtifact {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Validates the artifact and builds the regressor it describes.
    pub fn build(self) -> Result<Arc<dyn Regressor>, ModelError> {
        match self {
            ModelArtifact::LinearRegression {
                feature_names,
                coefficients,
                intercept,
            } => {
                check_feature_names(feature_names.as_deref(), coefficients.len())?;
                Ok(Arc::new(LinearModel::new(coefficients, intercept)?))
            }
            ModelArtifact::DecisionTree {
                feature_names,
                n_features,
                children_left,
                children_right,
                feature,
                threshold,
                value,
            } => {
                check_feature_names(feature_names.as_deref(), n_features)?;
                Ok(Arc::new(DecisionTree::new(
                    n_features,
                    children_left,
                    children_right,
                    feature,
                    threshold,
                    value,
                )?))
            }
        }
    }
}

fn check_feature_names(names: Option<&[String]>, n_features: usize) -> Result<(), ModelError> {
    if n_features != FeatureVector::LEN {
        return Err(ModelError::FeatureMismatch {
            expected: FeatureVector::LEN,
            actual: n_features,
        });
    }
    if let Some(names) = names {
        if !names.iter().map(String::as_str).eq(FeatureVector::FIELD_NAMES) {
            return Err(ModelError::Invalid(format!(
                "feature_names {:?} do not match {:?}",
                names,
                FeatureVector::FIELD_NAMES
            )));
        }
    }
    Ok(())
}

fn check_columns(expected: usize, features: &ArrayView2<'_, f64>) -> Result<(), ModelError> {
    if features.ncols() != expected {
        return Err(ModelError::FeatureMismatch {
            expected,
            actual: features.ncols(),
        });
    }
    Ok(())
}

/// Ordinary least squares: `y = X · w + b`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelError> {
        if coefficients.is_empty() {
            return Err(ModelError::Invalid("no coefficients".into()));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Invalid("non-finite parameter".into()));
        }
        Ok(Self {
            coefficients: Array1::from(coefficients),
            intercept,
        })
    }
}

impl Regressor for LinearModel {
    fn kind(&self) -> &'static str {
        "linear_regression"
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        check_columns(self.n_features(), &features)?;
        Ok(features.dot(&self.coefficients) + self.intercept)
    }
}

/// Binary regression tree stored as parallel node arrays.
///
/// Node 0 is the root; `-1` in `children_left` marks a leaf. A sample goes
/// left when `x[feature] <= threshold`.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    n_features: usize,
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<f64>,
}

const LEAF: i64 = -1;

impl DecisionTree {
    pub fn new(
        n_features: usize,
        children_left: Vec<i64>,
        children_right: Vec<i64>,
        feature: Vec<i64>,
        threshold: Vec<f64>,
        value: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let nodes = value.len();
        if nodes == 0 {
            return Err(ModelError::Invalid("tree has no nodes".into()));
        }
        for (name, len) in [
            ("children_left", children_left.len()),
            ("children_right", children_right.len()),
            ("feature", feature.len()),
            ("threshold", threshold.len()),
        ] {
            if len != nodes {
                return Err(ModelError::Invalid(format!(
                    "{} has {} entries, expected {}",
                    name, len, nodes
                )));
            }
        }

        for node in 0..nodes {
            if !value[node].is_finite() {
                return Err(ModelError::Invalid(format!("node {}: non-finite value", node)));
            }
            let (left, right) = (children_left[node], children_right[node]);
            if left == LEAF && right == LEAF {
                continue;
            }
            // children always follow their parent, so traversal terminates
            for child in [left, right] {
                if child <= node as i64 || child >= nodes as i64 {
                    return Err(ModelError::Invalid(format!(
                        "node {}: child index {} out of range",
                        node, child
                    )));
                }
            }
            if feature[node] < 0 || feature[node] >= n_features as i64 {
                return Err(ModelError::Invalid(format!(
                    "node {}: feature index {} out of range",
                    node, feature[node]
                )));
            }
            if threshold[node].is_nan() {
                return Err(ModelError::Invalid(format!("node {}: NaN threshold", node)));
            }
        }

        Ok(Self {
            n_features,
            children_left,
            children_right,
            feature,
            threshold,
            value,
        })
    }

    pub fn node_count(&self) -> usize {
        self.value.len()
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = 0;
        while self.children_left[node] != LEAF {
            node = if row[self.feature[node] as usize] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        self.value[node]
    }
}

impl Regressor for DecisionTree {
    fn kind(&self) -> &'static str {
        "decision_tree"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        check_columns(self.n_features, &features)?;
        Ok(features.outer_iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Where the artifact comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    File(PathBuf),
    Registry {
        registry: PathBuf,
        name: String,
        /// `None` selects the highest registered version.
        version: Option<u32>,
    },
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::File(path) => write!(f, "file:{}", path.display()),
            ModelSource::Registry { name, version, .. } => match version {
                Some(v) => write!(f, "registry:{}/{}", name, v),
                None => write!(f, "registry:{}/latest", name),
            },
        }
    }
}

impl ModelSource {
    /// Resolves the artifact path, consulting the registry file if needed.
    pub fn resolve(&self) -> Result<PathBuf, ModelError> {
        match self {
            ModelSource::File(path) => Ok(path.clone()),
            ModelSource::Registry {
                registry,
                name,
                version,
            } => {
                let config = ModelsConfig::load(registry)
                    .map_err(|e| ModelError::Registry(format!("{:#}", e)))?;
                let (number, path) = config.resolve(name, *version).ok_or_else(|| {
                    ModelError::Registry(format!(
                        "{} has no version {}",
                        name,
                        version.map_or("registered".to_string(), |v| v.to_string())
                    ))
                })?;
                info!("Resolved {} to version {} at {}", name, number, path.display());
                Ok(path)
            }
        }
    }
}

/// The process-wide model, shared read-only by every request.
#[derive(Clone)]
pub struct LoadedModel {
    regressor: Arc<dyn Regressor>,
    source: String,
    load_time_ms: f64,
}

impl LoadedModel {
    pub fn new(regressor: Arc<dyn Regressor>, source: impl Into<String>) -> Self {
        Self {
            regressor,
            source: source.into(),
            load_time_ms: 0.0,
        }
    }

    pub fn regressor(&self) -> &dyn Regressor {
        self.regressor.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn load_time_ms(&self) -> f64 {
        self.load_time_ms
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("kind", &self.regressor.kind())
            .field("source", &self.source)
            .finish()
    }
}

pub fn load_model(source: &ModelSource) -> Result<LoadedModel, ModelError> {
    let start_time = Instant::now();
    let path = source.resolve()?;
    let regressor = load_artifact(&path)?;
    let load_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    info!(
        source = %source,
        path = %path.display(),
        kind = regressor.kind(),
        "✓ Model loaded in {:.2}ms",
        load_time_ms
    );

    Ok(LoadedModel {
        regressor,
        source: source.to_string(),
        load_time_ms,
    })
}

pub fn load_artifact(path: &Path) -> Result<Arc<dyn Regressor>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    ModelArtifact::from_json(&bytes)?.build()
}
