use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Model registry file: every registered model with its numbered versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub models: HashMap<String, RegisteredModel>,
    /// Directory relative artifact paths are resolved against. Set by `load`.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredModel {
    #[serde(default)]
    pub description: Option<String>,
    pub versions: BTreeMap<u32, ModelVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub dataset: DatasetConfig,
    pub warmup: WarmupConfig,
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// CSV file with one column per feature wire name.
    pub path: String,
    pub num_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub num_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub concurrency: usize,
    pub num_requests: usize,
    pub batch_size: usize,
    #[serde(default)]
    pub description: String,
}

impl ModelsConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model registry {}", path.display()))?;
        let mut config: ModelsConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid model registry {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn get_model(&self, name: &str) -> Option<&RegisteredModel> {
        self.models.get(name)
    }

    /// Artifact path for `name` at `version`, or at the highest version when `None`.
    pub fn resolve(&self, name: &str, version: Option<u32>) -> Option<(u32, PathBuf)> {
        let model = self.get_model(name)?;
        let (number, entry) = match version {
            Some(v) => (v, model.versions.get(&v)?),
            None => model.versions.iter().next_back().map(|(v, e)| (*v, e))?,
        };
        Some((number, self.base_dir.join(&entry.path)))
    }
}

impl BenchmarkConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BenchmarkConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
models:
  best_housing_model:
    description: California housing regressors
    versions:
      1:
        path: ../models/LinearRegression.json
      2:
        path: ../models/DecisionTree.json
        description: depth-limited tree
"#;

    #[test]
    fn test_resolve_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(&path, REGISTRY).unwrap();

        let config = ModelsConfig::load(&path).unwrap();

        let (version, latest) = config.resolve("best_housing_model", None).unwrap();
        assert_eq!(version, 2);
        assert_eq!(latest, dir.path().join("../models/DecisionTree.json"));

        let (version, first) = config.resolve("best_housing_model", Some(1)).unwrap();
        assert_eq!(version, 1);
        assert!(first.ends_with("LinearRegression.json"));

        assert!(config.resolve("best_housing_model", Some(7)).is_none());
        assert!(config.resolve("unknown", None).is_none());
    }

    #[test]
    fn test_invalid_registry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(&path, "models: [1, 2]").unwrap();

        assert!(ModelsConfig::load(&path).is_err());
        assert!(ModelsConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}
