use crate::model::ModelSource;
use anyhow::{Context, Result};
use std::{net::SocketAddr, path::PathBuf};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MODEL_PATH: &str = "models/DecisionTree.json";
pub const DEFAULT_REGISTRY_CONFIG: &str = "config/models.yaml";
pub const DEFAULT_DB_PATH: &str = "predictions.db";
pub const DEFAULT_LOG_FILTER: &str = "housing_server=info,tower_http=info";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub model: ModelSource,
    pub db_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("HOUSING_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("Invalid HOUSING_BIND_ADDR")?;

        let model = match var("HOUSING_MODEL_NAME") {
            Some(name) => ModelSource::Registry {
                registry: PathBuf::from(
                    var("HOUSING_REGISTRY_CONFIG")
                        .unwrap_or_else(|| DEFAULT_REGISTRY_CONFIG.to_string()),
                ),
                name,
                version: parse_version(var("HOUSING_MODEL_VERSION").as_deref())?,
            },
            None => ModelSource::File(PathBuf::from(
                var("HOUSING_MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            )),
        };

        let db_path = PathBuf::from(var("HOUSING_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()));

        Ok(Self {
            bind_addr,
            model,
            db_path,
        })
    }
}

/// `latest` (or unset) selects the highest registered version.
fn parse_version(raw: Option<&str>) -> Result<Option<u32>> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("latest") => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .with_context(|| format!("Invalid HOUSING_MODEL_VERSION {:?}", v)),
    }
}
