//! Environment snapshot for troubleshooting a deployment.

use crate::config::AppConfig;
use crate::registry::{ModelRegistry, RegistrySource};
use crate::types::ModelFamily;
use serde::Serialize;
use std::env;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub checkpoint: u32,
    pub family: ModelFamily,
    pub features: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub package: &'static str,
    pub version: &'static str,
    pub cwd: Option<String>,
    pub config_path: Option<String>,
    pub config_exists: Option<bool>,
    pub registry_source: Option<RegistrySource>,
    /// Set instead of `models` when the registry could not be loaded.
    pub registry_error: Option<String>,
    pub models: Vec<ModelSummary>,
}

fn summarize(registry: &ModelRegistry) -> Vec<ModelSummary> {
    registry
        .entries()
        .map(|spec| ModelSummary {
            checkpoint: spec.checkpoint().session(),
            family: spec.family(),
            features: spec.feature_order().to_vec(),
        })
        .collect()
}

/// Collects the snapshot. Failures are recorded in the snapshot rather than
/// returned, so a broken deployment can still be described.
pub fn snapshot(config: &AppConfig, config_path: Option<&Path>) -> Snapshot {
    let (registry_source, registry_error, models) = match config.registry() {
        Ok(registry) => (Some(registry.source().clone()), None, summarize(&registry)),
        Err(err) => (None, Some(err.to_string()), Vec::new()),
    };

    Snapshot {
        package: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        cwd: env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string()),
        config_path: config_path.map(|p| p.display().to_string()),
        config_exists: config_path.map(Path::exists),
        registry_source,
        registry_error,
        models,
    }
}

pub fn to_json(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}
