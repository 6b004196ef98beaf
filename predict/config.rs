//! Application settings.
//!
//! Everything a deployment may vary without touching the inference kernel:
//! which checkpoints are offered, whether intervals are displayed, how
//! percent-change input is interpreted, an optional input-domain guard, and
//! an optional external model registry. Every field has a default, so an
//! empty or partial TOML file is valid.

use crate::registry::{ModelRegistry, RegistryError};
use crate::types::{Checkpoint, PercentUnits};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("The config must offer at least one checkpoint.")]
    NoCheckpoints,
    #[error("Invalid domain bounds: {0}")]
    InvalidDomainBounds(String),
}

/// Input ranges the fitted models are considered valid for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DomainBounds {
    pub age_min: f64,
    pub age_max: f64,
    /// Upper bound of the symptom instrument, when known.
    pub baseline_max: Option<f64>,
}

impl Default for DomainBounds {
    fn default() -> Self {
        Self {
            age_min: 18.0,
            age_max: 100.0,
            baseline_max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Checkpoints a caller may evaluate.
    pub checkpoints: Vec<Checkpoint>,
    /// Whether interval columns are shown in the terminal table.
    pub show_intervals: bool,
    pub percent_units: PercentUnits,
    /// When set, inputs outside these bounds are rejected instead of evaluated.
    pub domain_guard: Option<DomainBounds>,
    /// Registry file replacing the built-in models.
    pub models: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            checkpoints: Checkpoint::ALL.to_vec(),
            show_intervals: true,
            percent_units: PercentUnits::Auto,
            domain_guard: None,
            models: None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoints.is_empty() {
            return Err(ConfigError::NoCheckpoints);
        }
        if let Some(bounds) = &self.domain_guard {
            if !(bounds.age_min <= bounds.age_max) {
                return Err(ConfigError::InvalidDomainBounds(format!(
                    "age_min {} exceeds age_max {}",
                    bounds.age_min, bounds.age_max
                )));
            }
            if let Some(max) = bounds.baseline_max {
                if !(max >= 0.0) {
                    return Err(ConfigError::InvalidDomainBounds(format!(
                        "baseline_max {max} must be non-negative"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The registry these settings select: the configured file, or the
    /// built-in models.
    pub fn registry(&self) -> Result<Cow<'static, ModelRegistry>, RegistryError> {
        match &self.models {
            Some(path) => ModelRegistry::load(path).map(Cow::Owned),
            None => ModelRegistry::builtin().map(Cow::Borrowed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.checkpoints, Checkpoint::ALL.to_vec());
        assert!(config.show_intervals);
        assert_eq!(config.percent_units, PercentUnits::Auto);
        assert!(config.domain_guard.is_none());
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config = AppConfig::from_toml_str(
            r#"
checkpoints = [19]
show_intervals = false
percent_units = "percent"

[domain_guard]
age_min = 12
baseline_max = 52
"#,
        )
        .unwrap();
        assert_eq!(config.checkpoints, vec![Checkpoint::Session19]);
        assert!(!config.show_intervals);
        assert_eq!(config.percent_units, PercentUnits::Percent);
        let bounds = config.domain_guard.unwrap();
        assert_eq!(bounds.age_min, 12.0);
        assert_eq!(bounds.age_max, 100.0);
        assert_eq!(bounds.baseline_max, Some(52.0));
    }

    #[test]
    fn invalid_documents_are_rejected() {
        assert!(matches!(
            AppConfig::from_toml_str("checkpoints = []"),
            Err(ConfigError::NoCheckpoints)
        ));
        assert!(matches!(
            AppConfig::from_toml_str("checkpoints = [10]"),
            Err(ConfigError::TomlParseError(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("colour = \"blue\""),
            Err(ConfigError::TomlParseError(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[domain_guard]\nage_min = 80\nage_max = 20\n"),
            Err(ConfigError::InvalidDomainBounds(_))
        ));
    }

    #[test]
    fn default_registry_is_builtin() {
        let registry = AppConfig::default().registry().unwrap();
        assert!(matches!(registry, Cow::Borrowed(_)));
        assert_eq!(registry.len(), 6);
    }
}
