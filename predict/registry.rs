//! # Model Registry
//!
//! Read-only store of the fitted models, keyed by (checkpoint, family).
//!
//! Models are described in a human-readable TOML document. A copy of the
//! reference fits is compiled into the binary and parsed on first use; a
//! site-specific file can be loaded from disk instead. Every entry is
//! validated when it is constructed, so a `ModelSpec` that exists is always
//! internally consistent: coefficient count, covariance shape and feature
//! count agree, the covariance is symmetric positive semi-definite, and
//! every value is finite.

use crate::engine::InferenceError;
use crate::types::{Checkpoint, ModelFamily};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const BUILTIN_MODELS: &str = include_str!("models.toml");

/// Relative tolerance used when checking covariance symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// Pivot tolerance for the semi-definiteness check, relative to the largest variance.
const PIVOT_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read model registry file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model registry: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error(
        "Model ({checkpoint}, {family}) has {features} features but {coefficients} coefficients."
    )]
    CoefficientCountMismatch {
        checkpoint: Checkpoint,
        family: ModelFamily,
        features: usize,
        coefficients: usize,
    },
    #[error(
        "Model ({checkpoint}, {family}) covariance row {row} has {found} entries, expected {expected}."
    )]
    CovarianceShapeMismatch {
        checkpoint: Checkpoint,
        family: ModelFamily,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("Model ({checkpoint}, {family}) covariance has {found} rows, expected {expected}.")]
    CovarianceRowCount {
        checkpoint: Checkpoint,
        family: ModelFamily,
        found: usize,
        expected: usize,
    },
    #[error("Model ({checkpoint}, {family}) lists feature '{name}' more than once.")]
    DuplicateFeature {
        checkpoint: Checkpoint,
        family: ModelFamily,
        name: String,
    },
    #[error(
        "Model ({checkpoint}, {family}) covariance is not symmetric at ({row}, {col}): {upper} vs {lower}."
    )]
    AsymmetricCovariance {
        checkpoint: Checkpoint,
        family: ModelFamily,
        row: usize,
        col: usize,
        upper: f64,
        lower: f64,
    },
    #[error(
        "Model ({checkpoint}, {family}) has negative variance {value} for feature '{name}'."
    )]
    NegativeVariance {
        checkpoint: Checkpoint,
        family: ModelFamily,
        name: String,
        value: f64,
    },
    #[error(
        "Model ({checkpoint}, {family}) covariance is not positive semi-definite (pivot {pivot:e} at feature '{name}')."
    )]
    NotPositiveSemidefinite {
        checkpoint: Checkpoint,
        family: ModelFamily,
        name: String,
        pivot: f64,
    },
    #[error("Model ({checkpoint}, {family}) contains a non-finite constant in {field}.")]
    NonFiniteValue {
        checkpoint: Checkpoint,
        family: ModelFamily,
        field: &'static str,
    },
    #[error("Model ({checkpoint}, {family}) is registered more than once.")]
    DuplicateEntry {
        checkpoint: Checkpoint,
        family: ModelFamily,
    },
    #[error("The model registry does not contain any models.")]
    Empty,
}

/// LDLᵀ factorization of a symmetric matrix without pivoting. Returns the
/// first pivot showing the matrix is not positive semi-definite: either a
/// negative pivot, or a zero pivot whose column still has a non-zero entry
/// below it.
fn indefinite_pivot(matrix: &Array2<f64>) -> Option<(usize, f64)> {
    let k = matrix.nrows();
    let scale = matrix.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE);

    let mut lower = Array2::<f64>::eye(k);
    let mut pivots = vec![0.0; k];
    for j in 0..k {
        let pivot = matrix[[j, j]]
            - (0..j)
                .map(|m| lower[[j, m]] * lower[[j, m]] * pivots[m])
                .sum::<f64>();
        if pivot < -tolerance {
            return Some((j, pivot));
        }
        for i in (j + 1)..k {
            let residual = matrix[[i, j]]
                - (0..j)
                    .map(|m| lower[[i, m]] * lower[[j, m]] * pivots[m])
                    .sum::<f64>();
            if pivot > tolerance {
                lower[[i, j]] = residual / pivot;
            } else if residual.abs() > tolerance {
                return Some((j, pivot));
            }
        }
        if pivot > tolerance {
            pivots[j] = pivot;
        }
    }
    None
}

/// On-disk form of a single fitted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub checkpoint: Checkpoint,
    pub family: ModelFamily,
    /// Ordered feature names; coefficient and covariance order follow this list.
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    /// Row-major covariance of the coefficient estimates.
    pub covariance: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "model", default)]
    models: Vec<ModelEntry>,
}

/// A fitted model: coefficients and their covariance, in feature order.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    checkpoint: Checkpoint,
    family: ModelFamily,
    feature_order: Vec<String>,
    coefficients: Array1<f64>,
    covariance: Array2<f64>,
}

impl ModelSpec {
    /// Validates an entry and converts it into its numeric form.
    pub fn from_entry(entry: ModelEntry) -> Result<Self, RegistryError> {
        let ModelEntry {
            checkpoint,
            family,
            features,
            coefficients,
            covariance,
        } = entry;
        let k = features.len();

        let mut seen = HashSet::with_capacity(k);
        for name in &features {
            if !seen.insert(name.as_str()) {
                return Err(RegistryError::DuplicateFeature {
                    checkpoint,
                    family,
                    name: name.clone(),
                });
            }
        }

        if coefficients.len() != k {
            return Err(RegistryError::CoefficientCountMismatch {
                checkpoint,
                family,
                features: k,
                coefficients: coefficients.len(),
            });
        }
        if covariance.len() != k {
            return Err(RegistryError::CovarianceRowCount {
                checkpoint,
                family,
                found: covariance.len(),
                expected: k,
            });
        }
        for (row, values) in covariance.iter().enumerate() {
            if values.len() != k {
                return Err(RegistryError::CovarianceShapeMismatch {
                    checkpoint,
                    family,
                    row,
                    found: values.len(),
                    expected: k,
                });
            }
        }

        if coefficients.iter().any(|v| !v.is_finite()) {
            return Err(RegistryError::NonFiniteValue {
                checkpoint,
                family,
                field: "coefficients",
            });
        }
        if covariance.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RegistryError::NonFiniteValue {
                checkpoint,
                family,
                field: "covariance",
            });
        }

        let covariance = Array2::from_shape_fn((k, k), |(i, j)| covariance[i][j]);

        for i in 0..k {
            let variance = covariance[[i, i]];
            if variance < 0.0 {
                return Err(RegistryError::NegativeVariance {
                    checkpoint,
                    family,
                    name: features[i].clone(),
                    value: variance,
                });
            }
            for j in (i + 1)..k {
                let upper = covariance[[i, j]];
                let lower = covariance[[j, i]];
                let scale = upper.abs().max(lower.abs()).max(1.0);
                if (upper - lower).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(RegistryError::AsymmetricCovariance {
                        checkpoint,
                        family,
                        row: i,
                        col: j,
                        upper,
                        lower,
                    });
                }
            }
        }

        if let Some((index, pivot)) = indefinite_pivot(&covariance) {
            return Err(RegistryError::NotPositiveSemidefinite {
                checkpoint,
                family,
                name: features[index].clone(),
                pivot,
            });
        }

        Ok(Self {
            checkpoint,
            family,
            feature_order: features,
            coefficients: Array1::from_vec(coefficients),
            covariance,
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }
}

/// Where a registry's models came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "path")]
pub enum RegistrySource {
    Builtin,
    File(PathBuf),
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::Builtin => write!(f, "built-in reference models"),
            RegistrySource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<(Checkpoint, ModelFamily), ModelSpec>,
    source: RegistrySource,
}

impl ModelRegistry {
    /// Parses and validates a registry document.
    pub fn from_toml_str(text: &str, source: RegistrySource) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(text)?;
        Self::from_entries(file.models, source)
    }

    pub fn from_entries(
        entries: Vec<ModelEntry>,
        source: RegistrySource,
    ) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut models = BTreeMap::new();
        for entry in entries {
            let spec = ModelSpec::from_entry(entry)?;
            let key = (spec.checkpoint, spec.family);
            if models.insert(key, spec).is_some() {
                return Err(RegistryError::DuplicateEntry {
                    checkpoint: key.0,
                    family: key.1,
                });
            }
        }

        log::info!("Loaded {} fitted models from {}", models.len(), source);
        Ok(Self { models, source })
    }

    /// Loads a registry from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text, RegistrySource::File(path.to_path_buf()))
    }

    /// The reference models compiled into this crate. Parsed once, on first use.
    pub fn builtin() -> Result<&'static ModelRegistry, RegistryError> {
        static BUILTIN: OnceLock<ModelRegistry> = OnceLock::new();
        if let Some(registry) = BUILTIN.get() {
            return Ok(registry);
        }
        let parsed = Self::from_toml_str(BUILTIN_MODELS, RegistrySource::Builtin)?;
        Ok(BUILTIN.get_or_init(|| parsed))
    }

    /// Looks up the model fitted for `family` at `checkpoint`.
    pub fn get(
        &self,
        checkpoint: Checkpoint,
        family: ModelFamily,
    ) -> Result<&ModelSpec, InferenceError> {
        self.models
            .get(&(checkpoint, family))
            .ok_or(InferenceError::UnknownModel { checkpoint, family })
    }

    /// Registered models in (checkpoint, family) order.
    pub fn entries(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn source(&self) -> &RegistrySource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(features: &[&str], coefficients: Vec<f64>, covariance: Vec<Vec<f64>>) -> ModelEntry {
        ModelEntry {
            checkpoint: Checkpoint::Session19,
            family: ModelFamily::Binomial,
            features: features.iter().map(|s| s.to_string()).collect(),
            coefficients,
            covariance,
        }
    }

    #[test]
    fn builtin_registry_has_all_six_models() {
        let registry = ModelRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.source(), &RegistrySource::Builtin);
        for checkpoint in Checkpoint::ALL {
            for family in ModelFamily::ALL {
                let spec = registry.get(checkpoint, family).unwrap();
                assert_eq!(spec.checkpoint(), checkpoint);
                assert_eq!(spec.family(), family);
                assert_eq!(spec.feature_order().len(), spec.coefficients().len());
                assert!(
                    spec.feature_order()
                        .iter()
                        .any(|name| name == checkpoint.pct_change_feature())
                );
            }
        }
    }

    #[test]
    fn builtin_registry_carries_published_session19_coefficients() {
        let registry = ModelRegistry::builtin().unwrap();
        let spec = registry
            .get(Checkpoint::Session19, ModelFamily::Binomial)
            .unwrap();
        let names: Vec<&str> = spec.feature_order().iter().map(String::as_str).collect();
        assert_eq!(
            names,
            ["(Intercept)", "pct_change_s3", "baseline", "age", "sex"]
        );
        assert_eq!(
            spec.coefficients().to_vec(),
            vec![-1.838541, 3.910043, -0.02134, 0.014683, -0.727389]
        );
    }

    #[test]
    fn entries_are_ordered_by_checkpoint_then_family() {
        let registry = ModelRegistry::builtin().unwrap();
        let keys: Vec<(u32, ModelFamily)> = registry
            .entries()
            .map(|spec| (spec.checkpoint().session(), spec.family()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (9, ModelFamily::Binomial),
                (9, ModelFamily::Gaussian),
                (19, ModelFamily::Binomial),
                (19, ModelFamily::Gaussian),
                (29, ModelFamily::Binomial),
                (29, ModelFamily::Gaussian),
            ]
        );
    }

    #[test]
    fn missing_model_is_reported_as_unknown() {
        let registry = ModelRegistry::from_entries(
            vec![entry(&["(Intercept)"], vec![0.5], vec![vec![0.01]])],
            RegistrySource::Builtin,
        )
        .unwrap();
        let err = registry
            .get(Checkpoint::Session9, ModelFamily::Gaussian)
            .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::UnknownModel {
                checkpoint: Checkpoint::Session9,
                family: ModelFamily::Gaussian
            }
        ));
    }

    #[test]
    fn coefficient_count_must_match_features() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CoefficientCountMismatch {
                features: 2,
                coefficients: 1,
                ..
            }
        ));
    }

    #[test]
    fn ragged_covariance_is_rejected() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0, 2.0],
            vec![vec![1.0, 0.0], vec![0.0]],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CovarianceShapeMismatch { row: 1, found: 1, expected: 2, .. }
        ));
    }

    #[test]
    fn asymmetric_covariance_is_rejected() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0, 2.0],
            vec![vec![1.0, 0.2], vec![0.3, 1.0]],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AsymmetricCovariance { row: 0, col: 1, .. }
        ));
    }

    #[test]
    fn negative_variance_and_duplicates_are_rejected() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0, 2.0],
            vec![vec![1.0, 0.0], vec![0.0, -0.5]],
        ))
        .unwrap_err();
        assert!(matches!(err, RegistryError::NegativeVariance { ref name, .. } if name == "age"));

        let err = ModelSpec::from_entry(entry(
            &["age", "age"],
            vec![1.0, 2.0],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        ))
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateFeature { .. }));

        let single = || entry(&["(Intercept)"], vec![0.5], vec![vec![0.01]]);
        let err = ModelRegistry::from_entries(vec![single(), single()], RegistrySource::Builtin)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntry { .. }));
    }

    #[test]
    fn indefinite_covariance_is_rejected() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0, 2.0],
            vec![vec![1.0, 2.0], vec![2.0, 1.0]],
        ))
        .unwrap_err();
        match err {
            RegistryError::NotPositiveSemidefinite { name, pivot, .. } => {
                assert_eq!(name, "age");
                assert_eq!(pivot, -3.0);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ModelSpec::from_entry(entry(
            &["(Intercept)", "age"],
            vec![1.0, 2.0],
            vec![vec![0.0, 0.5], vec![0.5, 0.0]],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotPositiveSemidefinite { ref name, .. } if name == "(Intercept)"
        ));
    }

    #[test]
    fn singular_covariance_is_accepted() {
        let spec = ModelSpec::from_entry(entry(
            &["(Intercept)", "age", "sex"],
            vec![1.0, 2.0, 3.0],
            vec![
                vec![0.04, 0.04, 0.0],
                vec![0.04, 0.04, 0.0],
                vec![0.0, 0.0, 0.0],
            ],
        ))
        .unwrap();
        assert_eq!(spec.covariance()[[1, 1]], 0.04);
    }

    #[test]
    fn registry_file_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site_models.toml");
        fs::write(
            &path,
            r#"
[[model]]
checkpoint = 19
family = "binomial"
features = ["(Intercept)", "pct_change_s3", "baseline", "age", "sex"]
coefficients = [-1.5, 3.5, -0.02, 0.01, -0.6]
covariance = [
    [0.25, 0.0, 0.0, 0.0, 0.0],
    [0.0, 0.36, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0004, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0001, 0.0],
    [0.0, 0.0, 0.0, 0.0, 0.09],
]
"#,
        )
        .unwrap();

        let registry = ModelRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.source(), &RegistrySource::File(path.clone()));
        let spec = registry
            .get(Checkpoint::Session19, ModelFamily::Binomial)
            .unwrap();
        assert_eq!(spec.coefficients().to_vec(), vec![-1.5, 3.5, -0.02, 0.01, -0.6]);
        assert_eq!(spec.covariance()[[4, 4]], 0.09);
        assert!(matches!(
            registry.get(Checkpoint::Session19, ModelFamily::Gaussian),
            Err(InferenceError::UnknownModel { .. })
        ));

        let err = ModelRegistry::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, RegistryError::IoError(_)));
    }

    #[test]
    fn non_finite_constants_are_rejected() {
        let err = ModelSpec::from_entry(entry(
            &["(Intercept)"],
            vec![f64::NAN],
            vec![vec![0.01]],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NonFiniteValue {
                field: "coefficients",
                ..
            }
        ));
    }

    #[test]
    fn registry_documents_parse_from_toml() {
        let text = r#"
[[model]]
checkpoint = 29
family = "gaussian"
features = ["(Intercept)", "pct_change_s4"]
coefficients = [0.05, 0.9]
covariance = [[0.01, 0.001], [0.001, 0.02]]
"#;
        let registry = ModelRegistry::from_toml_str(text, RegistrySource::Builtin).unwrap();
        let spec = registry
            .get(Checkpoint::Session29, ModelFamily::Gaussian)
            .unwrap();
        assert_eq!(spec.covariance()[[0, 1]], 0.001);

        let err = ModelRegistry::from_toml_str(
            "[[model]]\ncheckpoint = 10\nfamily = \"gaussian\"\nfeatures = []\ncoefficients = []\ncovariance = []\n",
            RegistrySource::Builtin,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::TomlParseError(_)));

        let err = ModelRegistry::from_toml_str("", RegistrySource::Builtin).unwrap_err();
        assert!(matches!(err, RegistryError::Empty));
    }
}
