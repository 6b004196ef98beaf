//! # Inference Engine
//!
//! Evaluates both fitted model families for one patient at one checkpoint:
//! feature vectorization, linear predictor with delta-method standard error,
//! and the response-scale transform with its 95% interval.
//!
//! The engine borrows an immutable registry and holds no mutable state, so a
//! single registry can back any number of engines and concurrent callers.

use crate::config::{AppConfig, DomainBounds};
use crate::features::vectorize;
use crate::linear::{LinearPrediction, predict};
use crate::registry::{ModelRegistry, ModelSpec, RegistryError};
use crate::transform;
use crate::types::{Checkpoint, Evaluation, InferenceResult, ModelFamily, PatientInput};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("No fitted {family} model is registered for {checkpoint}.")]
    UnknownModel {
        checkpoint: Checkpoint,
        family: ModelFamily,
    },
    #[error(
        "The {family} model for {checkpoint} uses feature '{name}', which no patient input supplies."
    )]
    UnboundFeature {
        name: String,
        checkpoint: Checkpoint,
        family: ModelFamily,
    },
    #[error("Dimension mismatch in {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Input '{field}' = {value} is outside the range the models were fitted on [{min}, {max}].")]
    Domain {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{0} is not offered by the current configuration.")]
    CheckpointNotOffered(Checkpoint),
}

/// Intermediate and final values for one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamilyDetail {
    pub prediction: LinearPrediction,
    pub result: InferenceResult,
}

/// An evaluation that also exposes the linear predictors and standard errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailedEvaluation {
    pub checkpoint: Checkpoint,
    pub binomial: FamilyDetail,
    pub gaussian: FamilyDetail,
}

impl DetailedEvaluation {
    pub fn summary(&self) -> Evaluation {
        Evaluation {
            checkpoint: self.checkpoint,
            binomial: self.binomial.result,
            gaussian: self.gaussian.result,
        }
    }
}

/// Runs a single fitted model against a patient.
pub fn evaluate_model(
    model: &ModelSpec,
    input: &PatientInput,
) -> Result<FamilyDetail, InferenceError> {
    let x = vectorize(model, input)?;
    let prediction = predict(x.view(), model.coefficients().view(), model.covariance().view())?;
    log::debug!(
        "{} {} model: eta = {:.6}, se = {:.6}",
        model.checkpoint(),
        model.family(),
        prediction.eta,
        prediction.standard_error
    );
    Ok(FamilyDetail {
        prediction,
        result: transform::apply(model.family(), prediction),
    })
}

pub struct Engine<'r> {
    registry: &'r ModelRegistry,
    offered: Vec<Checkpoint>,
    domain_guard: Option<DomainBounds>,
}

impl<'r> Engine<'r> {
    /// An engine offering every checkpoint, without a domain guard.
    pub fn new(registry: &'r ModelRegistry) -> Self {
        Self {
            registry,
            offered: Checkpoint::ALL.to_vec(),
            domain_guard: None,
        }
    }

    pub fn with_config(registry: &'r ModelRegistry, config: &AppConfig) -> Self {
        Self {
            registry,
            offered: config.checkpoints.clone(),
            domain_guard: config.domain_guard,
        }
    }

    pub fn registry(&self) -> &'r ModelRegistry {
        self.registry
    }

    /// Checkpoints this engine accepts.
    pub fn offered(&self) -> &[Checkpoint] {
        &self.offered
    }

    /// Response probability and predicted final change for `input` at `checkpoint`.
    pub fn evaluate(
        &self,
        checkpoint: Checkpoint,
        input: &PatientInput,
    ) -> Result<Evaluation, InferenceError> {
        self.evaluate_detailed(checkpoint, input)
            .map(|detail| detail.summary())
    }

    pub fn evaluate_detailed(
        &self,
        checkpoint: Checkpoint,
        input: &PatientInput,
    ) -> Result<DetailedEvaluation, InferenceError> {
        if !self.offered.contains(&checkpoint) {
            return Err(InferenceError::CheckpointNotOffered(checkpoint));
        }
        if let Some(bounds) = &self.domain_guard {
            check_domain(bounds, input)?;
        }

        let binomial = evaluate_model(
            self.registry.get(checkpoint, ModelFamily::Binomial)?,
            input,
        )?;
        let gaussian = evaluate_model(
            self.registry.get(checkpoint, ModelFamily::Gaussian)?,
            input,
        )?;

        Ok(DetailedEvaluation {
            checkpoint,
            binomial,
            gaussian,
        })
    }
}

impl Engine<'static> {
    /// An engine over the built-in reference models.
    pub fn builtin() -> Result<Self, RegistryError> {
        ModelRegistry::builtin().map(Engine::new)
    }
}

fn check_domain(bounds: &DomainBounds, input: &PatientInput) -> Result<(), InferenceError> {
    let checks = [
        ("age", input.age(), bounds.age_min, bounds.age_max),
        (
            "baseline",
            input.baseline_score(),
            0.0,
            bounds.baseline_max.unwrap_or(f64::INFINITY),
        ),
        ("pct_change", input.pct_change(), -1.0, 1.0),
    ];
    for (field, value, min, max) in checks {
        if !(min..=max).contains(&value) {
            log::warn!("Rejecting input {field} = {value}: outside [{min}, {max}]");
            return Err(InferenceError::Domain {
                field,
                value,
                min,
                max,
            });
        }
    }
    Ok(())
}
