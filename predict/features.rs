//! Maps a patient's inputs onto the feature order of a fitted model.

use crate::engine::InferenceError;
use crate::registry::ModelSpec;
use crate::types::PatientInput;
use ndarray::Array1;

/// Name the fitted models use for the constant term.
pub const INTERCEPT: &str = "(Intercept)";

const PCT_CHANGE_PREFIX: &str = "pct_change_s";

/// The semantic slot a model feature draws its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSlot {
    Intercept,
    Age,
    Sex,
    Baseline,
    /// Percent change since baseline. Every checkpoint-specific name binds
    /// to the same normalized input.
    PctChange,
}

impl FeatureSlot {
    /// Resolves a model feature name, or `None` when no input supplies it.
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            INTERCEPT => Some(FeatureSlot::Intercept),
            "age" => Some(FeatureSlot::Age),
            "sex" => Some(FeatureSlot::Sex),
            "baseline" => Some(FeatureSlot::Baseline),
            _ => name
                .strip_prefix(PCT_CHANGE_PREFIX)
                .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
                .map(|_| FeatureSlot::PctChange),
        }
    }

    fn value(self, input: &PatientInput) -> f64 {
        match self {
            FeatureSlot::Intercept => 1.0,
            FeatureSlot::Age => input.age(),
            FeatureSlot::Sex => input.sex().indicator(),
            FeatureSlot::Baseline => input.baseline_score(),
            FeatureSlot::PctChange => input.pct_change(),
        }
    }
}

/// Builds the feature vector for `model` in the model's own feature order.
pub fn vectorize(model: &ModelSpec, input: &PatientInput) -> Result<Array1<f64>, InferenceError> {
    let values = model
        .feature_order()
        .iter()
        .map(|name| {
            FeatureSlot::resolve(name)
                .map(|slot| slot.value(input))
                .ok_or_else(|| InferenceError::UnboundFeature {
                    name: name.clone(),
                    checkpoint: model.checkpoint(),
                    family: model.family(),
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(Array1::from_vec(values))
}
