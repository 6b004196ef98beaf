//! Response-scale transforms for the two model families.
//!
//! Both transforms take a linear predictor and its standard error and build
//! a Wald interval `eta ± Z_95 * se` before mapping to the response scale.

use crate::linear::LinearPrediction;
use crate::types::{InferenceResult, LinkFunction, ModelFamily};

/// Two-sided 95% normal critical value.
pub const Z_95: f64 = 1.96;

/// Bounds applied to Gaussian estimates: 100% worsening to 100% improvement.
pub const PROPORTION_RANGE: (f64, f64) = (-1.0, 1.0);

/// The inverse logit, `1 / (1 + exp(-x))`.
///
/// `exp` is only ever taken of a non-positive argument, so it cannot
/// overflow and large magnitudes saturate to 0.0 or 1.0. Negative inputs use
/// `exp(x) / (1 + exp(x))`, which keeps full relative precision in the tail.
pub fn logistic(x: f64) -> f64 {
    if x < 0.0 {
        let e = x.exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// Probability of response with a 95% interval mapped through the logistic.
pub fn transform_binomial(eta: f64, standard_error: f64) -> InferenceResult {
    let half_width = Z_95 * standard_error;
    InferenceResult {
        point_estimate: logistic(eta),
        lower_bound: logistic(eta - half_width),
        upper_bound: logistic(eta + half_width),
        family: ModelFamily::Binomial,
    }
}

/// Final proportional change with a 95% interval, each value clamped to
/// [-1, 1] independently.
///
/// A clamped bound is a display bound only; it no longer carries 95% coverage.
pub fn transform_gaussian(y: f64, standard_error: f64) -> InferenceResult {
    let half_width = Z_95 * standard_error;
    let (lo, hi) = PROPORTION_RANGE;
    let raw = [y, y - half_width, y + half_width];
    let [point_estimate, lower_bound, upper_bound] = raw.map(|v| v.clamp(lo, hi));
    if raw != [point_estimate, lower_bound, upper_bound] {
        log::debug!(
            "Gaussian estimate {y:.6} [{:.6}, {:.6}] clamped to [{lo}, {hi}]",
            raw[1],
            raw[2]
        );
    }
    InferenceResult {
        point_estimate,
        lower_bound,
        upper_bound,
        family: ModelFamily::Gaussian,
    }
}

/// Dispatches on the link function of `family`.
pub fn apply(family: ModelFamily, prediction: LinearPrediction) -> InferenceResult {
    match family.link_function() {
        LinkFunction::Logit => transform_binomial(prediction.eta, prediction.standard_error),
        LinkFunction::Identity => transform_gaussian(prediction.eta, prediction.standard_error),
    }
}
