//! Linear predictor and its delta-method standard error.
//!
//! For a feature vector `x`, coefficients `b` and coefficient covariance `V`:
//!
//! - `eta = x'b`
//! - `Var(eta) = x'Vx`, summed over every (i, j) pair so that cross
//!   covariances between correlated estimates contribute to the width.
//!
//! Results are exact and unrounded; rounding belongs to the report layer.

use crate::engine::InferenceError;
use ndarray::{ArrayView1, ArrayView2};

/// The linear predictor together with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPrediction {
    pub eta: f64,
    pub standard_error: f64,
}

/// Computes `eta = x'b` and `se = sqrt(max(x'Vx, 0))`.
///
/// The variance is floored at zero: a near-singular covariance can make the
/// quadratic form come out marginally negative in floating point.
pub fn predict(
    x: ArrayView1<f64>,
    coefficients: ArrayView1<f64>,
    covariance: ArrayView2<f64>,
) -> Result<LinearPrediction, InferenceError> {
    let k = x.len();
    if coefficients.len() != k {
        return Err(InferenceError::DimensionMismatch {
            what: "coefficients",
            expected: k,
            found: coefficients.len(),
        });
    }
    if covariance.nrows() != k || covariance.ncols() != k {
        return Err(InferenceError::DimensionMismatch {
            what: "covariance",
            expected: k,
            found: if covariance.nrows() != k {
                covariance.nrows()
            } else {
                covariance.ncols()
            },
        });
    }

    let eta = x.dot(&coefficients);
    let variance = x.dot(&covariance.dot(&x));
    if variance < 0.0 {
        log::debug!("Quadratic form {variance:e} below zero; flooring the variance");
    }
    let standard_error = variance.max(0.0).sqrt();

    Ok(LinearPrediction {
        eta,
        standard_error,
    })
}
