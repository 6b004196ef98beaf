#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Early-response outcome estimates for a course of TMS treatment.
//!
//! At sessions 9, 19 and 29 a patient's percent change in symptom score,
//! together with age, sex and baseline score, is fed to two pre-fitted
//! models: a logistic model for the probability of final response and a
//! linear model for the final proportional change. Each estimate comes with
//! a 95% interval derived from the coefficient covariance by the delta method.

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod engine;
pub mod export;
pub mod features;
pub mod linear;
pub mod registry;
pub mod report;
pub mod transform;
pub mod types;

pub use engine::{Engine, InferenceError};
pub use registry::{ModelRegistry, ModelSpec, RegistryError};
pub use types::{Checkpoint, Evaluation, InferenceResult, ModelFamily, PatientInput, PercentUnits, Sex};
