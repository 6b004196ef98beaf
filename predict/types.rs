//! Core value types shared by the registry, the inference engine and the
//! report layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a scalar input cannot be interpreted as one of the
/// categorical types below.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseValueError {
    #[error("Unsupported checkpoint '{0}'. Supported checkpoints are sessions 9, 19 and 29.")]
    Checkpoint(String),
    #[error("Unrecognized sex value '{0}'. Use 0/F/female or 1/M/male.")]
    Sex(String),
    #[error("Unrecognized model family '{0}'. Use 'binomial' or 'gaussian'.")]
    Family(String),
}

/// An early treatment session at which interim progress is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Checkpoint {
    Session9,
    Session19,
    Session29,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 3] = [
        Checkpoint::Session9,
        Checkpoint::Session19,
        Checkpoint::Session29,
    ];

    /// The session number this checkpoint corresponds to.
    pub fn session(self) -> u32 {
        match self {
            Checkpoint::Session9 => 9,
            Checkpoint::Session19 => 19,
            Checkpoint::Session29 => 29,
        }
    }

    /// Name of the percent-change feature the fitted models use at this checkpoint.
    pub fn pct_change_feature(self) -> &'static str {
        match self {
            Checkpoint::Session9 => "pct_change_s2",
            Checkpoint::Session19 => "pct_change_s3",
            Checkpoint::Session29 => "pct_change_s4",
        }
    }
}

impl TryFrom<u32> for Checkpoint {
    type Error = ParseValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            9 => Ok(Checkpoint::Session9),
            19 => Ok(Checkpoint::Session19),
            29 => Ok(Checkpoint::Session29),
            other => Err(ParseValueError::Checkpoint(other.to_string())),
        }
    }
}

impl From<Checkpoint> for u32 {
    fn from(checkpoint: Checkpoint) -> Self {
        checkpoint.session()
    }
}

impl FromStr for Checkpoint {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let session: u32 = s
            .trim()
            .parse()
            .map_err(|_| ParseValueError::Checkpoint(s.to_string()))?;
        Checkpoint::try_from(session)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.session())
    }
}

/// Defines the link function, connecting the linear predictor to the mean response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFunction {
    /// The logit link. The linear predictor is on the log-odds scale.
    Logit,
    /// The identity link. The linear predictor is already on the response scale.
    Identity,
}

/// The family of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Probability of final treatment response.
    Binomial,
    /// Final proportional change in symptom score.
    Gaussian,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Binomial, ModelFamily::Gaussian];

    pub fn link_function(self) -> LinkFunction {
        match self {
            ModelFamily::Binomial => LinkFunction::Logit,
            ModelFamily::Gaussian => LinkFunction::Identity,
        }
    }
}

impl FromStr for ModelFamily {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binomial" => Ok(ModelFamily::Binomial),
            "gaussian" => Ok(ModelFamily::Gaussian),
            _ => Err(ParseValueError::Family(s.to_string())),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Binomial => write!(f, "binomial"),
            ModelFamily::Gaussian => write!(f, "gaussian"),
        }
    }
}

/// Sex as coded in the fitted models (female is the reference level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// Numeric indicator used as the `sex` feature value.
    pub fn indicator(self) -> f64 {
        match self {
            Sex::Female => 0.0,
            Sex::Male => 1.0,
        }
    }
}

impl FromStr for Sex {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "0.0" | "f" | "female" => Ok(Sex::Female),
            "1" | "1.0" | "m" | "male" => Ok(Sex::Male),
            _ => Err(ParseValueError::Sex(s.to_string())),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "F"),
            Sex::Male => write!(f, "M"),
        }
    }
}

/// How a raw percent-change value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentUnits {
    /// Values with magnitude above 1 are read as percents, everything else
    /// as a proportion.
    #[default]
    Auto,
    Proportion,
    Percent,
}

impl PercentUnits {
    /// Converts a raw value into a proportion.
    pub fn normalize(self, raw: f64) -> f64 {
        match self {
            PercentUnits::Auto if raw.abs() > 1.0 => raw / 100.0,
            PercentUnits::Auto | PercentUnits::Proportion => raw,
            PercentUnits::Percent => raw / 100.0,
        }
    }
}

/// The scalar inputs of one inference request.
///
/// `pct_change` is stored as a proportion; the raw value is kept only so the
/// report can echo what the user entered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatientInput {
    age: f64,
    sex: Sex,
    baseline_score: f64,
    pct_change: f64,
    pct_change_raw: f64,
}

impl PatientInput {
    pub fn new(age: f64, sex: Sex, baseline_score: f64, pct_change_raw: f64, units: PercentUnits) -> Self {
        Self {
            age,
            sex,
            baseline_score,
            pct_change: units.normalize(pct_change_raw),
            pct_change_raw,
        }
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn baseline_score(&self) -> f64 {
        self.baseline_score
    }

    /// Percent change since baseline, as a proportion.
    pub fn pct_change(&self) -> f64 {
        self.pct_change
    }

    /// Percent change exactly as it was supplied.
    pub fn pct_change_raw(&self) -> f64 {
        self.pct_change_raw
    }
}

/// A point estimate and its 95% interval on the response scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceResult {
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub family: ModelFamily,
}

/// Both model families evaluated for one patient at one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub checkpoint: Checkpoint,
    pub binomial: InferenceResult,
    pub gaussian: InferenceResult,
}
