//! Presentation of an evaluation for display and export.
//!
//! This is the only place values are rounded. Proportions are kept to six
//! decimal places and percentages to one.

use crate::types::{Evaluation, InferenceResult, ModelFamily, PatientInput};
use serde::Serialize;
use std::fmt::Write;

const PROPORTION_DECIMALS: i32 = 6;

/// Separator between the bounds of a formatted interval.
pub const INTERVAL_SEPARATOR: &str = " – ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRow {
    pub parameter: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub model: String,
    pub family: ModelFamily,
    /// Point estimate on the 0–1 scale, rounded to six decimals.
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    /// `lower – upper` on the 0–1 scale.
    pub interval: String,
    pub percent: String,
    pub percent_interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub checkpoint: u32,
    pub inputs: Vec<InputRow>,
    pub results: Vec<ResultRow>,
}

pub fn round_proportion(value: f64) -> f64 {
    let scale = 10f64.powi(PROPORTION_DECIMALS);
    (value * scale).round() / scale
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn result_row(label: String, result: &InferenceResult) -> ResultRow {
    let estimate = round_proportion(result.point_estimate);
    let lower = round_proportion(result.lower_bound);
    let upper = round_proportion(result.upper_bound);
    ResultRow {
        model: label,
        family: result.family,
        estimate,
        lower,
        upper,
        interval: format!("{lower:.6}{INTERVAL_SEPARATOR}{upper:.6}"),
        percent: format_percent(result.point_estimate),
        percent_interval: format!(
            "{}{INTERVAL_SEPARATOR}{}",
            format_percent(result.lower_bound),
            format_percent(result.upper_bound)
        ),
    }
}

/// Builds the display record for an evaluation of `input`.
pub fn build_report(evaluation: &Evaluation, input: &PatientInput) -> Report {
    let session = evaluation.checkpoint.session();
    let row = |parameter: &str, value: String| InputRow {
        parameter: parameter.to_string(),
        value,
    };
    let inputs = vec![
        row("Checkpoint (session)", session.to_string()),
        row("Age", input.age().to_string()),
        row(
            "Sex",
            format!("{} ({})", input.sex(), input.sex().indicator()),
        ),
        row("Baseline score", input.baseline_score().to_string()),
        row("Percent change (entered)", input.pct_change_raw().to_string()),
        row("Percent change (proportion)", input.pct_change().to_string()),
    ];

    let results = vec![
        result_row(
            format!("Probability of response (session {session})"),
            &evaluation.binomial,
        ),
        result_row(
            format!("Predicted final % change (session {session})"),
            &evaluation.gaussian,
        ),
    ];

    Report {
        checkpoint: session,
        inputs,
        results,
    }
}

/// Renders the results as a fixed-width text table.
pub fn render_table(report: &Report, show_intervals: bool) -> String {
    let model_width = report
        .results
        .iter()
        .map(|row| row.model.chars().count())
        .max()
        .unwrap_or(0)
        .max("Model".len());

    let mut out = String::new();
    if show_intervals {
        let _ = writeln!(
            out,
            "{:<model_width$}  {:>10}  {:>9}  {:>17}",
            "Model", "Estimate", "Percent", "95% CI"
        );
    } else {
        let _ = writeln!(
            out,
            "{:<model_width$}  {:>10}  {:>9}",
            "Model", "Estimate", "Percent"
        );
    }
    for row in &report.results {
        let _ = write!(
            out,
            "{:<model_width$}  {:>10.6}  {:>9}",
            row.model, row.estimate, row.percent
        );
        if show_intervals {
            let _ = write!(out, "  {:>17}", row.percent_interval);
        }
        out.push('\n');
    }
    out
}
