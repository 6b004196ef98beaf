//! Flat-file writers: the two-section CSV report for a single patient and
//! the tab-separated output of a batch run.

use crate::data::BatchData;
use crate::engine::DetailedEvaluation;
use crate::report::Report;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write export file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to encode CSV output: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Batch output has {rows} input rows but {evaluations} evaluations.")]
    RowCountMismatch { rows: usize, evaluations: usize },
}

pub const RESULT_COLUMNS: [&str; 5] = [
    "Model",
    "Probability/Proportion (0–1)",
    "95% CI (0–1)",
    "Percent",
    "95% CI (%)",
];

pub const BATCH_COLUMNS: [&str; 14] = [
    "sample_id",
    "age",
    "sex",
    "baseline",
    "pct_change",
    "log_odds",
    "standard_error_log_odds",
    "probability",
    "probability_lower_95",
    "probability_upper_95",
    "predicted_change",
    "standard_error_change",
    "change_lower_95",
    "change_upper_95",
];

/// Writes the report as an `Inputs` block and a `Results` block separated by
/// a blank line.
pub fn write_report<W: Write>(report: &Report, mut out: W) -> Result<(), ExportError> {
    writeln!(out, "Inputs")?;
    {
        let mut writer = csv::Writer::from_writer(&mut out);
        writer.write_record(["Parameter", "Value"])?;
        for row in &report.inputs {
            writer.write_record([row.parameter.as_str(), row.value.as_str()])?;
        }
        writer.flush()?;
    }

    writeln!(out)?;
    writeln!(out, "Results")?;
    {
        let mut writer = csv::Writer::from_writer(&mut out);
        writer.write_record(RESULT_COLUMNS)?;
        for row in &report.results {
            writer.write_record([
                row.model.clone(),
                format!("{:.6}", row.estimate),
                row.interval.clone(),
                row.percent.clone(),
                row.percent_interval.clone(),
            ])?;
        }
        writer.flush()?;
    }
    Ok(())
}

pub fn save_report(report: &Report, path: &Path) -> Result<(), ExportError> {
    let mut file = BufWriter::new(File::create(path)?);
    write_report(report, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Writes one tab-separated row per input sample with both families'
/// linear predictors, standard errors, estimates and bounds.
pub fn write_batch<W: Write>(
    data: &BatchData,
    evaluations: &[DetailedEvaluation],
    out: W,
) -> Result<(), ExportError> {
    if data.len() != evaluations.len() {
        return Err(ExportError::RowCountMismatch {
            rows: data.len(),
            evaluations: evaluations.len(),
        });
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(out);
    writer.write_record(BATCH_COLUMNS)?;

    for (i, evaluation) in evaluations.iter().enumerate() {
        let input = &data.inputs[i];
        let binomial = &evaluation.binomial;
        let gaussian = &evaluation.gaussian;
        writer.write_record([
            data.sample_ids[i].clone(),
            input.age().to_string(),
            input.sex().indicator().to_string(),
            input.baseline_score().to_string(),
            input.pct_change().to_string(),
            binomial.prediction.eta.to_string(),
            binomial.prediction.standard_error.to_string(),
            binomial.result.point_estimate.to_string(),
            binomial.result.lower_bound.to_string(),
            binomial.result.upper_bound.to_string(),
            gaussian.result.point_estimate.to_string(),
            gaussian.prediction.standard_error.to_string(),
            gaussian.result.lower_bound.to_string(),
            gaussian.result.upper_bound.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_batch(
    data: &BatchData,
    evaluations: &[DetailedEvaluation],
    path: &Path,
) -> Result<(), ExportError> {
    let file = BufWriter::new(File::create(path)?);
    write_batch(data, evaluations, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::report::build_report;
    use crate::types::{Checkpoint, PatientInput, PercentUnits, Sex};

    fn sample_report() -> Report {
        let input = PatientInput::new(35.0, Sex::Female, 18.0, 40.0, PercentUnits::Auto);
        let evaluation = Engine::builtin()
            .unwrap()
            .evaluate(Checkpoint::Session19, &input)
            .unwrap();
        build_report(&evaluation, &input)
    }

    #[test]
    fn report_has_two_sections() {
        let mut buffer = Vec::new();
        write_report(&sample_report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Inputs");
        assert_eq!(lines[1], "Parameter,Value");
        assert_eq!(lines[2], "Checkpoint (session),19");
        let blank = lines.iter().position(|line| line.is_empty()).unwrap();
        assert_eq!(blank, 8);
        assert_eq!(lines[blank + 1], "Results");
        assert_eq!(lines[blank + 2], RESULT_COLUMNS.join(","));
        assert!(lines[blank + 3].starts_with("Probability of response (session 19),0.463878,"));
        assert!(lines[blank + 4].starts_with("Predicted final % change (session 19),"));
        assert_eq!(lines.len(), blank + 5);
    }

    #[test]
    fn batch_rows_must_match_evaluations() {
        let data = BatchData {
            sample_ids: vec!["a".to_string()],
            inputs: vec![PatientInput::new(
                35.0,
                Sex::Female,
                18.0,
                0.4,
                PercentUnits::Auto,
            )],
        };
        let err = write_batch(&data, &[], Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ExportError::RowCountMismatch {
                rows: 1,
                evaluations: 0
            }
        ));
    }

    #[test]
    fn batch_output_is_tab_separated() {
        let input = PatientInput::new(35.0, Sex::Female, 18.0, 0.4, PercentUnits::Auto);
        let data = BatchData {
            sample_ids: vec!["p1".to_string()],
            inputs: vec![input],
        };
        let evaluation = Engine::builtin()
            .unwrap()
            .evaluate_detailed(Checkpoint::Session19, &input)
            .unwrap();
        let mut buffer = Vec::new();
        write_batch(&data, &[evaluation], &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), BATCH_COLUMNS.join("\t"));
        let fields: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(fields.len(), BATCH_COLUMNS.len());
        assert_eq!(fields[0], "p1");
        assert_eq!(fields[4], "0.4");
        let probability: f64 = fields[7].parse().unwrap();
        assert!((probability - 0.463878).abs() < 5e-7);
    }
}
