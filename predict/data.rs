//! # Batch Input Loading
//!
//! Reads a tab-separated file of patients for batch evaluation. The schema
//! is fixed: `age`, `sex` (0 = female, 1 = male), `baseline` and
//! `pct_change` are required; `sample_id` is optional. Values are checked
//! for completeness and finiteness here, so the engine only sees
//! well-formed numbers.

use crate::types::{PatientInput, PercentUnits, Sex};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const REQUIRED_COLUMNS: [&str; 4] = ["age", "sex", "baseline", "pct_change"];

/// Validated patients ready for evaluation, in file order.
#[derive(Debug, Clone)]
pub struct BatchData {
    /// From the `sample_id` column when present, otherwise 1-based row numbers.
    pub sample_ids: Vec<String>,
    pub inputs: Vec<PatientInput>,
}

impl BatchData {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to a number. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        found_type: String,
    },
    #[error("Missing values were found in the required column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the required column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("Row {row}: sex must be coded 0 (female) or 1 (male), found {value}.")]
    InvalidSexCode { row: usize, value: f64 },
    #[error("The input file contains no data rows.")]
    NoRows,
}

/// Loads a batch file, interpreting `pct_change` with `units`.
pub fn load_batch_data(path: &Path, units: PercentUnits) -> Result<BatchData, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::NoRows);
    }

    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    for name in REQUIRED_COLUMNS {
        if !columns.contains(name) {
            return Err(DataError::ColumnNotFound(name.to_string()));
        }
    }

    let age = extract_numeric_column(&df, "age")?;
    let sex_codes = extract_numeric_column(&df, "sex")?;
    let baseline = extract_numeric_column(&df, "baseline")?;
    let pct_change = extract_numeric_column(&df, "pct_change")?;

    let mut inputs = Vec::with_capacity(df.height());
    for (row, &code) in sex_codes.iter().enumerate() {
        let sex = if code == 0.0 {
            Sex::Female
        } else if code == 1.0 {
            Sex::Male
        } else {
            return Err(DataError::InvalidSexCode {
                row: row + 1,
                value: code,
            });
        };
        inputs.push(PatientInput::new(
            age[row],
            sex,
            baseline[row],
            pct_change[row],
            units,
        ));
    }

    let sample_ids = if columns.contains("sample_id") {
        build_sample_ids(&df, inputs.len())?
    } else {
        (1..=inputs.len()).map(|i| i.to_string()).collect()
    };

    log::info!(
        "Loaded {} patients from {}",
        inputs.len(),
        path.display()
    );
    Ok(BatchData { sample_ids, inputs })
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn build_sample_ids(df: &DataFrame, n: usize) -> Result<Vec<String>, DataError> {
    let series = df.column("sample_id")?;
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let value = series.get(i).unwrap_or(AnyValue::Null);
        let text = match value {
            AnyValue::Null => String::new(),
            AnyValue::String(s) => s.to_string(),
            other => other.to_string(),
        };
        ids.push(if text.is_empty() {
            (i + 1).to_string()
        } else {
            text
        });
    }
    Ok(ids)
}
