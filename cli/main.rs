#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use tmspredict::config::AppConfig;
use tmspredict::data::load_batch_data;
use tmspredict::diagnostics;
use tmspredict::export::{save_batch, save_report};
use tmspredict::report::{build_report, render_table};
use tmspredict::{Checkpoint, Engine, PatientInput, PercentUnits, Sex};

#[derive(Clone, Copy, ValueEnum)]
pub enum PercentUnitsCli {
    /// Values above 1 in magnitude are percents, others proportions
    Auto,
    Proportion,
    Percent,
}

impl From<PercentUnitsCli> for PercentUnits {
    fn from(units: PercentUnitsCli) -> Self {
        match units {
            PercentUnitsCli::Auto => PercentUnits::Auto,
            PercentUnitsCli::Proportion => PercentUnits::Proportion,
            PercentUnitsCli::Percent => PercentUnits::Percent,
        }
    }
}

/// Numeric patient values must be finite; NaN and infinities are rejected
/// here as they are in batch files.
fn parse_finite(value: &str) -> Result<f64, String> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{value}' is not a number: {e}"))?;
    if number.is_finite() {
        Ok(number)
    } else {
        Err(format!("'{value}' is not a finite number"))
    }
}

#[derive(Args)]
pub struct SettingsArgs {
    /// Path to a settings file (.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to a model registry file (.toml) replacing the built-in models
    #[arg(long, value_name = "PATH")]
    pub models: Option<PathBuf>,

    /// How to interpret the percent-change value
    #[arg(long, value_enum)]
    pub percent_units: Option<PercentUnitsCli>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Checkpoint session at which the percent change was measured (9, 19 or 29)
    #[arg(long)]
    pub checkpoint: Checkpoint,

    /// Age in years
    #[arg(long, value_parser = parse_finite)]
    pub age: f64,

    /// Sex: 0/F/female or 1/M/male
    #[arg(long)]
    pub sex: Sex,

    /// Symptom score at baseline
    #[arg(long, value_parser = parse_finite)]
    pub baseline: f64,

    /// Percent change since baseline, as a proportion (0.40) or a percent (40)
    #[arg(long, allow_negative_numbers = true, value_parser = parse_finite)]
    pub pct_change: f64,

    /// Write the inputs and results as a CSV report
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Hide confidence intervals in the printed table
    #[arg(long)]
    pub no_intervals: bool,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Path to a TSV file with age, sex, baseline, pct_change (and optional sample_id) columns
    pub input: PathBuf,

    /// Checkpoint session shared by every row (9, 19 or 29)
    #[arg(long)]
    pub checkpoint: Checkpoint,

    /// Output TSV path
    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Parser)]
#[command(
    name = "tmspredict",
    about = "Early-response outcome estimates for TMS treatment courses",
    long_about = "Estimates the probability of final response and the predicted final change \
                 in symptom score from progress at session 9, 19 or 29, with 95% confidence \
                 intervals from the fitted coefficient covariance."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single patient
    Predict(PredictArgs),

    /// Evaluate every patient in a TSV file
    Batch(BatchArgs),

    /// List the registered models and their feature order
    Models(SettingsArgs),

    /// Print a JSON snapshot of the runtime environment
    Diag(SettingsArgs),

    /// Show version information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => run_predict(args),
        Some(Commands::Batch(args)) => run_batch(args),
        Some(Commands::Models(args)) => run_models(args),
        Some(Commands::Diag(args)) => run_diag(args),
        Some(Commands::Version) => {
            println!("tmspredict {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Loads the settings file, then applies command-line overrides.
fn resolve_settings(args: &SettingsArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(models) = &args.models {
        config.models = Some(models.clone());
    }
    if let Some(units) = args.percent_units {
        config.percent_units = units.into();
    }
    Ok(config)
}

fn run_predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_settings(&args.settings)?;
    let registry = config.registry()?;
    let engine = Engine::with_config(&registry, &config);

    let input = PatientInput::new(
        args.age,
        args.sex,
        args.baseline,
        args.pct_change,
        config.percent_units,
    );
    let evaluation = engine.evaluate(args.checkpoint, &input)?;
    let report = build_report(&evaluation, &input);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Estimates at session {} (percent change {} -> proportion {})",
            args.checkpoint.session(),
            input.pct_change_raw(),
            input.pct_change()
        );
        print!(
            "{}",
            render_table(&report, config.show_intervals && !args.no_intervals)
        );
    }

    if let Some(path) = &args.export {
        save_report(&report, path)?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn run_batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_settings(&args.settings)?;
    let registry = config.registry()?;
    let engine = Engine::with_config(&registry, &config);

    println!("Loading patients from: {}", args.input.display());
    let data = load_batch_data(&args.input, config.percent_units)?;
    println!("Loaded {} patients", data.len());

    let evaluations = data
        .inputs
        .iter()
        .map(|input| engine.evaluate_detailed(args.checkpoint, input))
        .collect::<Result<Vec<_>, _>>()?;

    save_batch(&data, &evaluations, &args.output)?;
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}

fn run_models(args: SettingsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_settings(&args)?;
    let registry = config.registry()?;
    println!("Models from {}:", registry.source());
    for spec in registry.entries() {
        println!(
            "  session {:>2}  {:<8}  {}",
            spec.checkpoint().session(),
            spec.family().to_string(),
            spec.feature_order().join(", ")
        );
    }
    Ok(())
}

fn run_diag(args: SettingsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_settings(&args)?;
    let snapshot = diagnostics::snapshot(&config, args.config.as_deref());
    println!("{}", diagnostics::to_json(&snapshot)?);
    Ok(())
}
