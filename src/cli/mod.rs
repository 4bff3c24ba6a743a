//! Command-line parsing for the `aniso` binary.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! statistics: everything here is folded into an `AnalysisConfig` by `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{Criterion, SignConvention, StatisticKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "aniso", version, about = "Directional anisotropy significance audit")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Test a CSV of observations for a directional signal.
    Audit(AuditArgs),
    /// Run the same analysis on seeded synthetic data (calibration).
    Simulate(SimulateArgs),
}

/// Directional model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Distance-dependent precessing phase: A · d · cos(θ − (L + f/d)).
    Precession,
    /// Static dipole: A · d · cos(separation from axis (L, B)).
    Dipole,
    /// Single-angle alignment: A · cos(θ − L).
    AxisCosine,
}

/// Baseline relation subtracted before centering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BaselineKind {
    None,
    /// Constant `--baseline-intercept`.
    Constant,
    /// `slope · log10(d) + intercept`.
    Log10,
    /// `slope · ln(d) + intercept`.
    Ln,
}

/// Options shared by every analysis subcommand.
#[derive(Debug, Args, Clone)]
pub struct AnalysisArgs {
    /// Model family to fit and test.
    #[arg(long, value_enum, default_value_t = ModelKind::Precession)]
    pub model: ModelKind,

    /// Sign convention of the model term. Required: datasets disagree.
    #[arg(long, value_enum)]
    pub sign: SignConvention,

    /// Precession frequency (degrees · distance units).
    #[arg(long, default_value_t = 1128.0)]
    pub frequency: f64,

    /// Hypothesis amplitude (also the multistart amplitude).
    #[arg(long, default_value_t = 0.1)]
    pub amplitude: f64,

    /// Hypothesis axis longitude (degrees).
    #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
    pub axis_lon: f64,

    /// Hypothesis axis latitude (degrees, dipole only).
    #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
    pub axis_lat: f64,

    /// Upper bound on the fitted amplitude.
    #[arg(long, default_value_t = 2.0)]
    pub max_amplitude: f64,

    #[arg(long, value_enum, default_value_t = BaselineKind::None)]
    pub baseline: BaselineKind,

    #[arg(long, allow_negative_numbers = true, default_value_t = 5.0)]
    pub baseline_slope: f64,

    #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
    pub baseline_intercept: f64,

    /// Statistic to permute.
    #[arg(long, value_enum, default_value_t = StatisticKind::Correlation)]
    pub statistic: StatisticKind,

    /// Number of permutations in the null distribution.
    #[arg(short = 'p', long, default_value_t = 1000)]
    pub permutations: usize,

    /// Sub-sample stability trials (0 disables).
    #[arg(long, default_value_t = 0)]
    pub stability_trials: usize,

    /// Fraction of the data drawn per stability trial.
    #[arg(long, default_value_t = 0.9)]
    pub stability_fraction: f64,

    /// Axis spread (degrees) under which the axis is reported stable.
    #[arg(long, default_value_t = 20.0)]
    pub stability_threshold: f64,

    /// Master seed for permutation and stability trials.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Longitude starts in the multistart grid.
    #[arg(long, default_value_t = 12)]
    pub lon_steps: usize,

    /// Latitude starts in the multistart grid (dipole only).
    #[arg(long, default_value_t = 5)]
    pub lat_steps: usize,

    #[arg(long, value_enum, default_value_t = Criterion::Aic)]
    pub criterion: Criterion,

    /// Weight residuals by 1/error (needs an error on every observation).
    #[arg(long)]
    pub weights: bool,

    /// Solver iteration budget per fit.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Optional wall-clock budget per fit, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Write the full report as JSON.
    #[arg(long, value_name = "JSON")]
    pub json: Option<PathBuf>,
}

/// `aniso audit` options.
#[derive(Debug, Args, Clone)]
pub struct AuditArgs {
    /// Observation CSV.
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    #[arg(long, default_value = "ra")]
    pub lon_col: String,

    #[arg(long, default_value = "dec")]
    pub lat_col: String,

    /// The CSV has no latitude column.
    #[arg(long)]
    pub no_lat: bool,

    #[arg(long, default_value = "z")]
    pub distance_col: String,

    #[arg(long, default_value = "mu")]
    pub value_col: String,

    /// Column holding 1-sigma measurement errors.
    #[arg(long)]
    pub error_col: Option<String>,

    #[arg(long)]
    pub distance_min: Option<f64>,

    #[arg(long)]
    pub distance_max: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub value_min: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub value_max: Option<f64>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

/// `aniso simulate` options.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Number of synthetic observations.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub count: usize,

    /// Seed for the synthetic sample (independent of `--seed`).
    #[arg(long, default_value_t = 42)]
    pub data_seed: u64,

    #[arg(long, default_value_t = 1.5)]
    pub distance_min: f64,

    #[arg(long, default_value_t = 2.0)]
    pub distance_max: f64,

    /// Gaussian noise on the observable (1-sigma).
    #[arg(long, default_value_t = 1.0)]
    pub noise: f64,

    /// Also attach the noise sigma as a measurement error.
    #[arg(long)]
    pub with_errors: bool,

    /// Generate longitudes only.
    #[arg(long)]
    pub no_lat: bool,

    /// Inject the model at the hypothesis axis with this amplitude.
    #[arg(long)]
    pub inject: Option<f64>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}
