//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - loads (or synthesizes) observations
//! - runs the shared analysis pipeline
//! - prints the report and writes the optional JSON export

use std::time::Duration;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::{AnalysisArgs, AuditArgs, BaselineKind, Command, ModelKind, SimulateArgs};
use crate::data::{InjectedSignal, SyntheticConfig, generate_observations};
use crate::detrend::Baseline;
use crate::domain::ModelVariant;
use crate::error::AppError;
use crate::fit::SolverOptions;
use crate::io::ingest::{ColumnMap, IngestFilters, IngestedData, load_observations};
use crate::math::wrap_deg;

pub mod pipeline;

use pipeline::AnalysisConfig;

/// Entry point for the `aniso` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Audit(args) => handle_audit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn handle_audit(args: AuditArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.analysis)?;
    let columns = ColumnMap {
        longitude: args.lon_col,
        latitude: (!args.no_lat).then_some(args.lat_col),
        distance: args.distance_col,
        value: args.value_col,
        error: args.error_col,
    };
    let filters = IngestFilters {
        distance_min: args.distance_min,
        distance_max: args.distance_max,
        value_min: args.value_min,
        value_max: args.value_max,
    };
    let data = load_observations(&args.input, &columns, &filters)?;
    finish(&args.analysis, &config, data)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.analysis)?;
    let signal = args.inject.map(|amplitude| {
        let mut params = config.initial.clone();
        if let Some(a) = params.first_mut() {
            *a = amplitude;
        }
        InjectedSignal { variant: config.variant, params }
    });
    let synthetic = SyntheticConfig {
        count: args.count,
        seed: args.data_seed,
        distance_min: args.distance_min,
        distance_max: args.distance_max,
        noise_sigma: args.noise,
        with_latitude: !args.no_lat,
        with_errors: args.with_errors,
        baseline: config.baseline,
        signal,
    };
    let data = IngestedData::from_set(generate_observations(&synthetic)?)?;
    finish(&args.analysis, &config, data)
}

fn finish(args: &AnalysisArgs, config: &AnalysisConfig, data: IngestedData) -> Result<(), AppError> {
    let run = pipeline::run_analysis(config, data)?;
    println!("{}", crate::report::format_run_summary(&run, config));

    if let Some(path) = &args.json {
        crate::io::export::write_report_json(path, &run, config)?;
    }
    Ok(())
}

/// Fold CLI flags into an [`AnalysisConfig`].
pub fn analysis_config_from_args(args: &AnalysisArgs) -> Result<AnalysisConfig, AppError> {
    let variant = match args.model {
        ModelKind::Precession => ModelVariant::PrecessionPhase {
            frequency: args.frequency,
            sign: args.sign,
        },
        ModelKind::Dipole => ModelVariant::StaticDipole { sign: args.sign },
        ModelKind::AxisCosine => ModelVariant::AxisCosine { sign: args.sign },
    };
    let mut initial = vec![args.amplitude, wrap_deg(args.axis_lon)];
    if variant.requires_latitude() {
        initial.push(args.axis_lat);
    }

    let bounds = variant.default_bounds(args.max_amplitude)?;
    if !bounds.contains(&initial) {
        return Err(AppError::new(
            2,
            format!("Hypothesis {initial:?} lies outside the parameter bounds."),
        ));
    }

    let baseline = match args.baseline {
        BaselineKind::None => Baseline::None,
        BaselineKind::Constant => Baseline::Constant { value: args.baseline_intercept },
        BaselineKind::Log10 => Baseline::Log10 {
            slope: args.baseline_slope,
            intercept: args.baseline_intercept,
        },
        BaselineKind::Ln => Baseline::Ln {
            slope: args.baseline_slope,
            intercept: args.baseline_intercept,
        },
    };

    Ok(AnalysisConfig {
        variant,
        initial,
        bounds,
        baseline,
        statistic: args.statistic,
        permutations: args.permutations,
        stability_trials: args.stability_trials,
        stability_fraction: args.stability_fraction,
        stability_threshold_deg: args.stability_threshold,
        seed: args.seed,
        lon_steps: args.lon_steps,
        lat_steps: args.lat_steps,
        criterion: args.criterion,
        use_weights: args.weights,
        solver: SolverOptions {
            max_iterations: args.max_iterations,
            timeout: args.timeout_ms.map(Duration::from_millis),
            ..SolverOptions::default()
        },
        abort: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::SignConvention;

    fn analysis_args(argv: &[&str]) -> AnalysisArgs {
        let mut full = vec!["aniso", "simulate"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Simulate(args) => args.analysis,
            Command::Audit(_) => unreachable!(),
        }
    }

    #[test]
    fn dipole_config_has_three_params() {
        let args = analysis_args(&["--sign", "additive", "--model", "dipole", "--axis-lon", "-60", "--axis-lat", "30"]);
        let cfg = analysis_config_from_args(&args).unwrap();
        assert_eq!(cfg.variant, ModelVariant::StaticDipole { sign: SignConvention::Additive });
        assert_eq!(cfg.initial, vec![0.1, 300.0, 30.0]);
        assert_eq!(cfg.bounds.len(), 3);
    }

    #[test]
    fn hypothesis_outside_bounds_is_a_usage_error() {
        let args = analysis_args(&["--sign", "additive", "--amplitude", "5", "--max-amplitude", "1"]);
        assert_eq!(analysis_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn log_baseline_carries_slope_and_intercept() {
        let args = analysis_args(&[
            "--sign", "subtractive", "--baseline", "log10", "--baseline-intercept", "43.2", "--timeout-ms", "500",
        ]);
        let cfg = analysis_config_from_args(&args).unwrap();
        assert_eq!(cfg.baseline, Baseline::Log10 { slope: 5.0, intercept: 43.2 });
        assert_eq!(cfg.solver.timeout, Some(Duration::from_millis(500)));
    }
}
