//! Export an analysis run as a JSON report.
//!
//! The report is self-describing: it carries the model, sign convention, seed
//! and trial counts alongside the results, so a run can be reproduced from the
//! file alone.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::{AnalysisConfig, HypothesisCorrelation, RunOutput};
use crate::detrend::Baseline;
use crate::domain::{IcDelta, ModelVariant, SignificanceResult, StabilityReport, StatisticKind};
use crate::error::AppError;
use crate::io::ingest::{DatasetStats, RowError};

#[derive(Debug, Serialize)]
pub struct NamedParam {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct FitSection {
    pub params: Vec<NamedParam>,
    pub cost: f64,
    pub rss: f64,
    pub iterations: usize,
    pub axis_offset_deg: f64,
}

#[derive(Debug, Serialize)]
pub struct NullPercentile {
    pub q: f64,
    pub value: f64,
}

/// Top-level JSON document.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub model: ModelVariant,
    pub hypothesis: Vec<NamedParam>,
    pub baseline: Baseline,
    pub statistic: StatisticKind,
    pub seed: Option<u64>,
    pub weighted: bool,
    pub data: &'a DatasetStats,
    pub rows_read: usize,
    pub rows_filtered: usize,
    pub row_errors: &'a [RowError],
    pub fit: FitSection,
    pub significance: &'a SignificanceResult,
    pub null_percentiles: Vec<NullPercentile>,
    pub hypothesis_correlation: Option<HypothesisCorrelation>,
    pub stability: Option<&'a StabilityReport>,
    pub comparison: &'a IcDelta,
}

fn named(variant: &ModelVariant, values: &[f64]) -> Vec<NamedParam> {
    variant
        .param_names()
        .iter()
        .zip(values)
        .map(|(&name, &value)| NamedParam { name, value })
        .collect()
}

/// Build the report document for a finished run.
pub fn build_report<'a>(run: &'a RunOutput, config: &AnalysisConfig) -> JsonReport<'a> {
    JsonReport {
        generated_at: Utc::now(),
        model: config.variant,
        hypothesis: named(&config.variant, &config.initial),
        baseline: config.baseline,
        statistic: config.statistic,
        seed: config.seed,
        weighted: run.weighted,
        data: &run.data.stats,
        rows_read: run.data.rows_read,
        rows_filtered: run.data.rows_filtered,
        row_errors: &run.data.row_errors,
        fit: FitSection {
            params: named(&config.variant, &run.fit.params.values),
            cost: run.fit.cost,
            rss: run.fit.rss(),
            iterations: run.fit.iterations,
            axis_offset_deg: run.axis_offset_deg,
        },
        significance: &run.significance,
        null_percentiles: run
            .null_percentiles
            .iter()
            .map(|&(q, value)| NullPercentile { q, value })
            .collect(),
        hypothesis_correlation: run.correlation,
        stability: run.stability.as_ref(),
        comparison: &run.comparison,
    }
}

/// Write the run report as pretty-printed JSON.
pub fn write_report_json(path: &Path, run: &RunOutput, config: &AnalysisConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create report JSON '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &build_report(run, config))
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write report JSON '{}': {e}", path.display())))

}
