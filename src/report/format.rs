//! Formatted terminal output for an analysis run.

use crate::app::pipeline::{AnalysisConfig, RunOutput};
use crate::domain::{ModelVariant, ParamKind, ParamSummary, StabilityReport};
use crate::io::ingest::IngestedData;

/// Format the full run summary (data + fit + significance + stability + IC).
pub fn format_run_summary(run: &RunOutput, config: &AnalysisConfig) -> String {
    let mut out = String::new();

    out.push_str("=== aniso - directional anisotropy audit ===\n");
    out.push_str(&format_model_line(&config.variant));
    out.push_str(&format_data(&run.data));
    out.push_str(&format!(
        "Residuals: n={} | std={:.4}{}\n",
        run.residuals.len(),
        run.residuals.std(),
        if run.weighted { " | weighted by 1/error" } else { "" }
    ));

    out.push_str("\nBest fit:\n");
    for (name, value) in config.variant.param_names().iter().zip(&run.fit.params.values) {
        out.push_str(&format!("- {name:<10} {value:>12.5}\n"));
    }
    out.push_str(&format!(
        "- cost={:.5} rss={:.5} iterations={}\n",
        run.fit.cost,
        run.fit.rss(),
        run.fit.iterations
    ));
    out.push_str(&format!("- axis offset from hypothesis: {:.2} deg\n", run.axis_offset_deg));

    let sig = &run.significance;
    out.push_str(&format!("\nSignificance ({:?}, {} permutations):\n", config.statistic, sig.trials));
    out.push_str(&format!("- observed  {:.6}\n", sig.observed_statistic));
    out.push_str(&format!("- null      mean={:.6} std={:.6}\n", sig.null_mean, sig.null_std));
    out.push_str(&format!("- sigma     {:.2}\n", sig.sigma));
    out.push_str(&format!("- p-value   {:.3e}\n", sig.p_value));
    if !run.null_percentiles.is_empty() {
        let pct: Vec<String> = run
            .null_percentiles
            .iter()
            .map(|(q, v)| format!("p{q:.0}={v:.4}"))
            .collect();
        out.push_str(&format!("- null      {}\n", pct.join(" ")));
    }
    if let Some(c) = run.correlation {
        out.push_str(&format!(
            "- hypothesis r={:.4} (r*sqrt(n) ~ {:.2} sigma)\n",
            c.r, c.quick_sigma
        ));
    }

    if let Some(stab) = &run.stability {
        out.push_str(&format_stability(stab, config.stability_threshold_deg));
    }

    let ic = &run.comparison;
    out.push_str(&format!("\nModel comparison ({:?}, k={}, n={}):\n", ic.criterion, ic.k, ic.n));
    out.push_str(&format!(
        "- directional={:.3} null={:.3} delta={:+.3}\n",
        ic.directional, ic.null, ic.delta
    ));
    out.push_str(&format!(
        "- {}\n",
        if ic.delta < 0.0 { "directional model preferred" } else { "isotropic null preferred" }
    ));

    out
}

fn format_model_line(variant: &ModelVariant) -> String {
    let extra = match variant {
        ModelVariant::PrecessionPhase { frequency, .. } => format!(" | frequency={frequency}"),
        ModelVariant::StaticDipole { .. } | ModelVariant::AxisCosine { .. } => String::new(),
    };
    format!(
        "Model: {} | sign={:?}{extra}\n",
        variant.display_name(),
        variant.sign()
    )
}

fn format_data(data: &IngestedData) -> String {
    let mut out = format!(
        "Points: n={} | distance=[{:.4}, {:.4}] | value=[{:.3}, {:.3}]\n",
        data.stats.n_points,
        data.stats.distance_min,
        data.stats.distance_max,
        data.stats.value_min,
        data.stats.value_max
    );
    if data.rows_read != data.rows_used {
        out.push_str(&format!(
            "Rows: read={} used={} filtered={} rejected={}\n",
            data.rows_read,
            data.rows_used,
            data.rows_filtered,
            data.row_errors.len()
        ));
    }
    out
}

/// Per-parameter stability table.
pub fn format_stability(report: &StabilityReport, threshold_deg: f64) -> String {
    let mut out = format!(
        "\nStability ({} trials, {:.0}% sub-samples of {}):\n",
        report.trials.len(),
        report.fraction * 100.0,
        report.subsample_size
    );
    out.push_str(
        format!("{:<10} {:>10} {:>10} {:>10} {:>10}", "param", "mean", "std", "min", "max").trim_end(),
    );
    out.push('\n');
    for s in &report.summaries {
        out.push_str(&format!(
            "{:<10} {:>10.4} {:>10.4} {:>10.4} {:>10.4}{}\n",
            s.name,
            s.mean,
            s.std,
            s.min,
            s.max,
            axis_verdict(s, threshold_deg)
        ));
    }
    out
}

fn axis_verdict(summary: &ParamSummary, threshold_deg: f64) -> &'static str {
    match summary.kind {
        ParamKind::Longitude | ParamKind::Latitude if summary.is_stable(threshold_deg) => "  stable",
        ParamKind::Longitude | ParamKind::Latitude => "  unstable",
        ParamKind::Amplitude => "",
    }
}
