//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and Monte Carlo trials
//! - exported to the JSON report
//! - shared read-only across worker threads (no interior mutability)

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::math::{circular_mean_std_deg, mean, population_std, percentile, wrap_deg};

/// Angular position of one observation, in degrees.
///
/// Single-angle datasets (e.g. right ascension only) leave `lat_deg` empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    /// Longitude-like angle, normalized to `[0, 360)`.
    pub lon_deg: f64,
    /// Latitude-like angle in `[-90, 90]`, if the dataset has one.
    pub lat_deg: Option<f64>,
}

impl SkyPosition {
    /// Build a normalized position.
    pub fn new(lon_deg: f64, lat_deg: Option<f64>) -> Result<Self, EngineError> {
        if !lon_deg.is_finite() {
            return Err(EngineError::invalid(format!("non-finite longitude {lon_deg}")));
        }
        if let Some(lat) = lat_deg {
            if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
                return Err(EngineError::invalid(format!(
                    "latitude {lat} outside [-90, 90]"
                )));
            }
        }
        Ok(Self {
            lon_deg: wrap_deg(lon_deg),
            lat_deg,
        })
    }
}

/// One data point handed over by an external loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub position: SkyPosition,
    /// Distance / redshift proxy. Must be `> 0` when a log baseline is used.
    pub distance: f64,
    /// The residual-bearing observable (magnitude, distance modulus, radius...).
    pub value: f64,
    /// Optional 1-sigma measurement uncertainty on `value`.
    pub error: Option<f64>,
}

/// An immutable, filtered collection of observations sharing one baseline relation.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn positions(&self) -> Vec<SkyPosition> {
        self.observations.iter().map(|o| o.position).collect()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.distance).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    /// Whether every observation carries a latitude.
    pub fn has_latitudes(&self) -> bool {
        self.observations.iter().all(|o| o.position.lat_deg.is_some())
    }

    /// Inverse-error weights (`1 / error`), if the dataset carries errors.
    ///
    /// Returns `Ok(None)` when no observation has an error. A dataset where only
    /// some rows have errors, or where an error is not finite and positive, is
    /// rejected rather than silently mixed with unit weights.
    pub fn inverse_error_weights(&self) -> Result<Option<Vec<f64>>, EngineError> {
        let with_err = self.observations.iter().filter(|o| o.error.is_some()).count();
        if with_err == 0 {
            return Ok(None);
        }
        if with_err != self.observations.len() {
            return Err(EngineError::invalid(format!(
                "{with_err} of {} observations carry an error; weights need all or none",
                self.observations.len()
            )));
        }
        let mut out = Vec::with_capacity(self.observations.len());
        for o in &self.observations {
            let err = o.error.unwrap_or(f64::NAN);
            if !(err.is_finite() && err > 0.0) {
                return Err(EngineError::invalid(format!("measurement error {err} must be > 0")));
            }
            out.push(1.0 / err);
        }
        Ok(Some(out))
    }

    /// Keep only the observations matching `keep`.
    pub fn filtered(&self, keep: impl Fn(&Observation) -> bool) -> ObservationSet {
        ObservationSet::new(self.observations.iter().filter(|o| keep(o)).cloned().collect())
    }
}

/// Zero-mean residuals aligned index-for-index with an [`ObservationSet`].
///
/// Never mutated after creation; permutation trials work on copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualSeries {
    values: Vec<f64>,
}

impl ResidualSeries {
    /// Wrap already-centered residuals. Crate-private so the zero-mean
    /// invariant is only established by [`crate::detrend`].
    pub(crate) fn from_centered(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    pub fn std(&self) -> f64 {
        population_std(&self.values)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.clone()
    }
}

/// Per-parameter `[lower, upper]` box constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl ParamBounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, EngineError> {
        if lower.len() != upper.len() {
            return Err(EngineError::invalid(format!(
                "bounds length mismatch: lower={} upper={}",
                lower.len(),
                upper.len()
            )));
        }
        for (i, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(EngineError::invalid(format!(
                    "bound {i} must be finite with lower <= upper (got [{lo}, {hi}])"
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Project a parameter vector onto the box.
    pub fn clamp(&self, params: &mut [f64]) {
        for (i, p) in params.iter_mut().enumerate() {
            *p = p.clamp(self.lower[i], self.upper[i]);
        }
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == self.len()
            && params
                .iter()
                .enumerate()
                .all(|(i, &p)| p >= self.lower[i] && p <= self.upper[i])
    }
}

/// Whether the model term is added to or subtracted from the residual prediction.
///
/// There is no default: different datasets apply opposite conventions to the
/// same functional form, and flipping it flips the sign of a correlation test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SignConvention {
    /// `predict = +term`.
    Additive,
    /// `predict = -term`.
    Subtractive,
}

impl SignConvention {
    pub fn factor(self) -> f64 {
        match self {
            SignConvention::Additive => 1.0,
            SignConvention::Subtractive => -1.0,
        }
    }
}

/// Role of a model parameter (drives default bounds and summary statistics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Amplitude,
    /// Periodic angle in degrees.
    Longitude,
    Latitude,
}

/// Directional model functional forms.
///
/// All angles are in degrees. Parameter vectors are laid out as listed in
/// [`ModelVariant::param_names`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelVariant {
    /// `sign · A · d · cos(θ − phase(d))`, `phase(d) = (L + frequency/d) mod 360`.
    ///
    /// Parameters: `[A, L]`. The frequency is a fixed hypothesis input.
    PrecessionPhase { frequency: f64, sign: SignConvention },
    /// `sign · A · d · cos γ`, where `γ` is the great-circle separation between
    /// the observation and the axis `(L, B)`.
    ///
    /// Parameters: `[A, L, B]`.
    StaticDipole { sign: SignConvention },
    /// `sign · A · cos(θ − L)` on a single angle, no distance scaling.
    ///
    /// Parameters: `[A, L]`.
    AxisCosine { sign: SignConvention },
}

impl ModelVariant {
    /// Human-readable label for terminal output.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelVariant::PrecessionPhase { .. } => "precession-phase",
            ModelVariant::StaticDipole { .. } => "static-dipole",
            ModelVariant::AxisCosine { .. } => "axis-cosine",
        }
    }

    pub fn sign(&self) -> SignConvention {
        match *self {
            ModelVariant::PrecessionPhase { sign, .. }
            | ModelVariant::StaticDipole { sign }
            | ModelVariant::AxisCosine { sign } => sign,
        }
    }

    /// Number of free parameters (used as `k` in information criteria).
    pub fn param_count(&self) -> usize {
        self.param_kinds().len()
    }

    pub fn param_kinds(&self) -> &'static [ParamKind] {
        match self {
            ModelVariant::PrecessionPhase { .. } | ModelVariant::AxisCosine { .. } => {
                &[ParamKind::Amplitude, ParamKind::Longitude]
            }
            ModelVariant::StaticDipole { .. } => {
                &[ParamKind::Amplitude, ParamKind::Longitude, ParamKind::Latitude]
            }
        }
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ModelVariant::PrecessionPhase { .. } | ModelVariant::AxisCosine { .. } => {
                &["amplitude", "axis_lon"]
            }
            ModelVariant::StaticDipole { .. } => &["amplitude", "axis_lon", "axis_lat"],
        }
    }

    /// Whether predictions need a latitude on every observation.
    pub fn requires_latitude(&self) -> bool {
        matches!(self, ModelVariant::StaticDipole { .. })
    }

    /// Default box: `A ∈ [0, max_amplitude]`, `L ∈ [0, 360]`, `B ∈ [-90, 90]`.
    pub fn default_bounds(&self, max_amplitude: f64) -> Result<ParamBounds, EngineError> {
        let (lower, upper): (Vec<f64>, Vec<f64>) = self
            .param_kinds()
            .iter()
            .map(|kind| match kind {
                ParamKind::Amplitude => (0.0, max_amplitude),
                ParamKind::Longitude => (0.0, 360.0),
                ParamKind::Latitude => (-90.0, 90.0),
            })
            .unzip();
        ParamBounds::new(lower, upper)
    }
}

/// A fitted parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub values: Vec<f64>,
}

impl ModelParameters {
    pub fn amplitude(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }
}

/// Output of a single bounded least-squares fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub params: ModelParameters,
    /// Weighted residual vector `w · (predict − residual)` at the optimum.
    pub residuals: Vec<f64>,
    /// `0.5 · Σ residuals²`.
    pub cost: f64,
    pub iterations: usize,
}

impl FitResult {
    /// Residual sum of squares (`2 · cost`).
    pub fn rss(&self) -> f64 {
        self.residuals.iter().map(|r| r * r).sum()
    }
}

/// Permutation null distribution of a test statistic.
///
/// Always complete: constructed only after every requested trial finished.
#[derive(Debug, Clone, PartialEq)]
pub struct NullDistribution {
    values: Vec<f64>,
}

impl NullDistribution {
    pub(crate) fn from_complete(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    /// Population standard deviation (`ddof = 0`).
    pub fn std(&self) -> f64 {
        population_std(&self.values)
    }

    /// Linear-interpolated percentile, `q ∈ [0, 100]`.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        percentile(&self.values, q)
    }

    /// Phipson–Smyth upper-tail p-value: `(#{null ≥ observed} + 1) / (N + 1)`.
    ///
    /// Never zero, even when the observed value exceeds every null draw.
    pub fn upper_tail_p_value(&self, observed: f64) -> f64 {
        let ge = self.values.iter().filter(|&&v| v >= observed).count() as f64;
        (ge + 1.0) / (self.values.len() as f64 + 1.0)
    }
}

/// Standardized distance of an observed statistic from its null distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignificanceResult {
    pub observed_statistic: f64,
    pub null_mean: f64,
    pub null_std: f64,
    /// `(observed − null_mean) / null_std`.
    pub sigma: f64,
    pub p_value: f64,
    pub trials: usize,
}

/// Spread of one parameter across stability trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub kind: ParamKind,
    /// Linear mean, or circular mean in `[0, 360)` for longitudes.
    pub mean: f64,
    /// Population std, or circular std in degrees for longitudes.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ParamSummary {
    pub(crate) fn from_samples(name: &str, kind: ParamKind, samples: &[f64]) -> Self {
        let (mean_v, std_v) = match kind {
            ParamKind::Longitude => circular_mean_std_deg(samples),
            ParamKind::Amplitude | ParamKind::Latitude => (mean(samples), population_std(samples)),
        };
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            name: name.to_string(),
            kind,
            mean: mean_v,
            std: std_v,
            min,
            max,
        }
    }

    /// Whether the trial spread is below a caller-chosen threshold.
    pub fn is_stable(&self, threshold: f64) -> bool {
        self.std < threshold
    }
}

/// Distribution of fitted parameters across sub-sample trials.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityReport {
    pub trials: Vec<ModelParameters>,
    pub summaries: Vec<ParamSummary>,
    pub fraction: f64,
    pub subsample_size: usize,
}

/// Which information criterion to compare models with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// `2k + n ln(RSS/n)`.
    Aic,
    /// `k ln n + n ln(RSS/n)`.
    Bic,
}

/// Information-criterion comparison of a directional model against the null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IcDelta {
    pub criterion: Criterion,
    pub directional: f64,
    pub null: f64,
    /// `directional − null`; more negative favours the directional model.
    pub delta: f64,
    pub n: usize,
    pub k: usize,
}

/// Which test statistic the significance engine permutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    /// Pearson r between residuals and the hypothesis prediction (initial params).
    Correlation,
    /// Fitted amplitude, refit on every permutation.
    Amplitude,
}
