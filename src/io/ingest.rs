//! CSV ingest and normalization.
//!
//! This module turns an observation CSV into a clean [`ObservationSet`] that is
//! safe to hand to the engine.
//!
//! Design goals:
//! - **Strict schema** for the configured columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Domain filters** (distance/value windows) applied here, never in the core
//! - **Deterministic behavior**: row order is preserved

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Observation, ObservationSet, SkyPosition};
use crate::error::{AppError, EngineError};

/// Which CSV columns hold which field. Names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMap {
    pub longitude: String,
    pub latitude: Option<String>,
    pub distance: String,
    pub value: String,
    pub error: Option<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            longitude: "ra".to_string(),
            latitude: Some("dec".to_string()),
            distance: "z".to_string(),
            value: "mu".to_string(),
            error: None,
        }
    }
}

/// Inclusive domain windows; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IngestFilters {
    pub distance_min: Option<f64>,
    pub distance_max: Option<f64>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
}

impl IngestFilters {
    fn keeps(&self, obs: &Observation) -> bool {
        let within = |v: f64, lo: Option<f64>, hi: Option<f64>| {
            lo.is_none_or(|lo| v >= lo) && hi.is_none_or(|hi| v <= hi)
        };
        within(obs.distance, self.distance_min, self.distance_max)
            && within(obs.value, self.value_min, self.value_max)
    }
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Summary stats about the observations actually kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub n_points: usize,
    pub distance_min: f64,
    pub distance_max: f64,
    pub value_min: f64,
    pub value_max: f64,
    pub has_latitude: bool,
    pub has_errors: bool,
}

impl DatasetStats {
    pub fn from_set(set: &ObservationSet) -> Option<Self> {
        if set.is_empty() {
            return None;
        }
        let obs = set.observations();
        let fold = |f: fn(&Observation) -> f64| {
            obs.iter()
                .map(f)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
        };
        let (distance_min, distance_max) = fold(|o| o.distance);
        let (value_min, value_max) = fold(|o| o.value);
        Some(Self {
            n_points: set.len(),
            distance_min,
            distance_max,
            value_min,
            value_max,
            has_latitude: set.has_latitudes(),
            has_errors: obs.iter().all(|o| o.error.is_some()),
        })
    }
}

/// Ingest output: observations + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub set: ObservationSet,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_filtered: usize,
    pub rows_used: usize,
}

impl IngestedData {
    /// Wrap an in-memory set (e.g. synthetic data) as if it had been ingested.
    pub fn from_set(set: ObservationSet) -> Result<Self, EngineError> {
        let stats = DatasetStats::from_set(&set).ok_or(EngineError::EmptyAfterFiltering)?;
        let n = set.len();
        Ok(Self {
            set,
            stats,
            row_errors: Vec::new(),
            rows_read: n,
            rows_filtered: 0,
            rows_used: n,
        })
    }
}

/// Load observations from a CSV file.
pub fn load_observations(
    path: &Path,
    columns: &ColumnMap,
    filters: &IngestFilters,
) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    info!(path = %path.display(), "reading observations");
    read_observations(file, columns, filters)
}

/// Parse observations from any CSV reader.
pub fn read_observations<R: Read>(
    input: R,
    columns: &ColumnMap,
    filters: &IngestFilters,
) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let resolved = ResolvedColumns::resolve(columns, &header_map)?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_filtered = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError { line, message: format!("CSV parse error: {e}") });
                continue;
            }
        };

        match parse_row(&record, &resolved) {
            Ok(obs) if filters.keeps(&obs) => observations.push(obs),
            Ok(_) => rows_filtered += 1,
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    for err in &row_errors {
        debug!(line = err.line, message = %err.message, "rejected row");
    }
    if !row_errors.is_empty() {
        warn!(rejected = row_errors.len(), rows_read, "some CSV rows were rejected");
    }

    let set = ObservationSet::new(observations);
    let stats = DatasetStats::from_set(&set).ok_or(EngineError::EmptyAfterFiltering)?;
    let rows_used = set.len();
    info!(rows_read, rows_used, rows_filtered, "ingest complete");

    Ok(IngestedData {
        set,
        stats,
        row_errors,
        rows_read,
        rows_filtered,
        rows_used,
    })
}

/// Column indices after matching the configured names against the header.
struct ResolvedColumns {
    longitude: usize,
    latitude: Option<usize>,
    distance: usize,
    value: usize,
    error: Option<usize>,
}

impl ResolvedColumns {
    fn resolve(columns: &ColumnMap, header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        let find = |name: &str| {
            header_map
                .get(&normalize_header_name(name))
                .copied()
                .ok_or_else(|| AppError::new(2, format!("Missing required column: `{name}`")))
        };
        Ok(Self {
            longitude: find(&columns.longitude)?,
            latitude: columns.latitude.as_deref().map(find).transpose()?,
            distance: find(&columns.distance)?,
            value: find(&columns.value)?,
            error: columns.error.as_deref().map(find).transpose()?,
        })
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, cols: &ResolvedColumns) -> Result<Observation, String> {
    let lon = parse_f64(record, cols.longitude, "longitude")?;
    let lat = cols
        .latitude
        .map(|idx| parse_f64(record, idx, "latitude"))
        .transpose()?;
    let distance = parse_f64(record, cols.distance, "distance")?;
    let value = parse_f64(record, cols.value, "value")?;
    let error = cols.error.map(|idx| parse_f64(record, idx, "error")).transpose()?;
    if let Some(err) = error {
        if err <= 0.0 {
            return Err(format!("error {err} must be > 0"));
        }
    }

    let position = SkyPosition::new(lon, lat).map_err(|e| e.to_string())?;
    Ok(Observation { position, distance, value, error })
}

fn parse_f64(record: &StringRecord, idx: usize, field: &str) -> Result<f64, String> {
    let raw = record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing value for `{field}`"))?;
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{raw}' for `{field}`"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value '{raw}' for `{field}`"))
    }
}
