//! Persisted tables
//!
//! Window catalog, daily rollup and feature table are plain CSV files with a
//! header row and ISO-8601 UTC timestamps. Undefined values are empty fields.
//! Every written table can be accompanied by a JSON run manifest recording who
//! produced it, when, and with which configuration.

use crate::error::ComputeError;
use crate::types::{DaySummary, FeatureRow, TestWindow, Timestamp};
use crate::{FLUX_VERSION, PRODUCER_NAME};
use chrono::{NaiveDate, Utc};
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const WINDOW_COLUMNS: [&str; 8] = [
    "date",
    "group_id",
    "t_start_utc",
    "t_end_utc",
    "duration_s",
    "n_cmds",
    "uniq_hp",
    "hp_indices",
];

pub const DAY_COLUMNS: [&str; 9] = [
    "date",
    "month",
    "n_groups",
    "total_duration_s",
    "mean_duration_s",
    "total_duration_h",
    "first_test_utc",
    "last_test_utc",
    "n_cmds",
];

pub const FEATURE_COLUMNS: [&str; 24] = [
    "date",
    "month",
    "group_id",
    "hp",
    "state",
    "t_start_utc",
    "t_end_utc",
    "state_duration_s",
    "stiffness_raw_N_per_um",
    "stiffness_N_per_um",
    "stiff_ok",
    "n",
    "force_max",
    "force_min",
    "force_mean",
    "disp_ptp",
    "disp_max",
    "disp_min",
    "breakaway_time_utc",
    "breakaway_force_N",
    "breakaway_disp_um",
    "elevation_deg",
    "azimuth_deg",
    "in_band",
];

/// Default file name of the feature table
pub const FEATURES_FILE_NAME: &str = "breakaway_features.csv";

/// File name of the window catalog of a scanned date range
pub fn window_table_name(start: NaiveDate, end: NaiveDate) -> String {
    format!("groups_with_tests_status_{start}_to_{end}.csv")
}

/// File name of the daily rollup of a scanned date range
pub fn day_table_name(start: NaiveDate, end: NaiveDate) -> String {
    format!("days_with_tests_status_{start}_to_{end}.csv")
}

/// Flat CSV form of a [`TestWindow`]
///
/// `uniq_hp` holds the commanded actuator identifiers and `hp_indices` the
/// monitored 0-based hardpoints, both comma-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub date: NaiveDate,
    pub group_id: u32,
    pub t_start_utc: Timestamp,
    pub t_end_utc: Timestamp,
    pub duration_s: f64,
    pub n_cmds: usize,
    pub uniq_hp: String,
    pub hp_indices: String,
}

impl From<&TestWindow> for WindowRecord {
    fn from(window: &TestWindow) -> Self {
        Self {
            date: window.date,
            group_id: window.group_id,
            t_start_utc: window.t_start,
            t_end_utc: window.t_end,
            duration_s: window.duration_s(),
            n_cmds: window.n_cmds,
            uniq_hp: join_list(&window.commanded_actuators),
            hp_indices: join_list(&window.actuator_indices),
        }
    }
}

impl WindowRecord {
    fn into_window(self, path: &Path) -> Result<TestWindow, ComputeError> {
        let malformed = |message: String| ComputeError::MalformedRecord {
            path: path.to_path_buf(),
            message,
        };
        Ok(TestWindow {
            group_id: self.group_id,
            date: self.date,
            t_start: self.t_start_utc,
            t_end: self.t_end_utc,
            actuator_indices: parse_list(&self.hp_indices)
                .map_err(|e| malformed(format!("group {}: hp_indices: {e}", self.group_id)))?,
            commanded_actuators: parse_list(&self.uniq_hp)
                .map_err(|e| malformed(format!("group {}: uniq_hp: {e}", self.group_id)))?,
            n_cmds: self.n_cmds,
        })
    }
}

fn join_list<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_list<T: std::str::FromStr>(raw: &str) -> Result<Vec<T>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|_| format!("'{s}' is not a valid entry")))
        .collect()
}

pub fn write_windows(path: &Path, windows: &[TestWindow]) -> Result<(), ComputeError> {
    write_table(path, &WINDOW_COLUMNS, windows.iter().map(WindowRecord::from))
}

pub fn read_windows(path: &Path) -> Result<Vec<TestWindow>, ComputeError> {
    read_table::<WindowRecord>(path, &WINDOW_COLUMNS)?
        .into_iter()
        .map(|record| record.into_window(path))
        .collect()
}

pub fn write_days(path: &Path, days: &[DaySummary]) -> Result<(), ComputeError> {
    write_table(path, &DAY_COLUMNS, days)
}

pub fn read_days(path: &Path) -> Result<Vec<DaySummary>, ComputeError> {
    read_table(path, &DAY_COLUMNS)
}

pub fn write_features(path: &Path, rows: &[FeatureRow]) -> Result<(), ComputeError> {
    write_table(path, &FEATURE_COLUMNS, rows)
}

/// Read a feature table; every column (notably `in_band`) is required
pub fn read_features(path: &Path) -> Result<Vec<FeatureRow>, ComputeError> {
    read_table(path, &FEATURE_COLUMNS)
}

/// Write a header row followed by one serialized row per record.
///
/// The header is written explicitly so that an empty table still has one.
pub fn write_table<T: Serialize>(
    path: &Path,
    columns: &[&str],
    records: impl IntoIterator<Item = T>,
) -> Result<(), ComputeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(columns)?;
    let mut rows = 0;
    for record in records {
        writer.serialize(record)?;
        rows += 1;
    }
    writer.flush()?;
    info!("wrote {rows} rows to {}", path.display());
    Ok(())
}

/// Deserialize every row after checking that the required columns exist
pub fn read_table<T: DeserializeOwned>(
    path: &Path,
    required: &[&str],
) -> Result<Vec<T>, ComputeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if let Some(missing) = required.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(ComputeError::missing_column(
            path.display().to_string(),
            missing,
        ));
    }
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Producer of a persisted table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestProducer {
    pub name: String,
    pub version: String,
}

/// Provenance of one written table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub producer: ManifestProducer,
    /// Random identifier of the run (UUID v4)
    pub run_id: String,
    pub computed_at_utc: String,
    /// File name of the table this manifest describes
    pub table: String,
    pub rows: usize,
    /// Configuration in force when the table was computed
    pub config: serde_json::Value,
}

impl RunManifest {
    pub fn new(table: &Path, rows: usize, config: &impl Serialize) -> Result<Self, ComputeError> {
        Ok(Self {
            producer: ManifestProducer {
                name: PRODUCER_NAME.to_string(),
                version: FLUX_VERSION.to_string(),
            },
            run_id: Uuid::new_v4().to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
            table: table
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            rows,
            config: serde_json::to_value(config)?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `<dir>/<table stem>.manifest.json`
pub fn manifest_path(table: &Path) -> PathBuf {
    table.with_extension("manifest.json")
}

/// Write the manifest of a freshly written table next to it
pub fn write_manifest(
    table: &Path,
    rows: usize,
    config: &impl Serialize,
) -> Result<RunManifest, ComputeError> {
    let manifest = RunManifest::new(table, rows, config)?;
    std::fs::write(manifest_path(table), manifest.to_json()?)?;
    Ok(manifest)
}

pub fn read_manifest(table: &Path) -> Result<RunManifest, ComputeError> {
    let json = std::fs::read_to_string(manifest_path(table))?;
    RunManifest::from_json(&json)
}
