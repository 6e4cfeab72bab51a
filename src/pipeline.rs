//! Pipeline orchestration
//!
//! This module provides the public API for Hardpoint Flux.
//! It runs window scan → feature extraction → acceptance statistics, with
//! each stage's tables cached in an output directory.

use crate::config::PipelineConfig;
use crate::error::ComputeError;
use crate::features::FeatureExtractor;
use crate::report::StatsReport;
use crate::scanner::{ScanResult, WindowScanner};
use crate::store;
use crate::telemetry::TelemetrySource;
use crate::types::{FeatureRow, TestWindow, Timestamp};
use chrono::{NaiveDate, Utc};
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Run the whole pipeline over a date range and write every table.
///
/// # Arguments
/// * `source` - Telemetry query service
/// * `config` - Thresholds of every stage
/// * `out_dir` - Directory receiving tables, manifests and reports
/// * `start` - First UTC day scanned
/// * `end` - Last UTC day scanned; today when `None`
///
/// # Returns
/// The window catalog, the feature rows and the acceptance statistics
///
/// # Example
/// ```ignore
/// let output = run_hardpoint_pipeline(
///     CsvDirectorySource::new("efd_export"),
///     PipelineConfig::default(),
///     "out",
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     None,
/// )?;
/// ```
pub fn run_hardpoint_pipeline<S: TelemetrySource>(
    source: S,
    config: PipelineConfig,
    out_dir: impl Into<PathBuf>,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<PipelineOutput, ComputeError> {
    HardpointPipeline::new(source, config, out_dir)?.run(start, end)
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub scan: ScanResult,
    pub features: Vec<FeatureRow>,
    pub report: StatsReport,
}

/// Pipeline bound to a telemetry source and an output directory.
///
/// Stage outputs already present in the directory are loaded instead of
/// recomputed unless overwrite is requested.
pub struct HardpointPipeline<S> {
    source: S,
    config: PipelineConfig,
    out_dir: PathBuf,
    overwrite: bool,
    features_file: String,
}

impl<S: TelemetrySource> HardpointPipeline<S> {
    /// Create a pipeline; the configuration is validated here
    pub fn new(
        source: S,
        config: PipelineConfig,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            out_dir: out_dir.into(),
            overwrite: false,
            features_file: store::FEATURES_FILE_NAME.to_string(),
        })
    }

    /// Recompute stages even when their tables exist
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Use another file name for the feature table
    pub fn with_features_file(mut self, name: impl Into<String>) -> Self {
        self.features_file = name.into();
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn features_path(&self) -> PathBuf {
        self.out_dir.join(&self.features_file)
    }

    /// Scan whole UTC days for test windows (end defaults to today)
    pub fn scan_windows(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<ScanResult, ComputeError> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        fs::create_dir_all(&self.out_dir)?;
        let windows_path = self.out_dir.join(store::window_table_name(start, end));
        let days_path = self.out_dir.join(store::day_table_name(start, end));

        if !self.overwrite && windows_path.exists() && days_path.exists() {
            info!("loading cached scan from {}", windows_path.display());
            return Ok(ScanResult {
                windows: store::read_windows(&windows_path)?,
                days: store::read_days(&days_path)?,
            });
        }

        let scanner = WindowScanner::new(&self.source, self.config.scan.clone());
        let result = scanner.scan_days(start, end)?;

        store::write_windows(&windows_path, &result.windows)?;
        store::write_manifest(&windows_path, result.windows.len(), &self.config.scan)?;
        store::write_days(&days_path, &result.days)?;
        store::write_manifest(&days_path, result.days.len(), &self.config.scan)?;
        Ok(result)
    }

    /// Feature rows of the given windows, or the cached feature table
    pub fn extract_features(&self, windows: &[TestWindow]) -> Result<Vec<FeatureRow>, ComputeError> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.features_path();
        if !self.overwrite && path.exists() {
            info!("loading cached features from {}", path.display());
            let rows = store::read_features(&path)?;
            if !rows_match_windows(&rows, windows) {
                warn!(
                    "cached features in {} were computed for other windows; \
                     pass overwrite to recompute",
                    path.display()
                );
            }
            return Ok(rows);
        }

        let extractor = FeatureExtractor::new(&self.source, self.config.features.clone());
        let rows = extractor.extract(windows);

        store::write_features(&path, &rows)?;
        store::write_manifest(&path, rows.len(), &self.config.features)?;
        Ok(rows)
    }

    /// Acceptance statistics of a classified feature table, written to the
    /// output directory
    pub fn report(&self, rows: &[FeatureRow]) -> Result<StatsReport, ComputeError> {
        fs::create_dir_all(&self.out_dir)?;
        let report = StatsReport::from_rows(rows);
        report.write_to_dir(&self.out_dir)?;
        Ok(report)
    }

    /// Scan, extract and report in one go
    pub fn run(&self, start: NaiveDate, end: Option<NaiveDate>) -> Result<PipelineOutput, ComputeError> {
        let scan = self.scan_windows(start, end)?;
        let features = self.extract_features(&scan.windows)?;
        let report = self.report(&features)?;
        Ok(PipelineOutput {
            scan,
            features,
            report,
        })
    }
}

/// Whether every row belongs to one of `windows`, matched on group id and
/// window bounds
pub fn rows_match_windows(rows: &[FeatureRow], windows: &[TestWindow]) -> bool {
    let known: HashSet<(u32, Timestamp, Timestamp)> = windows
        .iter()
        .map(|w| (w.group_id, w.t_start, w.t_end))
        .collect();
    rows.iter()
        .all(|r| known.contains(&(r.group_id, r.t_start_utc, r.t_end_utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::M_TO_UM;
    use crate::telemetry::{topics, MemorySource, RawTable};
    use crate::types::{HardpointTest, N_HARDPOINTS};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(sec: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(sec)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// One breakaway test of hardpoint 2 commanded at 10:00:00.
    fn synthetic_test() -> MemorySource {
        let commands = RawTable::from_rows(
            &[topics::COMMAND_ACTUATOR_FIELD],
            vec![(t(0), vec![Some(2.0)])],
        );

        let status_fields = topics::status_fields();
        let refs: Vec<&str> = status_fields.iter().map(String::as_str).collect();
        let rows = [(-60, 1.0), (1, 2.0), (11, 3.0), (41, 4.0), (71, 6.0)].map(|(s, code)| {
            let mut values = vec![Some(1.0); N_HARDPOINTS];
            values[1] = Some(code);
            (t(s), values)
        });
        let status = RawTable::from_rows(&refs, rows);

        let actuator_fields = [topics::force_field(1), topics::displacement_field(1)];
        let refs: Vec<&str> = actuator_fields.iter().map(String::as_str).collect();
        let actuators = RawTable::from_rows(
            &refs,
            (0..=90).map(|s| {
                let disp_um = match s {
                    s if s < 11 => 0.0,
                    s if s < 31 => 0.5 * (s - 11) as f64,
                    s => 10.0 + 5.0 * (s - 31) as f64,
                };
                let force = if s < 31 { 4.0 * disp_um } else { 3500.0 };
                (t(s), vec![Some(force), Some(disp_um / M_TO_UM)])
            }),
        );

        MemorySource::new()
            .with_topic(topics::COMMAND_TOPIC, commands)
            .with_topic(topics::STATUS_TOPIC, status)
            .with_topic(topics::ACTUATOR_TOPIC, actuators)
    }

    #[test]
    fn test_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_hardpoint_pipeline(
            synthetic_test(),
            PipelineConfig::default(),
            dir.path(),
            day(),
            Some(day()),
        )
        .unwrap();

        assert_eq!(output.scan.windows.len(), 1);
        let window = &output.scan.windows[0];
        assert_eq!(window.t_start, t(1));
        assert_eq!(window.t_end, t(80));
        assert_eq!(window.actuator_indices, vec![1]);
        assert_eq!(output.scan.days.len(), 1);

        let states: Vec<HardpointTest> = output.features.iter().map(|r| r.state).collect();
        assert_eq!(states, HardpointTest::TEST_PHASES.to_vec());
        let positive = &output.features[1];
        assert_eq!(positive.hp, 2);
        assert_eq!(positive.breakaway_time_utc, Some(t(32)));
        assert!(positive.in_band);
        assert!(positive.stiff_ok);
        assert!((positive.stiffness.unwrap() - 4.0).abs() < 1e-6);

        let by_hp = &output.report.outside_points_by_hp;
        assert_eq!(by_hp.len(), 1);
        assert_eq!((by_hp[0].hp, by_hp[0].n_total, by_hp[0].n_outside), (2, 3, 1));

        for name in [
            store::window_table_name(day(), day()),
            store::day_table_name(day(), day()),
            store::FEATURES_FILE_NAME.to_string(),
            crate::report::OUTSIDE_DAYS_BY_YEAR_FILE.to_string(),
        ] {
            assert!(dir.path().join(name).exists());
        }
        assert!(store::read_manifest(&dir.path().join(store::FEATURES_FILE_NAME)).is_ok());
    }

    #[test]
    fn test_cached_tables_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first = HardpointPipeline::new(synthetic_test(), PipelineConfig::default(), dir.path())
            .unwrap()
            .run(day(), Some(day()))
            .unwrap();

        // no telemetry at all: everything must come from the cache
        let cached = HardpointPipeline::new(MemorySource::new(), PipelineConfig::default(), dir.path())
            .unwrap()
            .run(day(), Some(day()))
            .unwrap();
        assert_eq!(cached.scan, first.scan);
        assert_eq!(cached.features, first.features);

        let recomputed = HardpointPipeline::new(MemorySource::new(), PipelineConfig::default(), dir.path())
            .unwrap()
            .with_overwrite(true)
            .run(day(), Some(day()))
            .unwrap();
        assert!(recomputed.scan.windows.is_empty());
        assert!(recomputed.features.is_empty());
    }

    #[test]
    fn test_cached_features_of_other_windows_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let first = run_hardpoint_pipeline(
            synthetic_test(),
            PipelineConfig::default(),
            dir.path(),
            day(),
            Some(day()),
        )
        .unwrap();
        assert!(rows_match_windows(&first.features, &first.scan.windows));
        assert!(rows_match_windows(&[], &[]));

        // a later run over windows the cache was not computed for
        let mut moved = first.scan.windows.clone();
        moved[0].t_end = moved[0].t_end + Duration::seconds(5);
        assert!(!rows_match_windows(&first.features, &moved));
        assert!(!rows_match_windows(&first.features, &[]));

        // the cached table is still returned unchanged
        let pipeline = HardpointPipeline::new(MemorySource::new(), PipelineConfig::default(), dir.path())
            .unwrap();
        assert_eq!(pipeline.extract_features(&moved).unwrap(), first.features);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.scan.chunk_days = 0;
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HardpointPipeline::new(MemorySource::new(), config, dir.path()),
            Err(ComputeError::InvalidConfig(_))
        ));

        let mut config = PipelineConfig::default();
        config.scan.max_duration_s = 1e300;
        assert!(matches!(
            run_hardpoint_pipeline(synthetic_test(), config, dir.path(), day(), Some(day())),
            Err(ComputeError::InvalidConfig(_))
        ));
    }
}
