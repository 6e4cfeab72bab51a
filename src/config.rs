//! Pipeline configuration
//!
//! Every threshold of the scan and feature stages lives here and is injected
//! into the components when they are built. Durations are stored in seconds so
//! the whole configuration round-trips through JSON.

use crate::error::ComputeError;
use crate::types::HardpointTest;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Longest duration any scan or slicing setting may take (seconds)
pub const MAX_SETTING_S: f64 = 86_400.0;

/// Largest query chunk (days)
pub const MAX_CHUNK_DAYS: i64 = 366;

/// Convert fractional seconds to a chrono duration (millisecond precision),
/// saturating at the duration range
pub fn secs(seconds: f64) -> Duration {
    let ms = (seconds * 1000.0).round() as i64;
    Duration::try_milliseconds(ms).unwrap_or(if ms < 0 { Duration::MIN } else { Duration::MAX })
}

/// Window scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Chunk size of each telemetry query (days)
    pub chunk_days: i64,
    /// Overlap between consecutive chunks (hours)
    pub overlap_hours: i64,
    /// Quiet time that separates two command bursts (seconds)
    pub group_gap_s: f64,
    /// Longest test searched forward from its start (seconds)
    pub max_duration_s: f64,
    /// Resampling grid used to detect the end of activity (seconds)
    pub resolution_s: f64,
    /// Margin added after the last active instant (seconds)
    pub end_buffer_s: f64,
    /// Status history read before the start to seed the forward fill (seconds)
    pub lookback_s: f64,
    /// State codes that count as "test running"
    pub active_states: BTreeSet<i64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_days: 31,
            overlap_hours: 2,
            group_gap_s: 180.0,
            max_duration_s: 35.0 * 60.0,
            resolution_s: 1.0,
            end_buffer_s: 10.0,
            lookback_s: 5.0,
            active_states: HardpointTest::TEST_PHASES.iter().map(|s| s.code()).collect(),
        }
    }
}

impl ScanConfig {
    pub fn group_gap(&self) -> Duration {
        secs(self.group_gap_s)
    }

    pub fn max_duration(&self) -> Duration {
        secs(self.max_duration_s)
    }

    pub fn resolution(&self) -> Duration {
        secs(self.resolution_s)
    }

    pub fn end_buffer(&self) -> Duration {
        secs(self.end_buffer_s)
    }

    pub fn lookback(&self) -> Duration {
        secs(self.lookback_s)
    }
}

/// Stiffness fit and post-fit filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StiffnessConfig {
    /// Minimum samples in the phase curve before fitting
    pub min_samples: usize,
    /// Displacement magnitude kept for the fit (µm)
    pub fit_disp_um: f64,
    /// Samples taken on each side of the point nearest zero displacement
    pub points_around_zero: usize,
    /// Minimum samples in the fit window
    pub min_fit_points: usize,
    /// Raw values in `[neg_clamp, 0)` are clamped to zero (N/µm)
    pub neg_clamp: f64,
    /// Raw values above this are discarded (N/µm)
    pub max_abs: f64,
}

impl Default for StiffnessConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            fit_disp_um: 100.0,
            points_around_zero: 10,
            min_fit_points: 5,
            neg_clamp: -0.5,
            max_abs: 100.0,
        }
    }
}

/// Breakaway detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakawayConfig {
    /// Sample-to-sample displacement jump that counts as motion (µm)
    pub disp_threshold_um: f64,
    /// Consecutive jumps that confirm a breakaway
    pub min_run: usize,
}

impl Default for BreakawayConfig {
    fn default() -> Self {
        Self {
            disp_threshold_um: 1.0,
            min_run: 3,
        }
    }
}

/// Closed force interval (N)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceBand {
    pub lo: f64,
    pub hi: f64,
}

impl ForceBand {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, force: f64) -> bool {
        force >= self.lo && force <= self.hi
    }
}

/// Acceptance bands for the breakaway force
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub compression: ForceBand,
    pub tension: ForceBand,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            compression: ForceBand::new(2981.0, 3959.0),
            tension: ForceBand::new(-4420.0, -3456.0),
        }
    }
}

impl BandConfig {
    /// True iff the force is present, finite and inside either band
    pub fn classify(&self, force: Option<f64>) -> bool {
        match force {
            Some(f) if f.is_finite() => self.compression.contains(f) || self.tension.contains(f),
            _ => false,
        }
    }
}

/// Feature extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Phases extracted for every hardpoint, in output order
    pub phases: Vec<HardpointTest>,
    /// Phases whose stiffness may be flagged `stiff_ok`
    pub stiff_ok_phases: BTreeSet<HardpointTest>,
    /// Pad added around a phase segment when slicing curves (seconds)
    pub slice_pad_s: f64,
    /// Query mount elevation/azimuth for each window
    pub include_mount_angles: bool,
    pub stiffness: StiffnessConfig,
    pub breakaway: BreakawayConfig,
    pub bands: BandConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            phases: HardpointTest::TEST_PHASES.to_vec(),
            stiff_ok_phases: HardpointTest::TEST_PHASES.into_iter().collect(),
            slice_pad_s: 1.0,
            include_mount_angles: true,
            stiffness: StiffnessConfig::default(),
            breakaway: BreakawayConfig::default(),
            bands: BandConfig::default(),
        }
    }
}

impl FeatureConfig {
    pub fn slice_pad(&self) -> Duration {
        secs(self.slice_pad_s)
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scan: ScanConfig,
    pub features: FeatureConfig,
}

impl PipelineConfig {
    /// Load configuration from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings that would make a stage meaningless or non-terminating
    pub fn validate(&self) -> Result<(), ComputeError> {
        let scan = &self.scan;
        if !(1..=MAX_CHUNK_DAYS).contains(&scan.chunk_days) {
            return Err(invalid(&format!(
                "scan.chunk_days must be between 1 and {MAX_CHUNK_DAYS}"
            )));
        }
        if !(0..=MAX_CHUNK_DAYS * 24).contains(&scan.overlap_hours) {
            return Err(invalid("scan.overlap_hours must be between 0 and chunk range"));
        }
        for (name, value, allow_zero) in [
            ("scan.group_gap_s", scan.group_gap_s, true),
            ("scan.max_duration_s", scan.max_duration_s, false),
            ("scan.end_buffer_s", scan.end_buffer_s, true),
            ("scan.lookback_s", scan.lookback_s, true),
            ("features.slice_pad_s", self.features.slice_pad_s, true),
        ] {
            let above_min = if allow_zero { value >= 0.0 } else { value > 0.0 };
            if !(above_min && value <= MAX_SETTING_S) {
                return Err(invalid(&format!(
                    "{name} must be between 0 and {MAX_SETTING_S} s (got {value})"
                )));
            }
        }
        if !(scan.resolution_s <= MAX_SETTING_S && scan.resolution() >= Duration::milliseconds(1)) {
            return Err(invalid(
                "scan.resolution_s must be between one millisecond and one day",
            ));
        }
        if scan.active_states.is_empty() {
            return Err(invalid("scan.active_states must not be empty"));
        }

        let features = &self.features;
        if features.breakaway.min_run == 0 {
            return Err(invalid("features.breakaway.min_run must be at least 1"));
        }
        if features.stiffness.min_fit_points == 0 {
            return Err(invalid("features.stiffness.min_fit_points must be at least 1"));
        }
        if features.stiffness.neg_clamp > 0.0 || features.stiffness.max_abs <= 0.0 {
            return Err(invalid(
                "features.stiffness requires neg_clamp <= 0 and max_abs > 0",
            ));
        }
        for (name, band) in [
            ("compression", features.bands.compression),
            ("tension", features.bands.tension),
        ] {
            if !(band.lo <= band.hi) {
                return Err(invalid(&format!(
                    "features.bands.{name} has lo > hi ({} > {})",
                    band.lo, band.hi
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ComputeError {
    ComputeError::InvalidConfig(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.scan.group_gap(), Duration::minutes(3));
        assert_eq!(config.scan.max_duration(), Duration::minutes(35));
        assert_eq!(config.scan.resolution(), Duration::seconds(1));
        assert_eq!(config.scan.end_buffer(), Duration::seconds(10));
        assert_eq!(config.scan.chunk_days, 31);
        assert_eq!(config.scan.overlap_hours, 2);
        assert_eq!(config.scan.active_states, BTreeSet::from([2, 3, 4]));
        assert_eq!(config.features.stiffness.neg_clamp, -0.5);
        assert_eq!(config.features.stiffness.max_abs, 100.0);
        assert_eq!(config.features.breakaway.min_run, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"scan": {"chunk_days": 7}, "features": {"include_mount_angles": false}}"#,
        )
        .unwrap();
        assert_eq!(config.scan.chunk_days, 7);
        assert_eq!(config.scan.overlap_hours, 2);
        assert!(!config.features.include_mount_angles);
        assert_eq!(config.features.phases, HardpointTest::TEST_PHASES.to_vec());
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_inverted_band() {
        let mut config = PipelineConfig::default();
        config.features.bands.tension = ForceBand::new(-3000.0, -4000.0);
        assert!(matches!(
            config.validate(),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_resolution() {
        let mut config = PipelineConfig::default();
        config.scan.resolution_s = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unbounded_durations() {
        for json in [
            r#"{"scan": {"max_duration_s": 1e300}}"#,
            r#"{"scan": {"lookback_s": 86401}}"#,
            r#"{"scan": {"end_buffer_s": 1e20}}"#,
            r#"{"scan": {"resolution_s": -1e300}}"#,
            r#"{"scan": {"chunk_days": 100000000000000}}"#,
            r#"{"scan": {"overlap_hours": 9000}}"#,
            r#"{"features": {"slice_pad_s": 1e300}}"#,
        ] {
            assert!(
                matches!(PipelineConfig::from_json(json), Err(ComputeError::InvalidConfig(_))),
                "accepted {json}"
            );
        }

        let config = PipelineConfig::from_json(
            r#"{"scan": {"max_duration_s": 86400, "chunk_days": 366}}"#,
        )
        .unwrap();
        assert_eq!(config.scan.max_duration(), Duration::days(1));
    }

    #[test]
    fn test_secs_saturates() {
        assert_eq!(secs(1e300), Duration::MAX);
        assert_eq!(secs(-1e300), Duration::MIN);
        assert_eq!(secs(1.5), Duration::milliseconds(1500));
    }

    #[test]
    fn test_band_classification() {
        let bands = BandConfig::default();
        assert!(bands.classify(Some(3500.0)));
        assert!(bands.classify(Some(-4000.0)));
        assert!(bands.classify(Some(2981.0)));
        assert!(bands.classify(Some(-3456.0)));
        assert!(!bands.classify(Some(0.0)));
        assert!(!bands.classify(Some(f64::NAN)));
        assert!(!bands.classify(None));
    }
}
