//! Core types for the Hardpoint Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: typed telemetry series, detected test windows, state segments and
//! the per-phase feature records.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// UTC instant used for every sample and boundary
pub type Timestamp = DateTime<Utc>;

/// Number of hardpoint actuators on the mirror support
pub const N_HARDPOINTS: usize = 6;

/// Seconds in a (possibly sub-second) duration
pub fn duration_secs(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

/// Ordered sequence of (timestamp, value) samples.
///
/// The index is strictly increasing: construction sorts samples and keeps the
/// last value when several share a timestamp. An empty series is valid
/// everywhere and every operation propagates emptiness.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    times: Vec<Timestamp>,
    values: Vec<T>,
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> TimeSeries<T> {
    /// Create an empty series
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalized series from unordered samples
    pub fn from_samples(samples: impl IntoIterator<Item = (Timestamp, T)>) -> Self {
        let mut samples: Vec<(Timestamp, T)> = samples.into_iter().collect();
        // stable: among equal timestamps the last pushed sample ends up last
        samples.sort_by_key(|(t, _)| *t);

        let mut series = Self {
            times: Vec::with_capacity(samples.len()),
            values: Vec::with_capacity(samples.len()),
        };
        for (t, v) in samples {
            if series.times.last() == Some(&t) {
                if let Some(last) = series.values.last_mut() {
                    *last = v;
                }
                continue;
            }
            series.times.push(t);
            series.values.push(v);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<(Timestamp, &T)> {
        Some((*self.times.get(index)?, self.values.get(index)?))
    }

    pub fn first_time(&self) -> Option<Timestamp> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.times.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> + '_ {
        self.times.iter().copied().zip(self.values.iter())
    }

    /// Position of the first sample at or after `t`
    pub fn first_index_at_or_after(&self, t: Timestamp) -> Option<usize> {
        let pos = self.times.partition_point(|&x| x < t);
        (pos < self.times.len()).then_some(pos)
    }

    /// Value of the last sample at or before `t` (forward fill)
    pub fn value_at_or_before(&self, t: Timestamp) -> Option<&T> {
        let pos = self.times.partition_point(|&x| x <= t);
        pos.checked_sub(1).and_then(|i| self.values.get(i))
    }
}

impl<T: Clone> TimeSeries<T> {
    /// Samples within the closed interval `[t0, t1]`
    pub fn between(&self, t0: Timestamp, t1: Timestamp) -> Self {
        if t1 < t0 {
            return Self::new();
        }
        let lo = self.times.partition_point(|&x| x < t0);
        let hi = self.times.partition_point(|&x| x <= t1);
        Self {
            times: self.times[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// Keep samples whose mapped value is present
    pub fn filter_map<U>(&self, f: impl Fn(&T) -> Option<U>) -> TimeSeries<U> {
        let mut out = TimeSeries::new();
        for (t, v) in self.iter() {
            if let Some(u) = f(v) {
                out.times.push(t);
                out.values.push(u);
            }
        }
        out
    }
}

/// Hardpoint test state codes reported by the mirror support controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HardpointTest {
    NotTested,
    MovingNegative,
    TestingPositive,
    TestingNegative,
    MovingReference,
    Passed,
    Failed,
}

impl HardpointTest {
    /// Phases exercised during a breakaway test, in enumeration order
    pub const TEST_PHASES: [HardpointTest; 3] = [
        HardpointTest::MovingNegative,
        HardpointTest::TestingPositive,
        HardpointTest::TestingNegative,
    ];

    pub fn code(&self) -> i64 {
        match self {
            HardpointTest::NotTested => 1,
            HardpointTest::MovingNegative => 2,
            HardpointTest::TestingPositive => 3,
            HardpointTest::TestingNegative => 4,
            HardpointTest::MovingReference => 5,
            HardpointTest::Passed => 6,
            HardpointTest::Failed => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(HardpointTest::NotTested),
            2 => Some(HardpointTest::MovingNegative),
            3 => Some(HardpointTest::TestingPositive),
            4 => Some(HardpointTest::TestingNegative),
            5 => Some(HardpointTest::MovingReference),
            6 => Some(HardpointTest::Passed),
            7 => Some(HardpointTest::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HardpointTest::NotTested => "NOTTESTED",
            HardpointTest::MovingNegative => "MOVINGNEGATIVE",
            HardpointTest::TestingPositive => "TESTINGPOSITIVE",
            HardpointTest::TestingNegative => "TESTINGNEGATIVE",
            HardpointTest::MovingReference => "MOVINGREFERENCE",
            HardpointTest::Passed => "PASSED",
            HardpointTest::Failed => "FAILED",
        }
    }
}

/// One `testHardpoint` command as seen on the command topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub time: Timestamp,
    /// 1-based actuator identifier, if the command carried one
    pub actuator: Option<i64>,
}

/// Per-hardpoint test state telemetry.
///
/// `index` holds every sample time of the status topic; each channel holds the
/// state codes of one hardpoint (`None` where the sample had no value). A
/// channel is `None` when the topic did not carry it at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardpointStatus {
    pub index: Vec<Timestamp>,
    pub channels: [Option<TimeSeries<Option<i64>>>; N_HARDPOINTS],
}

impl HardpointStatus {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// State channel of a 0-based hardpoint index
    pub fn channel(&self, hp_index: usize) -> Option<&TimeSeries<Option<i64>>> {
        self.channels.get(hp_index).and_then(|c| c.as_ref())
    }
}

/// One force/displacement sample of a hardpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceDisplacement {
    /// Measured force (N)
    pub force: f64,
    /// Displacement (µm)
    pub displacement: f64,
}

/// Force/displacement curves of all hardpoints over a query range.
///
/// A curve only contains samples where both force and displacement are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActuatorData {
    pub curves: [Option<TimeSeries<ForceDisplacement>>; N_HARDPOINTS],
}

impl ActuatorData {
    pub fn is_empty(&self) -> bool {
        self.curves
            .iter()
            .all(|c| c.as_ref().map_or(true, |s| s.is_empty()))
    }

    pub fn curve(&self, hp_index: usize) -> Option<&TimeSeries<ForceDisplacement>> {
        self.curves.get(hp_index).and_then(|c| c.as_ref())
    }
}

/// Mount axis whose position is sampled during a test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountAxis {
    Elevation,
    Azimuth,
}

/// Detected test execution window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestWindow {
    pub group_id: u32,
    /// Calendar day (UTC) of the window start
    pub date: NaiveDate,
    pub t_start: Timestamp,
    pub t_end: Timestamp,
    /// Monitored hardpoints, 0-based and ascending
    pub actuator_indices: Vec<usize>,
    /// Actuator identifiers as commanded (1-based, unfiltered)
    pub commanded_actuators: Vec<i64>,
    /// Number of commands in the originating burst
    pub n_cmds: usize,
}

impl TestWindow {
    pub fn duration_s(&self) -> f64 {
        duration_secs(self.t_end - self.t_start)
    }
}

/// Per-day rollup of the window catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub month: String,
    pub n_groups: usize,
    pub total_duration_s: f64,
    pub mean_duration_s: f64,
    pub total_duration_h: f64,
    pub first_test_utc: Timestamp,
    pub last_test_utc: Timestamp,
    pub n_cmds: usize,
}

/// Contiguous stretch of one state code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSegment {
    pub start: Timestamp,
    pub end: Timestamp,
    pub state_code: i64,
}

impl StateSegment {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Basic force/displacement statistics of a phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveStats {
    pub n: usize,
    pub force_max: Option<f64>,
    pub force_min: Option<f64>,
    pub force_mean: Option<f64>,
    pub disp_ptp: Option<f64>,
    pub disp_max: Option<f64>,
    pub disp_min: Option<f64>,
}

/// Features of one (window, hardpoint, phase)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub month: String,
    pub group_id: u32,
    /// 1-based hardpoint number
    pub hp: u8,
    pub state: HardpointTest,
    pub t_start_utc: Timestamp,
    pub t_end_utc: Timestamp,
    pub state_duration_s: f64,
    #[serde(rename = "stiffness_raw_N_per_um")]
    pub stiffness_raw: Option<f64>,
    #[serde(rename = "stiffness_N_per_um")]
    pub stiffness: Option<f64>,
    pub stiff_ok: bool,
    pub n: usize,
    pub force_max: Option<f64>,
    pub force_min: Option<f64>,
    pub force_mean: Option<f64>,
    pub disp_ptp: Option<f64>,
    pub disp_max: Option<f64>,
    pub disp_min: Option<f64>,
    pub breakaway_time_utc: Option<Timestamp>,
    #[serde(rename = "breakaway_force_N")]
    pub breakaway_force: Option<f64>,
    #[serde(rename = "breakaway_disp_um")]
    pub breakaway_disp: Option<f64>,
    pub elevation_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub in_band: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(sec: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(sec as i64)
    }

    #[test]
    fn test_from_samples_sorts_and_keeps_last_duplicate() {
        let s = TimeSeries::from_samples(vec![(t(5), 'c'), (t(1), 'a'), (t(5), 'd'), (t(3), 'b')]);
        assert_eq!(s.times(), &[t(1), t(3), t(5)]);
        assert_eq!(s.values(), &['a', 'b', 'd']);
    }

    #[test]
    fn test_between_is_inclusive() {
        let s = TimeSeries::from_samples((0..10).map(|i| (t(i), i)));
        let sub = s.between(t(2), t(4));
        assert_eq!(sub.values(), &[2, 3, 4]);
        assert!(s.between(t(5), t(4)).is_empty());
        assert!(TimeSeries::<u32>::new().between(t(0), t(9)).is_empty());
    }

    #[test]
    fn test_lookups() {
        let s = TimeSeries::from_samples(vec![(t(10), 1), (t(20), 2)]);
        assert_eq!(s.first_index_at_or_after(t(11)), Some(1));
        assert_eq!(s.first_index_at_or_after(t(10)), Some(0));
        assert_eq!(s.first_index_at_or_after(t(21)), None);
        assert_eq!(s.value_at_or_before(t(9)), None);
        assert_eq!(s.value_at_or_before(t(15)), Some(&1));
        assert_eq!(s.value_at_or_before(t(20)), Some(&2));
    }

    #[test]
    fn test_state_codes_round_trip() {
        for code in 1..=7 {
            let state = HardpointTest::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(HardpointTest::from_code(0), None);
        assert_eq!(HardpointTest::MovingNegative.as_str(), "MOVINGNEGATIVE");
        assert_eq!(
            serde_json::to_string(&HardpointTest::TestingNegative).unwrap(),
            "\"TESTINGNEGATIVE\""
        );
    }

    #[test]
    fn test_duration_secs() {
        assert_eq!(duration_secs(Duration::milliseconds(1500)), 1.5);
        assert_eq!(duration_secs(Duration::minutes(3)), 180.0);
    }
}
