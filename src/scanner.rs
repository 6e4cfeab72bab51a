//! Test window detection
//!
//! Finds when hardpoint tests actually ran by correlating command bursts with
//! the observed test state telemetry:
//! 1. Commands are grouped into bursts separated by quiet periods
//! 2. Each burst's first command is snapped onto the status sample index
//! 3. The end is the last instant any monitored hardpoint was in an active
//!    state, plus a settle buffer
//!
//! Long ranges are scanned in overlapping chunks; windows seen twice across a
//! chunk border are collapsed by their (start, end, hardpoints) key.

use crate::adapter::TelemetryAdapter;
use crate::config::ScanConfig;
use crate::error::ComputeError;
use crate::grouping::{group_by_gaps, summarize_groups, ChunkRanges, CommandGroup};
use crate::telemetry::TelemetrySource;
use crate::types::{DaySummary, HardpointStatus, TestWindow, TimeSeries, Timestamp};
use chrono::{Duration, DurationRound, NaiveDate, NaiveTime, TimeZone, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// First status sample time at or after `t_ref`
///
/// Returns `None` when the status is empty or `t_ref` is past its last sample.
pub fn align_to_status_index(status: &HardpointStatus, t_ref: Timestamp) -> Option<Timestamp> {
    let pos = status.index.partition_point(|&t| t < t_ref);
    status.index.get(pos).copied()
}

/// Estimate when test activity that began at `start` ended.
///
/// The monitored state channels are forward filled onto a uniform grid of
/// `config.resolution` covering `[start, start + max_duration]`; the result is
/// the last grid instant where any channel holds an active state, plus
/// `config.end_buffer`. Samples from `config.lookback` before the start seed
/// the fill. Returns `None` when no grid point is active or when the search
/// bounds fall outside the representable time range.
pub fn end_time_from_status(
    status: &HardpointStatus,
    start: Timestamp,
    hp_indices: &[usize],
    config: &ScanConfig,
) -> Option<Timestamp> {
    if status.is_empty() {
        return None;
    }
    let channels: Vec<&TimeSeries<Option<i64>>> = hp_indices
        .iter()
        .filter_map(|&i| status.channel(i))
        .collect();
    if channels.is_empty() {
        return None;
    }

    let search_from = start.checked_sub_signed(config.lookback())?;
    let search_to = start.checked_add_signed(config.max_duration())?;
    let lo = status.index.partition_point(|&t| t < search_from);
    let hi = status.index.partition_point(|&t| t <= search_to);
    if lo >= hi {
        return None;
    }

    let resolution = config.resolution();
    if resolution <= Duration::zero() {
        return None;
    }
    let grid_start = status.index[lo].duration_trunc(resolution).ok()?;
    let grid_end = status.index[hi - 1].duration_trunc(resolution).ok()?;

    let windowed: Vec<TimeSeries<i64>> = channels
        .iter()
        .map(|c| c.between(search_from, search_to).filter_map(|v| *v))
        .collect();
    let is_active = |t: Timestamp| {
        windowed.iter().any(|series| {
            series
                .value_at_or_before(t)
                .is_some_and(|state| config.active_states.contains(state))
        })
    };

    let mut last_active = None;
    let mut t = grid_start;
    while t <= grid_end {
        if t >= start && is_active(t) {
            last_active = Some(t);
        }
        let Some(next) = t.checked_add_signed(resolution) else {
            break;
        };
        t = next;
    }
    last_active.and_then(|t| t.checked_add_signed(config.end_buffer()))
}

/// `start_date 00:00:00` and `end_date 23:59:59`, UTC
pub fn day_bounds(start_date: NaiveDate, end_date: NaiveDate) -> (Timestamp, Timestamp) {
    let midnight = NaiveTime::default();
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(midnight);
    (
        Utc.from_utc_datetime(&start_date.and_time(midnight)),
        Utc.from_utc_datetime(&end_date.and_time(last_second)),
    )
}

/// Key that identifies a window regardless of which chunk produced it
type WindowKey = (Timestamp, Timestamp, Vec<usize>);

/// Turn command bursts into test windows using one chunk of status telemetry
pub fn windows_for_groups(
    status: &HardpointStatus,
    groups: &[CommandGroup],
    config: &ScanConfig,
) -> Vec<TestWindow> {
    let mut windows = Vec::new();
    for group in groups {
        let hp_indices = group.hp_indices();
        let Some(t0) = align_to_status_index(status, group.reference_time) else {
            debug!("group {} at {}: no status sample after it", group.group_id, group.reference_time);
            continue;
        };
        let Some(t1) = end_time_from_status(status, t0, &hp_indices, config) else {
            debug!("group {} at {t0}: no activity detected", group.group_id);
            continue;
        };
        if t1 <= t0 {
            continue;
        }
        windows.push(TestWindow {
            group_id: group.group_id,
            date: t0.date_naive(),
            t_start: t0,
            t_end: t1,
            actuator_indices: hp_indices,
            commanded_actuators: group.actuators.iter().copied().collect(),
            n_cmds: group.n_cmds,
        });
    }
    windows
}

/// Window catalog and its daily rollup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub windows: Vec<TestWindow>,
    pub days: Vec<DaySummary>,
}

/// Scanner producing the catalog of test windows over long time ranges
pub struct WindowScanner<S> {
    telemetry: TelemetryAdapter<S>,
    config: ScanConfig,
}

impl<S: TelemetrySource> WindowScanner<S> {
    pub fn new(source: S, config: ScanConfig) -> Self {
        Self {
            telemetry: TelemetryAdapter::new(source),
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan whole UTC days, `start_date 00:00:00` to `end_date 23:59:59`
    pub fn scan_days(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<ScanResult, ComputeError> {
        if end_date < start_date {
            return Err(ComputeError::InvalidDateRange(format!(
                "end date {end_date} is before start date {start_date}"
            )));
        }
        let (start, end) = day_bounds(start_date, end_date);
        let windows = self.scan_range(start, end);
        let days = summarize_days(&windows);
        Ok(ScanResult { windows, days })
    }

    /// Scan `[start, end]`; windows come back sorted by (date, start) and
    /// numbered from 0
    pub fn scan_range(&self, start: Timestamp, end: Timestamp) -> Vec<TestWindow> {
        info!("scanning hardpoint tests {start} -> {end}");

        let mut seen: HashSet<WindowKey> = HashSet::new();
        let mut windows = Vec::new();
        let chunks = ChunkRanges::days(
            start,
            end,
            self.config.chunk_days,
            self.config.overlap_hours,
        );
        for (chunk_start, chunk_end) in chunks {
            debug!("chunk {chunk_start} -> {chunk_end}");
            for window in self.scan_chunk(chunk_start, chunk_end) {
                let key = (window.t_start, window.t_end, window.actuator_indices.clone());
                if seen.insert(key) {
                    windows.push(window);
                }
            }
        }

        windows.sort_by(|a, b| (a.date, a.t_start).cmp(&(b.date, b.t_start)));
        for (i, window) in windows.iter_mut().enumerate() {
            window.group_id = i as u32;
        }
        info!("found {} test windows", windows.len());
        windows
    }

    fn scan_chunk(&self, chunk_start: Timestamp, chunk_end: Timestamp) -> Vec<TestWindow> {
        let commands = match self.telemetry.commands(chunk_start, chunk_end) {
            Ok(commands) if !commands.is_empty() => commands,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!("skipping chunk {chunk_start} -> {chunk_end}: {e}");
                return Vec::new();
            }
        };
        let status = match self.telemetry.status(chunk_start, chunk_end) {
            Ok(status) if !status.is_empty() => status,
            Ok(_) => {
                debug!("empty status data for chunk, skipping");
                return Vec::new();
            }
            Err(e) => {
                warn!("skipping chunk {chunk_start} -> {chunk_end}: {e}");
                return Vec::new();
            }
        };

        let grouped = group_by_gaps(&commands, self.config.group_gap());
        let groups = summarize_groups(&grouped);
        debug!("{} commands in {} groups", commands.len(), groups.len());
        windows_for_groups(&status, &groups, &self.config)
    }
}

/// Roll windows up per calendar day, ordered by date
pub fn summarize_days(windows: &[TestWindow]) -> Vec<DaySummary> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&TestWindow>> = BTreeMap::new();
    for window in windows {
        by_date.entry(window.date).or_default().push(window);
    }

    by_date
        .into_iter()
        .filter_map(|(date, day)| {
            let first_test_utc = day.iter().map(|w| w.t_start).min()?;
            let last_test_utc = day.iter().map(|w| w.t_end).max()?;
            let total_duration_s: f64 = day.iter().map(|w| w.duration_s()).sum();
            let groups: BTreeSet<u32> = day.iter().map(|w| w.group_id).collect();
            Some(DaySummary {
                date,
                month: date.format("%Y-%m").to_string(),
                n_groups: groups.len(),
                total_duration_s,
                mean_duration_s: total_duration_s / day.len() as f64,
                total_duration_h: total_duration_s / 3600.0,
                first_test_utc,
                last_test_utc,
                n_cmds: day.iter().map(|w| w.n_cmds).sum(),
            })
        })
        .collect()
}
