//! Feature extraction
//!
//! This module turns each detected test window into one feature row per
//! (hardpoint, phase):
//! - Basic force/displacement statistics of the phase
//! - Stiffness near zero load, raw and quality filtered
//! - Breakaway time, force and displacement
//! - Median mount elevation/azimuth over the window
//! - Acceptance band flag of the breakaway force

use crate::adapter::TelemetryAdapter;
use crate::breakaway::find_breakaway_index;
use crate::config::{BandConfig, FeatureConfig};
use crate::segments::{build_state_segments, pick_longest_segment, slice_by_segment};
use crate::stiffness::{filter_stiffness, is_stiff_ok, stiffness_from_curve};
use crate::telemetry::TelemetrySource;
use crate::types::{
    duration_secs, CurveStats, FeatureRow, ForceDisplacement, HardpointTest, MountAxis,
    StateSegment, TestWindow, TimeSeries, Timestamp, N_HARDPOINTS,
};
use log::{debug, info, warn};

/// Mount orientation over a window, in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MountAngles {
    pub elevation_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
}

/// Feature extractor for test windows
pub struct FeatureExtractor<S> {
    telemetry: TelemetryAdapter<S>,
    config: FeatureConfig,
}

impl<S: TelemetrySource> FeatureExtractor<S> {
    pub fn new(source: S, config: FeatureConfig) -> Self {
        Self {
            telemetry: TelemetryAdapter::new(source),
            config,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Feature rows of every window, in window → hardpoint → phase order,
    /// with the acceptance band flag applied
    pub fn extract(&self, windows: &[TestWindow]) -> Vec<FeatureRow> {
        let mut rows = Vec::new();
        for (i, window) in windows.iter().enumerate() {
            if i % 20 == 0 {
                debug!(
                    "[{}/{}] group {} {} -> {}",
                    i + 1,
                    windows.len(),
                    window.group_id,
                    window.t_start,
                    window.t_end
                );
            }
            rows.extend(self.extract_window(window));
        }
        classify_bands(&mut rows, &self.config.bands);
        info!("extracted {} feature rows from {} windows", rows.len(), windows.len());
        rows
    }

    /// Feature rows of one window; `in_band` is left unset
    pub fn extract_window(&self, window: &TestWindow) -> Vec<FeatureRow> {
        let (t0, t1) = (window.t_start, window.t_end);

        let status = match self.telemetry.status(t0, t1) {
            Ok(status) if !status.is_empty() => status,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!("group {}: status query failed: {e}", window.group_id);
                return Vec::new();
            }
        };
        let actuators = match self.telemetry.actuators(t0, t1) {
            Ok(actuators) if !actuators.is_empty() => actuators,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!("group {}: actuator query failed: {e}", window.group_id);
                return Vec::new();
            }
        };
        let angles = if self.config.include_mount_angles {
            self.mount_angles(t0, t1)
        } else {
            MountAngles::default()
        };

        let mut rows = Vec::new();
        for hp_index in 0..N_HARDPOINTS {
            let (Some(curve), Some(states)) = (actuators.curve(hp_index), status.channel(hp_index))
            else {
                continue;
            };
            if curve.is_empty() {
                continue;
            }

            let segments = build_state_segments(states, t0, t1);
            for &phase in &self.config.phases {
                let segment = pick_longest_segment(&segments, phase.code());
                let slice = slice_by_segment(curve, segment.as_ref(), self.config.slice_pad());
                let Some(segment) = segment.filter(|_| !slice.is_empty()) else {
                    continue;
                };
                rows.push(phase_features(
                    window,
                    hp_index,
                    phase,
                    &segment,
                    &slice,
                    angles,
                    &self.config,
                ));
            }
        }
        rows
    }

    /// Median elevation and azimuth over `[t0, t1]`
    ///
    /// A failed query of either axis leaves both angles undefined.
    pub fn mount_angles(&self, t0: Timestamp, t1: Timestamp) -> MountAngles {
        let queried = self
            .telemetry
            .mount_position(MountAxis::Elevation, t0, t1)
            .and_then(|el| {
                self.telemetry
                    .mount_position(MountAxis::Azimuth, t0, t1)
                    .map(|az| (el, az))
            });
        match queried {
            Ok((el, az)) => MountAngles {
                elevation_deg: median(el.values()),
                azimuth_deg: median(az.values()),
            },
            Err(e) => {
                warn!("mount angle query failed for {t0} -> {t1}: {e}");
                MountAngles::default()
            }
        }
    }
}

/// Build the feature row of one hardpoint phase from its sliced curve
pub fn phase_features(
    window: &TestWindow,
    hp_index: usize,
    phase: HardpointTest,
    segment: &StateSegment,
    curve: &TimeSeries<ForceDisplacement>,
    angles: MountAngles,
    config: &FeatureConfig,
) -> FeatureRow {
    let samples = curve.values();
    let stats = curve_stats(samples);

    let stiffness_raw = stiffness_from_curve(samples, &config.stiffness);
    let stiffness = filter_stiffness(stiffness_raw, &config.stiffness);

    let displacement: Vec<f64> = samples.iter().map(|p| p.displacement).collect();
    let breakaway = find_breakaway_index(&displacement, &config.breakaway).and_then(|i| curve.get(i));

    FeatureRow {
        date: window.date,
        month: window.date.format("%Y-%m").to_string(),
        group_id: window.group_id,
        hp: (hp_index + 1) as u8,
        state: phase,
        t_start_utc: window.t_start,
        t_end_utc: window.t_end,
        state_duration_s: duration_secs(segment.duration()),
        stiffness_raw,
        stiffness,
        stiff_ok: is_stiff_ok(phase, stiffness, config),
        n: stats.n,
        force_max: stats.force_max,
        force_min: stats.force_min,
        force_mean: stats.force_mean,
        disp_ptp: stats.disp_ptp,
        disp_max: stats.disp_max,
        disp_min: stats.disp_min,
        breakaway_time_utc: breakaway.map(|(t, _)| t),
        breakaway_force: breakaway.map(|(_, p)| p.force),
        breakaway_disp: breakaway.map(|(_, p)| p.displacement),
        elevation_deg: angles.elevation_deg,
        azimuth_deg: angles.azimuth_deg,
        in_band: false,
    }
}

/// Count, force extremes/mean and displacement extremes/peak-to-peak
pub fn curve_stats(curve: &[ForceDisplacement]) -> CurveStats {
    if curve.is_empty() {
        return CurveStats::default();
    }
    let force_max = curve.iter().map(|p| p.force).fold(f64::NEG_INFINITY, f64::max);
    let force_min = curve.iter().map(|p| p.force).fold(f64::INFINITY, f64::min);
    let force_mean = curve.iter().map(|p| p.force).sum::<f64>() / curve.len() as f64;
    let disp_max = curve.iter().map(|p| p.displacement).fold(f64::NEG_INFINITY, f64::max);
    let disp_min = curve.iter().map(|p| p.displacement).fold(f64::INFINITY, f64::min);

    CurveStats {
        n: curve.len(),
        force_max: Some(force_max),
        force_min: Some(force_min),
        force_mean: Some(force_mean),
        disp_ptp: Some(disp_max - disp_min),
        disp_max: Some(disp_max),
        disp_min: Some(disp_min),
    }
}

/// Median of the finite values; `None` when there are none
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Set `in_band` on every row from its breakaway force
pub fn classify_bands(rows: &mut [FeatureRow], bands: &BandConfig) {
    for row in rows {
        row.in_band = bands.classify(row.breakaway_force);
    }
}
