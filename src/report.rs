//! Acceptance statistics
//!
//! Summaries of how often the breakaway force falls outside the acceptance
//! bands, derived from a classified feature table. Day and year come from the
//! breakaway time; rows without one count per hardpoint but belong to no day.

use crate::error::ComputeError;
use crate::features::median;
use crate::store::write_table;
use crate::types::FeatureRow;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const OUTSIDE_POINTS_BY_HP_FILE: &str = "outside_points_by_hp.csv";
pub const OUTSIDE_DAYS_BY_YEAR_FILE: &str = "outside_days_by_year.csv";
pub const DAILY_STIFFNESS_FILE: &str = "daily_stiffness_inside_outside.csv";

/// Out-of-band share per hardpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardpointOutside {
    pub hp: u8,
    pub n_total: usize,
    pub n_outside: usize,
    pub pct_outside: f64,
}

/// Days with at least one out-of-band row, per year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearOutsideDays {
    pub year: i32,
    pub n_days_total: usize,
    pub n_days_outside: usize,
    pub pct_days_outside: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayClass {
    Inside,
    Outside,
}

/// Filtered stiffness statistics of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStiffness {
    pub day: NaiveDate,
    pub year: i32,
    pub n_points: usize,
    pub any_outside: bool,
    pub frac_outside: f64,
    pub stiff_mean: f64,
    pub stiff_median: f64,
    /// Sample standard deviation; undefined below two points
    pub stiff_std: Option<f64>,
    pub day_class: DayClass,
}

/// The three acceptance tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    pub outside_points_by_hp: Vec<HardpointOutside>,
    pub outside_days_by_year: Vec<YearOutsideDays>,
    pub daily_stiffness: Vec<DailyStiffness>,
}

impl StatsReport {
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        Self {
            outside_points_by_hp: outside_points_by_hp(rows),
            outside_days_by_year: outside_days_by_year(rows),
            daily_stiffness: daily_stiffness_inside_outside(rows),
        }
    }

    /// Write the tables into `dir`, returning their paths
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, ComputeError> {
        let hp_path = dir.join(OUTSIDE_POINTS_BY_HP_FILE);
        write_table(
            &hp_path,
            &["hp", "n_total", "n_outside", "pct_outside"],
            &self.outside_points_by_hp,
        )?;

        let year_path = dir.join(OUTSIDE_DAYS_BY_YEAR_FILE);
        write_table(
            &year_path,
            &["year", "n_days_total", "n_days_outside", "pct_days_outside"],
            &self.outside_days_by_year,
        )?;

        let daily_path = dir.join(DAILY_STIFFNESS_FILE);
        write_table(
            &daily_path,
            &[
                "day",
                "year",
                "n_points",
                "any_outside",
                "frac_outside",
                "stiff_mean",
                "stiff_median",
                "stiff_std",
                "day_class",
            ],
            &self.daily_stiffness,
        )?;

        Ok(vec![hp_path, year_path, daily_path])
    }
}

fn breakaway_day(row: &FeatureRow) -> Option<NaiveDate> {
    row.breakaway_time_utc.map(|t| t.date_naive())
}

fn percent(part: usize, total: usize) -> f64 {
    100.0 * part as f64 / total as f64
}

pub fn outside_points_by_hp(rows: &[FeatureRow]) -> Vec<HardpointOutside> {
    let mut counts: BTreeMap<u8, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let entry = counts.entry(row.hp).or_default();
        entry.0 += 1;
        if !row.in_band {
            entry.1 += 1;
        }
    }
    counts
        .into_iter()
        .map(|(hp, (n_total, n_outside))| HardpointOutside {
            hp,
            n_total,
            n_outside,
            pct_outside: percent(n_outside, n_total),
        })
        .collect()
}

pub fn outside_days_by_year(rows: &[FeatureRow]) -> Vec<YearOutsideDays> {
    let mut any_outside: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for row in rows {
        if let Some(day) = breakaway_day(row) {
            *any_outside.entry(day).or_default() |= !row.in_band;
        }
    }

    let mut by_year: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
    for (day, outside) in any_outside {
        let entry = by_year.entry(day.year()).or_default();
        entry.0 += 1;
        if outside {
            entry.1 += 1;
        }
    }
    by_year
        .into_iter()
        .map(|(year, (n_days_total, n_days_outside))| YearOutsideDays {
            year,
            n_days_total,
            n_days_outside,
            pct_days_outside: percent(n_days_outside, n_days_total),
        })
        .collect()
}

pub fn daily_stiffness_inside_outside(rows: &[FeatureRow]) -> Vec<DailyStiffness> {
    let mut by_day: BTreeMap<NaiveDate, Vec<(f64, bool)>> = BTreeMap::new();
    for row in rows {
        let (Some(day), Some(k)) = (breakaway_day(row), row.stiffness) else {
            continue;
        };
        if k.is_finite() {
            by_day.entry(day).or_default().push((k, !row.in_band));
        }
    }

    by_day
        .into_iter()
        .filter_map(|(day, points)| {
            let stiffness: Vec<f64> = points.iter().map(|(k, _)| *k).collect();
            let n = points.len();
            let n_outside = points.iter().filter(|(_, outside)| *outside).count();
            let mean = stiffness.iter().sum::<f64>() / n as f64;
            let std = (n >= 2).then(|| {
                let ss: f64 = stiffness.iter().map(|k| (k - mean).powi(2)).sum();
                (ss / (n - 1) as f64).sqrt()
            });
            Some(DailyStiffness {
                day,
                year: day.year(),
                n_points: n,
                any_outside: n_outside > 0,
                frac_outside: n_outside as f64 / n as f64,
                stiff_mean: mean,
                stiff_median: median(&stiffness)?,
                stiff_std: std,
                day_class: if n_outside > 0 {
                    DayClass::Outside
                } else {
                    DayClass::Inside
                },
            })
        })
        .collect()
}
