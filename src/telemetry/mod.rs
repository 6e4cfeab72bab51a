//! Telemetry query service
//!
//! The pipeline reads every stream through [`TelemetrySource`], a blocking
//! `query(topic, fields, t0, t1)` returning column-oriented numeric data. An
//! empty table means "no data"; an `Err` means the query itself failed. Callers
//! decide which of the two they care to distinguish.

mod csv_dir;
mod memory;
pub mod topics;

pub use csv_dir::CsvDirectorySource;
pub use memory::MemorySource;

use crate::error::ComputeError;
use crate::types::Timestamp;
use std::collections::BTreeMap;

/// Column-oriented result of a telemetry query
///
/// Rows are ordered by `index`; each column has one entry per row, `None`
/// where the sample carried no (numeric) value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub index: Vec<Timestamp>,
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl RawTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows of `(time, values)` with values in `fields` order
    pub fn from_rows(
        fields: &[&str],
        rows: impl IntoIterator<Item = (Timestamp, Vec<Option<f64>>)>,
    ) -> Self {
        let mut table = RawTable::new();
        for field in fields {
            table.columns.insert(field.to_string(), Vec::new());
        }
        for (time, values) in rows {
            table.push_row(time, fields, &values);
        }
        table.sort_by_time();
        table
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    fn push_row(&mut self, time: Timestamp, fields: &[&str], values: &[Option<f64>]) {
        self.index.push(time);
        for (i, field) in fields.iter().enumerate() {
            let value = values.get(i).copied().flatten();
            self.columns
                .entry(field.to_string())
                .or_default()
                .push(value);
        }
    }

    /// Stable sort of all rows by time
    pub fn sort_by_time(&mut self) {
        if self.index.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|&i| self.index[i]);
        self.index = order.iter().map(|&i| self.index[i]).collect();
        for column in self.columns.values_mut() {
            *column = order
                .iter()
                .map(|&i| column.get(i).copied().flatten())
                .collect();
        }
    }

    /// Rows within `[t0, t1]` restricted to the requested fields.
    ///
    /// Fields absent from the table stay absent from the result.
    pub fn select(&self, fields: &[&str], t0: Timestamp, t1: Timestamp) -> RawTable {
        let lo = self.index.partition_point(|&t| t < t0);
        let hi = self.index.partition_point(|&t| t <= t1).max(lo);
        let mut out = RawTable {
            index: self.index[lo..hi].to_vec(),
            columns: BTreeMap::new(),
        };
        for field in fields {
            if let Some(column) = self.columns.get(*field) {
                let values = column.get(lo..hi).map(|v| v.to_vec()).unwrap_or_default();
                out.columns.insert(field.to_string(), values);
            }
        }
        out
    }
}

/// Source of historical telemetry
pub trait TelemetrySource {
    /// Query `fields` of `topic` over the closed range `[t0, t1]`
    fn query(
        &self,
        topic: &str,
        fields: &[&str],
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<RawTable, ComputeError>;
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for &S {
    fn query(
        &self,
        topic: &str,
        fields: &[&str],
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<RawTable, ComputeError> {
        (**self).query(topic, fields, t0, t1)
    }
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for Box<S> {
    fn query(
        &self,
        topic: &str,
        fields: &[&str],
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<RawTable, ComputeError> {
        (**self).query(topic, fields, t0, t1)
    }
}
