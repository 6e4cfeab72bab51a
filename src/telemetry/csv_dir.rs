//! Telemetry exported as one CSV file per topic
//!
//! Layout: `<root>/<topic>.csv` with a header row, a `time` column holding RFC
//! 3339 timestamps and one numeric column per field. Rows need not be sorted.
//! A missing file reads as "no data" and is looked for again on the next
//! query.

use super::{RawTable, TelemetrySource};
use crate::error::ComputeError;
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the timestamp column in every topic file
pub const TIME_COLUMN: &str = "time";

/// Telemetry source backed by a directory of topic CSV files
///
/// Each topic file is parsed once; later queries are answered from the parsed
/// table. Call [`CsvDirectorySource::clear_cache`] after the files change.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
    cache: RefCell<HashMap<String, RawTable>>,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn topic_path(&self, topic: &str) -> PathBuf {
        self.root.join(format!("{topic}.csv"))
    }

    /// Forget every parsed topic file
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Every numeric column of a topic file, sorted by time
    fn load_topic(&self, path: &Path) -> Result<RawTable, ComputeError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let time_idx = headers
            .iter()
            .position(|h| h == TIME_COLUMN)
            .ok_or_else(|| ComputeError::missing_column(path.display().to_string(), TIME_COLUMN))?;

        let present: Vec<(&str, usize)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_idx)
            .map(|(i, h)| (h, i))
            .collect();
        let names: Vec<&str> = present.iter().map(|(f, _)| *f).collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let raw_time = record.get(time_idx).unwrap_or_default();
            let time = parse_timestamp(raw_time).map_err(|e| {
                ComputeError::TimestampParse(format!(
                    "{} row {}: {e}",
                    path.display(),
                    line + 2
                ))
            })?;
            let values: Vec<Option<f64>> = present
                .iter()
                .map(|(_, i)| record.get(*i).and_then(parse_number))
                .collect();
            rows.push((time, values));
        }

        debug!("parsed {} rows from {}", rows.len(), path.display());
        Ok(RawTable::from_rows(&names, rows))
    }
}

impl TelemetrySource for CsvDirectorySource {
    fn query(
        &self,
        topic: &str,
        fields: &[&str],
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<RawTable, ComputeError> {
        // only fields the file actually carries become columns
        if let Some(table) = self.cache.borrow().get(topic) {
            return Ok(table.select(fields, t0, t1));
        }

        let path = self.topic_path(topic);
        if !path.exists() {
            debug!("no telemetry file for {topic} at {}", path.display());
            return Ok(RawTable::new());
        }

        let table = self.load_topic(&path)?;
        let selected = table.select(fields, t0, t1);
        self.cache.borrow_mut().insert(topic.to_string(), table);
        Ok(selected)
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|t| t.with_timezone(&Utc))
}

fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw {
        "" => None,
        "true" | "True" => Some(1.0),
        "false" | "False" => Some(0.0),
        _ => raw.parse::<f64>().ok().filter(|v| !v.is_nan()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::fs;

    fn t(sec: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(sec)
    }

    #[test]
    fn test_reads_fields_in_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("topic.a.csv"),
            "time,x,y\n\
             2024-03-01T12:00:02+00:00,2.5,\n\
             2024-03-01T12:00:00Z,1.0,NaN\n\
             2024-03-01T12:00:09Z,9.0,3\n",
        )
        .unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let table = source.query("topic.a", &["x", "y", "z"], t(0), t(5)).unwrap();

        assert_eq!(table.index, vec![t(0), t(2)]);
        assert_eq!(table.column("x").unwrap(), &[Some(1.0), Some(2.5)]);
        assert_eq!(table.column("y").unwrap(), &[None, None]);
        assert!(table.column("z").is_none());
    }

    #[test]
    fn test_topic_file_is_parsed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topic.b.csv");
        fs::write(
            &path,
            "time,x,y\n\
             2024-03-01T12:00:00Z,1.0,10\n\
             2024-03-01T12:00:04Z,4.0,40\n\
             2024-03-01T12:00:08Z,8.0,80\n",
        )
        .unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let first = source.query("topic.b", &["x"], t(0), t(5)).unwrap();
        assert_eq!(first.index, vec![t(0), t(4)]);

        // later queries over other fields and ranges come from the parsed table
        fs::remove_file(&path).unwrap();
        let second = source.query("topic.b", &["y", "z"], t(3), t(9)).unwrap();
        assert_eq!(second.index, vec![t(4), t(8)]);
        assert_eq!(second.column("y").unwrap(), &[Some(40.0), Some(80.0)]);
        assert!(second.column("x").is_none());
        assert!(second.column("z").is_none());

        source.clear_cache();
        assert!(source.query("topic.b", &["x"], t(0), t(5)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDirectorySource::new(dir.path());
        assert!(source.query("nothing", &["x"], t(0), t(5)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_time_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.csv"), "stamp,x\n2024-03-01T12:00:00Z,1\n").unwrap();
        let source = CsvDirectorySource::new(dir.path());
        assert!(matches!(
            source.query("bad", &["x"], t(0), t(5)),
            Err(ComputeError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.csv"), "time,x\nyesterday,1\n").unwrap();
        let source = CsvDirectorySource::new(dir.path());
        assert!(matches!(
            source.query("bad", &["x"], t(0), t(5)),
            Err(ComputeError::TimestampParse(_))
        ));
    }
}
