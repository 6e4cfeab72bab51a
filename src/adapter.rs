//! Telemetry adaptation
//!
//! This module turns the column-oriented tables returned by a
//! [`TelemetrySource`] into the typed series the pipeline works on:
//! - command events with their actuator identifier
//! - per-hardpoint state channels
//! - force/displacement curves (displacement converted from m to µm)
//! - mount axis positions

use crate::error::ComputeError;
use crate::telemetry::topics::{self, MOUNT_POSITION_FIELD};
use crate::telemetry::{RawTable, TelemetrySource};
use crate::types::{
    ActuatorData, CommandEvent, ForceDisplacement, HardpointStatus, MountAxis, TimeSeries,
    Timestamp, N_HARDPOINTS,
};

/// Conversion factor from metres to micrometres
pub const M_TO_UM: f64 = 1e6;

/// Typed access to the telemetry topics used by the pipeline
pub struct TelemetryAdapter<S> {
    source: S,
}

impl<S: TelemetrySource> TelemetryAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Hardpoint test commands in `[t0, t1]`, chronologically ordered
    pub fn commands(&self, t0: Timestamp, t1: Timestamp) -> Result<Vec<CommandEvent>, ComputeError> {
        let table = self.source.query(
            topics::COMMAND_TOPIC,
            &[topics::COMMAND_ACTUATOR_FIELD],
            t0,
            t1,
        )?;
        Ok(commands_from_table(&table))
    }

    /// Test state of every hardpoint in `[t0, t1]`
    pub fn status(&self, t0: Timestamp, t1: Timestamp) -> Result<HardpointStatus, ComputeError> {
        let fields = topics::status_fields();
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let table = self.source.query(topics::STATUS_TOPIC, &refs, t0, t1)?;
        Ok(status_from_table(&table))
    }

    /// Force/displacement curves of every hardpoint in `[t0, t1]`
    pub fn actuators(&self, t0: Timestamp, t1: Timestamp) -> Result<ActuatorData, ComputeError> {
        let fields = topics::actuator_fields();
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let table = self.source.query(topics::ACTUATOR_TOPIC, &refs, t0, t1)?;
        Ok(actuators_from_table(&table))
    }

    /// Position of one mount axis (degrees) in `[t0, t1]`
    pub fn mount_position(
        &self,
        axis: MountAxis,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<TimeSeries<f64>, ComputeError> {
        let topic = match axis {
            MountAxis::Elevation => topics::ELEVATION_TOPIC,
            MountAxis::Azimuth => topics::AZIMUTH_TOPIC,
        };
        let table = self.source.query(topic, &[MOUNT_POSITION_FIELD], t0, t1)?;
        Ok(numeric_series(&table, MOUNT_POSITION_FIELD))
    }
}

/// Commands keep duplicates: two commands at the same instant are two commands
pub fn commands_from_table(table: &RawTable) -> Vec<CommandEvent> {
    let actuators = table.column(topics::COMMAND_ACTUATOR_FIELD);
    let mut events: Vec<CommandEvent> = table
        .index
        .iter()
        .enumerate()
        .map(|(i, &time)| CommandEvent {
            time,
            actuator: actuators
                .and_then(|c| c.get(i).copied().flatten())
                .filter(|v| v.is_finite())
                .map(|v| v.round() as i64),
        })
        .collect();
    events.sort_by_key(|e| e.time);
    events
}

/// Sources are not required to return rows in order: the index is sorted
/// and deduplicated like the channels
pub fn status_from_table(table: &RawTable) -> HardpointStatus {
    let mut index = table.index.clone();
    index.sort_unstable();
    index.dedup();

    let mut status = HardpointStatus {
        index,
        ..Default::default()
    };
    for hp in 0..N_HARDPOINTS {
        let Some(column) = table.column(&topics::test_state_field(hp)) else {
            continue;
        };
        let samples = table.index.iter().zip(column).map(|(&t, v)| {
            let code = v.filter(|x| x.is_finite()).map(|x| x.round() as i64);
            (t, code)
        });
        status.channels[hp] = Some(TimeSeries::from_samples(samples));
    }
    status
}

pub fn actuators_from_table(table: &RawTable) -> ActuatorData {
    let mut data = ActuatorData::default();
    for hp in 0..N_HARDPOINTS {
        let (Some(force), Some(disp)) = (
            table.column(&topics::force_field(hp)),
            table.column(&topics::displacement_field(hp)),
        ) else {
            continue;
        };
        let samples = table
            .index
            .iter()
            .zip(force.iter().zip(disp))
            .filter_map(|(&t, (f, d))| match (f, d) {
                (Some(f), Some(d)) if f.is_finite() && d.is_finite() => Some((
                    t,
                    ForceDisplacement {
                        force: *f,
                        displacement: d * M_TO_UM,
                    },
                )),
                _ => None,
            });
        data.curves[hp] = Some(TimeSeries::from_samples(samples));
    }
    data
}

/// Finite values of one column; empty when the column is absent
pub fn numeric_series(table: &RawTable, field: &str) -> TimeSeries<f64> {
    let Some(column) = table.column(field) else {
        return TimeSeries::new();
    };
    TimeSeries::from_samples(
        table
            .index
            .iter()
            .zip(column)
            .filter_map(|(&t, v)| v.filter(|x| x.is_finite()).map(|x| (t, x))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySource;
    use chrono::{Duration, TimeZone, Utc};

    fn t(sec: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(sec)
    }

    #[test]
    fn test_commands_keep_missing_actuator() {
        let table = RawTable::from_rows(
            &[topics::COMMAND_ACTUATOR_FIELD],
            vec![(t(1), vec![Some(3.0)]), (t(0), vec![None])],
        );
        let events = commands_from_table(&table);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actuator, None);
        assert_eq!(events[1].actuator, Some(3));
    }

    #[test]
    fn test_status_channels_follow_columns() {
        let table = RawTable::from_rows(
            &["testState0", "testState2"],
            vec![
                (t(0), vec![Some(1.0), Some(2.0)]),
                (t(1), vec![None, Some(3.0)]),
            ],
        );
        let status = status_from_table(&table);
        assert_eq!(status.index, vec![t(0), t(1)]);
        assert_eq!(status.channel(0).unwrap().values(), &[Some(1), None]);
        assert!(status.channel(1).is_none());
        assert_eq!(status.channel(2).unwrap().values(), &[Some(2), Some(3)]);
    }

    #[test]
    fn test_status_index_of_unordered_rows() {
        let table = RawTable {
            index: vec![t(5), t(0), t(3), t(0)],
            columns: [(
                "testState0".to_string(),
                vec![Some(6.0), Some(2.0), Some(3.0), Some(2.0)],
            )]
            .into_iter()
            .collect(),
        };
        let status = status_from_table(&table);
        assert_eq!(status.index, vec![t(0), t(3), t(5)]);
        assert_eq!(status.channel(0).unwrap().values(), &[Some(2), Some(3), Some(6)]);
        assert_eq!(
            crate::scanner::align_to_status_index(&status, t(1)),
            Some(t(3))
        );
    }

    #[test]
    fn test_actuator_curves_convert_to_micrometres_and_drop_partial_rows() {
        let table = RawTable::from_rows(
            &["measuredForce1", "displacement1", "measuredForce4"],
            vec![
                (t(0), vec![Some(10.0), Some(2e-6), Some(1.0)]),
                (t(1), vec![None, Some(3e-6), Some(1.0)]),
            ],
        );
        let data = actuators_from_table(&table);
        let curve = data.curve(1).unwrap();
        assert_eq!(curve.len(), 1);
        assert_eq!(curve.values()[0].force, 10.0);
        assert!((curve.values()[0].displacement - 2.0).abs() < 1e-9);
        // force without displacement is not a curve
        assert!(data.curve(4).is_none());
        assert!(data.curve(0).is_none());
    }

    #[test]
    fn test_adapter_reads_mount_axis() {
        let source = MemorySource::new().with_topic(
            topics::AZIMUTH_TOPIC,
            RawTable::from_rows(
                &[MOUNT_POSITION_FIELD],
                vec![(t(0), vec![Some(90.0)]), (t(1), vec![None])],
            ),
        );
        let adapter = TelemetryAdapter::new(source);
        let az = adapter.mount_position(MountAxis::Azimuth, t(0), t(5)).unwrap();
        assert_eq!(az.values(), &[90.0]);
        let el = adapter.mount_position(MountAxis::Elevation, t(0), t(5)).unwrap();
        assert!(el.is_empty());
    }
}
