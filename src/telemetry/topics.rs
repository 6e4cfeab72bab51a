//! Topic and field names of the telemetry service

use crate::types::N_HARDPOINTS;

/// `testHardpoint` command starts
pub const COMMAND_TOPIC: &str = "lsst.sal.MTM1M3.command_testHardpoint";
pub const COMMAND_ACTUATOR_FIELD: &str = "hardpointActuator";

/// Per-hardpoint test state events
pub const STATUS_TOPIC: &str = "lsst.sal.MTM1M3.logevent_hardpointTestStatus";

/// Measured force (N) and displacement (m) of every hardpoint
pub const ACTUATOR_TOPIC: &str = "lsst.sal.MTM1M3.hardpointActuatorData";

pub const ELEVATION_TOPIC: &str = "lsst.sal.MTMount.elevation";
pub const AZIMUTH_TOPIC: &str = "lsst.sal.MTMount.azimuth";
pub const MOUNT_POSITION_FIELD: &str = "actualPosition";

pub fn test_state_field(hp_index: usize) -> String {
    format!("testState{hp_index}")
}

pub fn force_field(hp_index: usize) -> String {
    format!("measuredForce{hp_index}")
}

pub fn displacement_field(hp_index: usize) -> String {
    format!("displacement{hp_index}")
}

/// `testState0..5`
pub fn status_fields() -> Vec<String> {
    (0..N_HARDPOINTS).map(test_state_field).collect()
}

/// `measuredForce{i}, displacement{i}` for every hardpoint
pub fn actuator_fields() -> Vec<String> {
    (0..N_HARDPOINTS)
        .flat_map(|i| [force_field(i), displacement_field(i)])
        .collect()
}
