//! In-memory telemetry source

use super::{RawTable, TelemetrySource};
use crate::error::ComputeError;
use crate::types::Timestamp;
use std::collections::{HashMap, HashSet};

/// Telemetry held in memory, one table per topic
///
/// Topics can be marked as failing to exercise error paths of the callers.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    topics: HashMap<String, RawTable>,
    failing: HashSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the table of a topic
    pub fn with_topic(mut self, topic: &str, mut table: RawTable) -> Self {
        table.sort_by_time();
        self.topics.insert(topic.to_string(), table);
        self
    }

    /// Make every query of `topic` fail
    pub fn with_failing_topic(mut self, topic: &str) -> Self {
        self.failing.insert(topic.to_string());
        self
    }

    pub fn topic(&self, topic: &str) -> Option<&RawTable> {
        self.topics.get(topic)
    }
}

impl TelemetrySource for MemorySource {
    fn query(
        &self,
        topic: &str,
        fields: &[&str],
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<RawTable, ComputeError> {
        if self.failing.contains(topic) {
            return Err(ComputeError::telemetry(topic, "topic marked as failing"));
        }
        Ok(self
            .topics
            .get(topic)
            .map(|table| table.select(fields, t0, t1))
            .unwrap_or_default())
    }
}
