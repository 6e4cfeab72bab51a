//! Time partitioning helpers
//!
//! - [`ChunkRanges`]: overlapping query chunks over a long time range
//! - [`group_by_gaps`]: bursts of command events separated by quiet periods

use crate::types::{CommandEvent, Timestamp, N_HARDPOINTS};
use chrono::Duration;
use std::collections::BTreeSet;

/// Iterator over `(chunk_start, chunk_end)` pairs covering `[start, end]`.
///
/// Consecutive chunks overlap by `overlap` so that events at a border are seen
/// by both. An overlap that is not smaller than the chunk size is treated as
/// zero, which guarantees forward progress.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    next_start: Option<Timestamp>,
    end: Timestamp,
    size: Duration,
    overlap: Duration,
}

impl ChunkRanges {
    pub fn new(start: Timestamp, end: Timestamp, size: Duration, overlap: Duration) -> Self {
        let overlap = if overlap >= size || overlap < Duration::zero() {
            Duration::zero()
        } else {
            overlap
        };
        // a non-positive chunk size cannot make progress
        let next_start = (start < end && size > Duration::zero()).then_some(start);
        Self {
            next_start,
            end,
            size,
            overlap,
        }
    }

    /// Chunks of `days` days overlapping by `overlap_hours` hours
    ///
    /// A chunk size beyond the duration range yields no chunks; an overlap
    /// beyond it is treated as zero.
    pub fn days(start: Timestamp, end: Timestamp, days: i64, overlap_hours: i64) -> Self {
        Self::new(
            start,
            end,
            Duration::try_days(days).unwrap_or_else(Duration::zero),
            Duration::try_hours(overlap_hours).unwrap_or_else(Duration::zero),
        )
    }
}

impl Iterator for ChunkRanges {
    type Item = (Timestamp, Timestamp);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk_start = self.next_start?;
        // a chunk reaching past the representable range ends at `end`
        let chunk_end = chunk_start
            .checked_add_signed(self.size)
            .map_or(self.end, |t| t.min(self.end));
        self.next_start = if chunk_end >= self.end {
            None
        } else {
            chunk_end.checked_sub_signed(self.overlap)
        };
        Some((chunk_start, chunk_end))
    }
}

/// Command event tagged with the burst it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedEvent<'a> {
    pub group_id: u32,
    pub event: &'a CommandEvent,
}

/// Tag chronologically sorted events with burst ids.
///
/// The first event opens group 0; a gap strictly larger than `gap` to the
/// previous event opens the next group.
pub fn group_by_gaps(events: &[CommandEvent], gap: Duration) -> Vec<GroupedEvent<'_>> {
    let mut group_id = 0;
    let mut previous: Option<Timestamp> = None;
    events
        .iter()
        .map(|event| {
            if let Some(prev) = previous {
                if event.time - prev > gap {
                    group_id += 1;
                }
            }
            previous = Some(event.time);
            GroupedEvent { group_id, event }
        })
        .collect()
}

/// Summary of one command burst
#[derive(Debug, Clone, PartialEq)]
pub struct CommandGroup {
    pub group_id: u32,
    /// Earliest command time of the burst
    pub reference_time: Timestamp,
    pub n_cmds: usize,
    /// Distinct commanded actuator identifiers (1-based, as received)
    pub actuators: BTreeSet<i64>,
}

impl CommandGroup {
    /// 0-based hardpoints to monitor; all of them when no command named a
    /// valid actuator
    pub fn hp_indices(&self) -> Vec<usize> {
        let indices: Vec<usize> = self
            .actuators
            .iter()
            .filter(|&&a| a >= 1 && a <= N_HARDPOINTS as i64)
            .map(|&a| (a - 1) as usize)
            .collect();
        if indices.is_empty() {
            (0..N_HARDPOINTS).collect()
        } else {
            indices
        }
    }
}

/// Collapse grouped events into one summary per burst, ordered by group id
pub fn summarize_groups(grouped: &[GroupedEvent<'_>]) -> Vec<CommandGroup> {
    let mut groups: Vec<CommandGroup> = Vec::new();
    for item in grouped {
        match groups.last_mut() {
            Some(group) if group.group_id == item.group_id => {
                group.n_cmds += 1;
                group.reference_time = group.reference_time.min(item.event.time);
                group.actuators.extend(item.event.actuator);
            }
            _ => groups.push(CommandGroup {
                group_id: item.group_id,
                reference_time: item.event.time,
                n_cmds: 1,
                actuators: item.event.actuator.into_iter().collect(),
            }),
        }
    }
    groups
}
