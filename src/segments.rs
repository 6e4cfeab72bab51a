//! State segmentation
//!
//! Splits a state channel into contiguous runs of one state code over a query
//! window, and cuts other series down to the run of a chosen phase.

use crate::types::{StateSegment, TimeSeries, Timestamp};
use chrono::Duration;

/// Contiguous state segments covering `[t0, t1]`.
///
/// Missing samples are dropped first. When the remaining samples do not reach
/// the window edges, the first and last known states are extended to `t0` and
/// `t1`, so the segments always start at `t0`, end at `t1` and share their
/// inner boundaries. Returns an empty list when no sample falls in the window.
pub fn build_state_segments(
    series: &TimeSeries<Option<i64>>,
    t0: Timestamp,
    t1: Timestamp,
) -> Vec<StateSegment> {
    let mut samples: Vec<(Timestamp, i64)> = series
        .between(t0, t1)
        .iter()
        .filter_map(|(t, v)| v.map(|state| (t, state)))
        .collect();

    let (Some(&(first_t, first_state)), Some(&(last_t, last_state))) =
        (samples.first(), samples.last())
    else {
        return Vec::new();
    };
    if first_t > t0 {
        samples.insert(0, (t0, first_state));
    }
    if last_t < t1 {
        samples.push((t1, last_state));
    }

    let mut segments: Vec<StateSegment> = Vec::new();
    for (t, state) in samples {
        if segments.last().is_some_and(|s| s.state_code == state) {
            continue;
        }
        if let Some(previous) = segments.last_mut() {
            previous.end = t;
        }
        segments.push(StateSegment {
            start: t,
            end: t1,
            state_code: state,
        });
    }
    segments
}

/// Longest segment of `target_state` with positive duration.
///
/// Ties go to the earliest segment.
pub fn pick_longest_segment(segments: &[StateSegment], target_state: i64) -> Option<StateSegment> {
    let mut best: Option<StateSegment> = None;
    for segment in segments
        .iter()
        .filter(|s| s.state_code == target_state && s.end > s.start)
    {
        if best.map_or(true, |b| segment.duration() > b.duration()) {
            best = Some(*segment);
        }
    }
    best
}

/// Samples of `series` within `[segment.start - pad, segment.end + pad]`
///
/// The pad absorbs the sampling offset between the state topic and the
/// sliced topic.
pub fn slice_by_segment<T: Clone>(
    series: &TimeSeries<T>,
    segment: Option<&StateSegment>,
    pad: Duration,
) -> TimeSeries<T> {
    match segment {
        Some(segment) if !series.is_empty() => {
            series.between(segment.start - pad, segment.end + pad)
        }
        _ => TimeSeries::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn t(sec: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(sec)
    }

    fn states(samples: &[(i64, Option<i64>)]) -> TimeSeries<Option<i64>> {
        TimeSeries::from_samples(samples.iter().map(|&(s, v)| (t(s), v)))
    }

    fn seg(start: i64, end: i64, state_code: i64) -> StateSegment {
        StateSegment {
            start: t(start),
            end: t(end),
            state_code,
        }
    }

    fn assert_contiguous(segments: &[StateSegment], t0: Timestamp, t1: Timestamp) {
        assert_eq!(segments.first().unwrap().start, t0);
        assert_eq!(segments.last().unwrap().end, t1);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_ne!(pair[0].state_code, pair[1].state_code);
        }
    }

    #[test]
    fn test_segments_extend_to_window_edges() {
        let series = states(&[(10, Some(2)), (20, Some(2)), (30, Some(3)), (50, Some(4))]);
        let segments = build_state_segments(&series, t(0), t(100));
        assert_eq!(
            segments,
            vec![seg(0, 30, 2), seg(30, 50, 3), seg(50, 100, 4)]
        );
    }

    #[test]
    fn test_segments_are_contiguous_and_exhaustive() {
        let cases = [
            states(&[(0, Some(1))]),
            states(&[(5, Some(1)), (6, Some(2)), (7, Some(1)), (8, Some(1))]),
            states(&[(-10, Some(3)), (40, Some(4)), (90, None), (200, Some(5))]),
            states(&[(0, Some(2)), (100, Some(6))]),
        ];
        for series in &cases {
            let segments = build_state_segments(series, t(0), t(100));
            assert_contiguous(&segments, t(0), t(100));
        }
    }

    #[test]
    fn test_samples_outside_window_are_ignored() {
        // the state before t0 is not carried into the window
        let series = states(&[(-10, Some(3)), (40, Some(4)), (200, Some(5))]);
        let segments = build_state_segments(&series, t(0), t(100));
        assert_eq!(segments, vec![seg(0, 100, 4)]);
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let series = states(&[(0, Some(2)), (10, None), (20, Some(2)), (30, Some(3))]);
        let segments = build_state_segments(&series, t(0), t(40));
        assert_eq!(segments, vec![seg(0, 30, 2), seg(30, 40, 3)]);

        assert!(build_state_segments(&states(&[(0, None), (1, None)]), t(0), t(10)).is_empty());
        assert!(build_state_segments(&TimeSeries::new(), t(0), t(10)).is_empty());
        assert!(build_state_segments(&states(&[(50, Some(1))]), t(0), t(10)).is_empty());
    }

    #[test]
    fn test_pick_longest_segment() {
        let segments = vec![
            seg(0, 10, 2),
            seg(10, 40, 3),
            seg(40, 50, 2),
            seg(50, 60, 3),
            seg(60, 60, 4),
        ];
        assert_eq!(pick_longest_segment(&segments, 3), Some(seg(10, 40, 3)));
        // equal durations: earliest wins
        assert_eq!(pick_longest_segment(&segments, 2), Some(seg(0, 10, 2)));
        // zero-length segments are not candidates
        assert_eq!(pick_longest_segment(&segments, 4), None);
        assert_eq!(pick_longest_segment(&segments, 7), None);
    }

    #[test]
    fn test_slice_by_segment_applies_pad() {
        let series = TimeSeries::from_samples((0..20).map(|i| (t(i), i)));
        let segment = seg(5, 8, 3);
        let sliced = slice_by_segment(&series, Some(&segment), Duration::seconds(1));
        assert_eq!(sliced.values(), &[4, 5, 6, 7, 8, 9]);

        let unpadded = slice_by_segment(&series, Some(&segment), Duration::zero());
        assert_eq!(unpadded.values(), &[5, 6, 7, 8]);

        assert!(slice_by_segment(&series, None, Duration::seconds(1)).is_empty());
        assert!(slice_by_segment(&TimeSeries::<i64>::new(), Some(&segment), Duration::seconds(1)).is_empty());
    }
}
