//! Breakaway detection
//!
//! The breakaway is where the hardpoint detaches: displacement starts jumping
//! by more than a threshold on consecutive samples. Requiring a run of jumps
//! rejects single-sample telemetry glitches.

use crate::config::BreakawayConfig;

/// Index of the first sample of the first run of `min_run` consecutive
/// sample-to-sample jumps larger than `disp_threshold_um`.
///
/// Sample `i` is flagged when `|d[i] - d[i-1]|` exceeds the threshold; the
/// first sample has no predecessor and is never flagged.
pub fn find_breakaway_index(displacement_um: &[f64], config: &BreakawayConfig) -> Option<usize> {
    let mut run = 0;
    let mut first = None;
    for (i, pair) in displacement_um.windows(2).enumerate() {
        let jumped = (pair[1] - pair[0]).abs() > config.disp_threshold_um;
        if !jumped {
            run = 0;
            first = None;
            continue;
        }
        run += 1;
        let start = *first.get_or_insert(i + 1);
        if run >= config.min_run {
            return Some(start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakaway_at_start_of_run() {
        let config = BreakawayConfig::default();
        let disp = [0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 6.0, 0.0, 0.0];
        assert_eq!(find_breakaway_index(&disp, &config), Some(4));
    }

    #[test]
    fn test_short_runs_are_glitches() {
        let config = BreakawayConfig::default();
        assert_eq!(find_breakaway_index(&[0.0, 0.0, 3.0, 0.0, 0.0], &config), None);
        // two jumps, a pause, then three jumps
        let disp = [0.0, 2.0, 4.0, 4.0, 6.0, 8.0, 10.0];
        assert_eq!(find_breakaway_index(&disp, &config), Some(4));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let config = BreakawayConfig::default();
        assert_eq!(find_breakaway_index(&[0.0, 1.0, 2.0, 3.0, 4.0], &config), None);
        assert_eq!(find_breakaway_index(&[0.0, -1.5, -3.0, -4.5], &config), Some(1));
    }

    #[test]
    fn test_empty_and_single_sample() {
        let config = BreakawayConfig::default();
        assert_eq!(find_breakaway_index(&[], &config), None);
        assert_eq!(find_breakaway_index(&[5.0], &config), None);
    }

    #[test]
    fn test_min_run_of_one() {
        let config = BreakawayConfig {
            disp_threshold_um: 1.0,
            min_run: 1,
        };
        assert_eq!(find_breakaway_index(&[0.0, 0.0, 3.0, 0.0], &config), Some(2));
    }
}
