//! Stiffness estimation
//!
//! Stiffness is the force/displacement slope (N/µm) of the near-linear regime
//! around zero load. The curve is first shifted so the sample with the lowest
//! absolute force sits at the origin, then a least-squares line through the
//! origin is fitted to the samples nearest zero displacement.

use crate::config::{FeatureConfig, StiffnessConfig};
use crate::types::{ForceDisplacement, HardpointTest};

/// Shift a curve so its minimum-|force| sample becomes `(0, 0)`.
///
/// The first such sample wins when several share the minimum.
pub fn center_to_origin(curve: &[ForceDisplacement]) -> Vec<ForceDisplacement> {
    let Some(origin) = curve
        .iter()
        .min_by(|a, b| a.force.abs().total_cmp(&b.force.abs()))
        .copied()
    else {
        return Vec::new();
    };
    curve
        .iter()
        .map(|p| ForceDisplacement {
            force: p.force - origin.force,
            displacement: p.displacement - origin.displacement,
        })
        .collect()
}

/// Least-squares slope of `y = k·x`: `k = (x·y) / (x·x)`
///
/// `None` when `x·x` is zero or the result is not finite. Extra elements of the
/// longer slice are ignored.
pub fn slope_through_origin(x: &[f64], y: &[f64]) -> Option<f64> {
    let denom: f64 = x.iter().map(|v| v * v).sum();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let numer: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    Some(numer / denom).filter(|k| k.is_finite())
}

/// Raw stiffness (N/µm) of a chronologically ordered phase curve
pub fn stiffness_from_curve(curve: &[ForceDisplacement], config: &StiffnessConfig) -> Option<f64> {
    if curve.is_empty() || curve.len() < config.min_samples {
        return None;
    }

    let linear: Vec<ForceDisplacement> = center_to_origin(curve)
        .into_iter()
        .filter(|p| p.displacement.abs() <= config.fit_disp_um)
        .collect();
    let nearest_zero = linear
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.displacement.abs().total_cmp(&b.displacement.abs()))
        .map(|(i, _)| i)?;

    let lo = nearest_zero.saturating_sub(config.points_around_zero);
    let hi = (nearest_zero + config.points_around_zero + 1).min(linear.len());
    let window = &linear[lo..hi];
    if window.len() < config.min_fit_points {
        return None;
    }

    let (x, y): (Vec<f64>, Vec<f64>) = window.iter().map(|p| (p.displacement, p.force)).unzip();
    slope_through_origin(&x, &y)
}

/// Post-fit quality filter
///
/// Small negative values (`neg_clamp <= k < 0`) are noise around zero and
/// become `0.0`; values below `neg_clamp` or above `max_abs` are discarded.
pub fn filter_stiffness(raw: Option<f64>, config: &StiffnessConfig) -> Option<f64> {
    match raw {
        Some(k) if !k.is_finite() => None,
        Some(k) if k >= config.neg_clamp && k < 0.0 => Some(0.0),
        Some(k) if k < config.neg_clamp || k > config.max_abs => None,
        other => other,
    }
}

/// Whether a filtered stiffness is usable for the given phase
pub fn is_stiff_ok(phase: HardpointTest, stiffness: Option<f64>, config: &FeatureConfig) -> bool {
    config.stiff_ok_phases.contains(&phase)
        && stiffness.is_some_and(|k| k >= 0.0 && k <= config.stiffness.max_abs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd(displacement: f64, force: f64) -> ForceDisplacement {
        ForceDisplacement {
            force,
            displacement,
        }
    }

    #[test]
    fn test_slope_through_origin() {
        let x = [1.0, 2.0, 3.0];
        assert_eq!(slope_through_origin(&x, &[2.0, 4.0, 6.0]), Some(2.0));
        assert_eq!(slope_through_origin(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(slope_through_origin(&[], &[]), None);
        assert_eq!(slope_through_origin(&[f64::INFINITY], &[1.0]), None);
    }

    #[test]
    fn test_slope_is_linear_in_y() {
        let x = [0.5, -1.0, 2.0, 3.5, -4.0];
        let y1 = [1.0, 2.0, -1.0, 0.3, 7.0];
        let y2 = [-3.0, 0.0, 4.0, 1.0, 2.5];
        let (a, b) = (2.5, -0.75);
        let combined: Vec<f64> = y1.iter().zip(&y2).map(|(p, q)| a * p + b * q).collect();

        let k1 = slope_through_origin(&x, &y1).unwrap();
        let k2 = slope_through_origin(&x, &y2).unwrap();
        let k = slope_through_origin(&x, &combined).unwrap();
        assert!((k - (a * k1 + b * k2)).abs() < 1e-9);
    }

    #[test]
    fn test_center_to_origin_is_idempotent() {
        let curve = vec![fd(5.0, 300.0), fd(7.0, -5.0), fd(9.0, 12.0), fd(11.0, 400.0)];
        let once = center_to_origin(&curve);
        assert_eq!(once[1], fd(0.0, 0.0));
        assert_eq!(once[0], fd(-2.0, 305.0));

        let twice = center_to_origin(&once);
        assert_eq!(twice, once);
        assert!(center_to_origin(&[]).is_empty());
    }

    #[test]
    fn test_stiffness_recovers_slope_despite_preload() {
        // force = 3·d + 40 over d in [-50, 50]; the unloaded sample is d = -13
        let curve: Vec<ForceDisplacement> = (-50..=50)
            .map(|d| fd(d as f64, 3.0 * d as f64 + 40.0))
            .collect();
        let k = stiffness_from_curve(&curve, &StiffnessConfig::default()).unwrap();
        assert!((k - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stiffness_requires_enough_samples() {
        let config = StiffnessConfig::default();
        let short: Vec<ForceDisplacement> = (0..19).map(|d| fd(d as f64, 2.0 * d as f64)).collect();
        assert_eq!(stiffness_from_curve(&short, &config), None);

        // only the origin sample lies within the fit displacement range
        let sparse: Vec<ForceDisplacement> = (0..20)
            .map(|i| fd(1000.0 * i as f64, 100.0 * i as f64))
            .collect();
        assert_eq!(stiffness_from_curve(&sparse, &config), None);
    }

    #[test]
    fn test_filter_stiffness() {
        let config = StiffnessConfig::default();
        assert_eq!(filter_stiffness(Some(-0.2), &config), Some(0.0));
        assert_eq!(filter_stiffness(Some(-0.8), &config), None);
        assert_eq!(filter_stiffness(Some(150.0), &config), None);
        assert_eq!(filter_stiffness(Some(5.0), &config), Some(5.0));
        // the clamp interval is closed at neg_clamp
        assert_eq!(filter_stiffness(Some(-0.5), &config), Some(0.0));
        assert_eq!(filter_stiffness(Some(100.0), &config), Some(100.0));
        assert_eq!(filter_stiffness(Some(f64::NAN), &config), None);
        assert_eq!(filter_stiffness(None, &config), None);
    }

    #[test]
    fn test_stiff_ok() {
        let config = FeatureConfig::default();
        assert!(is_stiff_ok(HardpointTest::TestingPositive, Some(5.0), &config));
        assert!(is_stiff_ok(HardpointTest::MovingNegative, Some(0.0), &config));
        assert!(!is_stiff_ok(HardpointTest::TestingNegative, None, &config));
        assert!(!is_stiff_ok(HardpointTest::MovingReference, Some(5.0), &config));
    }
}
