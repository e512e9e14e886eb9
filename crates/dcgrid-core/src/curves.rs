//! Piecewise-linear curves: converter efficiency and droop control.
//!
//! Both curves interpolate linearly between points and clamp to the end values
//! outside the sampled range.

use crate::units::{Kilowatts, PerUnit};

/// Linear interpolation over points sorted by `x`, clamped at both ends.
///
/// Returns `None` for an empty point set.
pub fn interpolate(points: &[(f64, f64)], x: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if x <= first.0 {
        return Some(first.1);
    }
    if x >= last.0 {
        return Some(last.1);
    }
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x >= x0 && x <= x1 {
            if (x1 - x0).abs() < f64::EPSILON {
                return Some(y1);
            }
            return Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0));
        }
    }
    Some(last.1)
}

fn sorted_by_x(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

/// Efficiency as a function of absolute power through the converter.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyCurve {
    /// (power kW, efficiency fraction), ascending power
    points: Vec<(f64, f64)>,
}

/// Floor applied to interpolated efficiency so P/eff stays finite
const MIN_EFFICIENCY: f64 = 1e-3;

impl EfficiencyCurve {
    /// Lossless converter
    pub fn ideal() -> Self {
        Self {
            points: vec![(0.0, 1.0)],
        }
    }

    /// Build from absolute (kW, fraction) points.
    pub fn from_points(points: Vec<(f64, f64)>) -> Self {
        Self {
            points: sorted_by_x(points),
        }
    }

    /// Build from catalogue-style points: (% of nominal power, % efficiency).
    pub fn from_percent_points(points: &[[f64; 2]], nominal: Kilowatts) -> Self {
        Self::from_points(
            points
                .iter()
                .map(|[p, eff]| (p / 100.0 * nominal.value(), eff / 100.0))
                .collect(),
        )
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Efficiency fraction at `|power|`
    pub fn efficiency_at(&self, power: Kilowatts) -> f64 {
        interpolate(&self.points, power.value().abs())
            .unwrap_or(1.0)
            .max(MIN_EFFICIENCY)
    }

    /// Stretch the power axis from one rating to another.
    pub fn rescaled(&self, from: Kilowatts, to: Kilowatts) -> Self {
        if from.value().abs() < 1e-12 {
            return self.clone();
        }
        let factor = to.value() / from.value();
        Self {
            points: self.points.iter().map(|&(p, e)| (p * factor, e)).collect(),
        }
    }
}

/// Power scaling factor as a function of governing bus voltage.
///
/// Points are stored ascending by voltage, whatever order the input used.
#[derive(Debug, Clone, PartialEq)]
pub struct DroopCurve {
    points: Vec<(f64, f64)>,
}

impl DroopCurve {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self {
            points: sorted_by_x(points),
        }
    }

    pub fn from_pairs(pairs: &[[f64; 2]]) -> Self {
        Self::new(pairs.iter().map(|[v, s]| (*v, *s)).collect())
    }

    /// Flat unit curve used for droop-capable assets and PDUs without their own.
    pub fn default_asset() -> Self {
        Self::from_pairs(&[
            [1.5, 1.0],
            [1.1, 1.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [0.99, 1.0],
            [0.95, 1.0],
        ])
    }

    /// Curve installed on converters that do not participate in droop control.
    pub fn default_converter() -> Self {
        Self::from_pairs(&[
            [1.025, 1.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [0.975, 1.0],
        ])
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn scale_at(&self, voltage: PerUnit) -> f64 {
        interpolate(&self.points, voltage.value()).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interpolate_clamps_and_blends() {
        let pts = [(0.0, 0.0), (10.0, 1.0)];
        assert_eq!(interpolate(&pts, -5.0), Some(0.0));
        assert_eq!(interpolate(&pts, 15.0), Some(1.0));
        assert!((interpolate(&pts, 2.5).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(interpolate(&[], 1.0), None);
    }

    #[test]
    fn test_efficiency_from_percent_points() {
        let curve = EfficiencyCurve::from_percent_points(
            &[[10.0, 90.0], [50.0, 95.0], [100.0, 94.0]],
            Kilowatts(20.0),
        );
        // 10 kW is 50 % of 20 kW
        assert!((curve.efficiency_at(Kilowatts(10.0)) - 0.95).abs() < 1e-12);
        // absolute value of power
        assert!((curve.efficiency_at(Kilowatts(-10.0)) - 0.95).abs() < 1e-12);
        // below the first point clamps
        assert!((curve.efficiency_at(Kilowatts(0.1)) - 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_efficiency_rescale() {
        let curve = EfficiencyCurve::from_points(vec![(5.0, 0.9), (10.0, 0.95)]);
        let scaled = curve.rescaled(Kilowatts(10.0), Kilowatts(20.0));
        assert_eq!(scaled.points(), &[(10.0, 0.9), (20.0, 0.95)]);
    }

    #[test]
    fn test_efficiency_floor() {
        let curve = EfficiencyCurve::from_points(vec![(0.0, 0.0), (1.0, 0.0)]);
        assert!(curve.efficiency_at(Kilowatts(0.5)) > 0.0);
    }

    #[test]
    fn test_droop_curve_sorted_on_construction() {
        let curve = DroopCurve::from_pairs(&[[1.05, 0.0], [0.95, 1.0]]);
        assert_eq!(curve.points()[0].0, 0.95);
        assert!((curve.scale_at(PerUnit(1.0)) - 0.5).abs() < 1e-12);
        assert_eq!(curve.scale_at(PerUnit(1.2)), 0.0);
    }

    #[test]
    fn test_default_curves_are_flat() {
        for v in [0.9, 0.97, 1.0, 1.03, 1.2] {
            assert_eq!(DroopCurve::default_asset().scale_at(PerUnit(v)), 1.0);
            assert_eq!(DroopCurve::default_converter().scale_at(PerUnit(v)), 1.0);
        }
    }

    fn falling_curve() -> impl Strategy<Value = DroopCurve> {
        (2usize..8)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(0.8f64..1.2, n),
                    prop::collection::vec(0.0f64..=1.0, n),
                )
            })
            .prop_map(|(mut voltages, mut scales)| {
                voltages.sort_by(f64::total_cmp);
                scales.sort_by(|a, b| b.total_cmp(a));
                DroopCurve::new(voltages.into_iter().zip(scales).collect())
            })
    }

    proptest! {
        #[test]
        fn droop_scale_stays_in_unit_band_and_never_rises(
            curve in falling_curve(),
            samples in prop::collection::vec(0.7f64..1.3, 2..16),
        ) {
            let mut samples = samples;
            samples.sort_by(f64::total_cmp);
            let scales: Vec<f64> = samples.iter().map(|v| curve.scale_at(PerUnit(*v))).collect();
            for scale in &scales {
                prop_assert!((-1e-12..=1.0 + 1e-12).contains(scale), "scale {scale}");
            }
            for pair in scales.windows(2) {
                prop_assert!(pair[1] <= pair[0] + 1e-12, "{} then {}", pair[0], pair[1]);
            }
        }
    }
}
