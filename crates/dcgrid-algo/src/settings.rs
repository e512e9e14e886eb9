//! Tunable constants of the orchestration loops and sizing engine.
//!
//! Every struct deserializes with `#[serde(default)]` so an engine
//! configuration file only needs the values it overrides.

use dcgrid_core::PerUnit;
use serde::{Deserialize, Serialize};

/// Iteration controls of the PDU and asset droop loops, plus storage SOC bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroopSettings {
    /// Stop threshold for the summed PDU voltage mismatch and its change
    pub pdu_tolerance: f64,
    pub pdu_max_iterations: usize,
    /// Weight of the newest solve in the relaxed voltage estimate (α)
    pub relaxation: f64,
    /// Stop threshold for the largest relative voltage change, in percent
    pub tolerance_percent: f64,
    pub max_iterations: usize,
    pub soc_min_percent: f64,
    pub soc_max_percent: f64,
}

impl Default for DroopSettings {
    fn default() -> Self {
        Self {
            pdu_tolerance: 1e-8,
            pdu_max_iterations: 100,
            relaxation: 0.4,
            tolerance_percent: 1e-2,
            max_iterations: 200,
            soc_min_percent: 10.0,
            soc_max_percent: 95.0,
        }
    }
}

/// Range the downstream setpoint of a PDU may take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PduSetpointClamp {
    pub min: PerUnit,
    pub max: PerUnit,
}

impl Default for PduSetpointClamp {
    fn default() -> Self {
        Self {
            min: PerUnit(0.98),
            max: PerUnit(1.02),
        }
    }
}

impl PduSetpointClamp {
    pub fn apply(&self, voltage: PerUnit) -> PerUnit {
        voltage.clamp(self.min, self.max)
    }
}

/// Admissible bus voltage band of an ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageLimits {
    pub min: PerUnit,
    pub max: PerUnit,
}

impl Default for VoltageLimits {
    fn default() -> Self {
        Self::current_os()
    }
}

impl VoltageLimits {
    pub fn current_os() -> Self {
        Self {
            min: PerUnit(0.98),
            max: PerUnit(1.02),
        }
    }

    pub fn odca() -> Self {
        Self {
            min: PerUnit(0.95),
            max: PerUnit(1.05),
        }
    }

    pub fn custom(min: PerUnit, max: PerUnit) -> Self {
        Self { min, max }
    }
}

/// Safety margins applied by the sizing engine, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingMargins {
    pub cable_percent: f64,
    pub ac_dc_percent: f64,
    pub other_converter_percent: f64,
}

impl Default for SizingMargins {
    fn default() -> Self {
        Self {
            cable_percent: 10.0,
            ac_dc_percent: 20.0,
            other_converter_percent: 10.0,
        }
    }
}

impl SizingMargins {
    /// Highest cable loading a trial may reach
    pub fn cable_loading_limit(&self) -> f64 {
        100.0 * (1.0 - self.cable_percent / 100.0)
    }

    /// Fraction of a catalogue rating usable for the given converter type
    pub fn converter_usable_fraction(&self, kind: dcgrid_core::ConverterKind) -> f64 {
        let margin = if kind.is_ac_dc() {
            self.ac_dc_percent
        } else {
            self.other_converter_percent
        };
        1.0 - margin / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::ConverterKind;

    #[test]
    fn test_partial_droop_settings_keep_defaults() {
        let settings: DroopSettings = serde_json::from_str(r#"{"max_iterations": 50}"#).unwrap();
        assert_eq!(settings.max_iterations, 50);
        assert_eq!(settings.pdu_max_iterations, 100);
        assert_eq!(settings.relaxation, 0.4);
    }

    #[test]
    fn test_pdu_clamp() {
        let clamp = PduSetpointClamp::default();
        assert_eq!(clamp.apply(PerUnit(0.9)), PerUnit(0.98));
        assert_eq!(clamp.apply(PerUnit(1.01)), PerUnit(1.01));
        assert_eq!(clamp.apply(PerUnit(1.2)), PerUnit(1.02));
    }

    #[test]
    fn test_margins() {
        let margins = SizingMargins {
            cable_percent: 20.0,
            ac_dc_percent: 30.0,
            other_converter_percent: 5.0,
        };
        assert!((margins.cable_loading_limit() - 80.0).abs() < 1e-12);
        assert!((margins.converter_usable_fraction(ConverterKind::AcDc) - 0.7).abs() < 1e-12);
        assert!((margins.converter_usable_fraction(ConverterKind::Pdu) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_ecosystem_limits() {
        assert_eq!(VoltageLimits::odca().min, PerUnit(0.95));
        assert_eq!(VoltageLimits::default(), VoltageLimits::current_os());
    }
}
