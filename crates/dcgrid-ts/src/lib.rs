//! # dcgrid-ts: Time-Series Simulation
//!
//! Steps a DC network through a simulation horizon. Every step updates the
//! asset setpoints from their profiles, runs the droop-controlled load flow,
//! keeps a snapshot of the solved network and appends one row of results.
//!
//! - [`profile`] - synthetic per-step profiles from 24-hour base profiles
//! - [`simulator`] - the step loop
//! - [`results`] - flattened results table with CSV/Parquet export
//! - [`summary`] - energy balance and losses over the horizon

pub mod profile;
pub mod results;
pub mod simulator;
pub mod summary;

pub use profile::{ProfileCoefficients, ProfileGenerator};
pub use results::ResultsTable;
pub use simulator::{TimeSeriesRun, TimeSeriesSimulator};
pub use summary::EnergySummary;

use dcgrid_scenarios::SimulationSpec;

const MINUTES_PER_DAY: u32 = 1440;

/// Simulated period: `days` days at `step_minutes` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub step_minutes: u32,
    pub days: u32,
}

impl Horizon {
    /// Single steady-state step (one hour, no profile indexing)
    pub fn steady_state() -> Self {
        Self {
            step_minutes: 60,
            days: 0,
        }
    }

    pub fn steps_per_day(&self) -> usize {
        if self.step_minutes == 0 {
            return 0;
        }
        (MINUTES_PER_DAY / self.step_minutes) as usize
    }

    /// Number of simulated steps, at least one
    pub fn steps(&self) -> usize {
        (self.steps_per_day() * self.days as usize).max(1)
    }

    pub fn step_hours(&self) -> f64 {
        f64::from(self.step_minutes) / 60.0
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Self {
            step_minutes: 60,
            days: 1,
        }
    }
}

impl TryFrom<&SimulationSpec> for Horizon {
    type Error = anyhow::Error;

    fn try_from(spec: &SimulationSpec) -> anyhow::Result<Self> {
        spec.validate()?;
        Ok(Self {
            step_minutes: spec.step_minutes,
            days: spec.days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizon_steps() {
        let horizon = Horizon {
            step_minutes: 15,
            days: 2,
        };
        assert_eq!(horizon.steps_per_day(), 96);
        assert_eq!(horizon.steps(), 192);
        assert_eq!(horizon.step_hours(), 0.25);
        assert_eq!(Horizon::steady_state().steps(), 1);
    }

    #[test]
    fn test_horizon_from_simulation_spec() {
        let spec = SimulationSpec {
            step_minutes: 30,
            days: 3,
            seed: None,
        };
        let horizon = Horizon::try_from(&spec).unwrap();
        assert_eq!(horizon.steps(), 144);
        assert_eq!(horizon.step_hours(), 0.5);
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let spec = SimulationSpec {
            step_minutes: 0,
            days: 1,
            seed: Some(1),
        };
        let err = Horizon::try_from(&spec).unwrap_err();
        assert!(err.to_string().contains("step_minutes"));

        let empty = SimulationSpec {
            days: 0,
            ..SimulationSpec::default()
        };
        assert!(Horizon::try_from(&empty).is_err());
    }
}
