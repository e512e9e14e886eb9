//! Engine tuning file.
//!
//! ```toml
//! [solver]
//! tolerance = 1e-6
//! max_iterations = 30
//! backend = "faer"
//!
//! [droop]
//! max_iterations = 200
//! relaxation = 0.4
//!
//! [pdu_clamp]
//! min = 0.98
//! max = 1.02
//! ```
//!
//! Every section and key is optional.

use anyhow::{Context, Result};
use dcgrid_algo::{
    DroopSettings, NewtonDcEmulation, PduSetpointClamp, PowerFlowOrchestrator, VoltageLimits,
};
use dcgrid_core::{DcGridResult, Network, SolverKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    /// PDU and asset droop loops, SOC band
    #[serde(default)]
    pub droop: DroopSettings,
    /// Band the downstream setpoint of a PDU is held to
    #[serde(default)]
    pub pdu_clamp: PduSetpointClamp,
}

/// Newton-Raphson settings of the subnetwork solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub backend: SolverKind,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            backend: SolverKind::default(),
        }
    }
}

fn default_tolerance() -> f64 {
    NewtonDcEmulation::new().tolerance
}

fn default_max_iterations() -> usize {
    NewtonDcEmulation::new().max_iterations
}

impl EngineConfig {
    pub fn solver(&self) -> NewtonDcEmulation {
        NewtonDcEmulation::new()
            .with_tolerance(self.solver.tolerance)
            .with_max_iterations(self.solver.max_iterations)
            .with_backend(self.solver.backend)
    }

    /// Orchestrator for `network` carrying every tuning knob of this file.
    pub fn orchestrator(
        &self,
        network: &Network,
        limits: VoltageLimits,
    ) -> DcGridResult<PowerFlowOrchestrator> {
        Ok(PowerFlowOrchestrator::new(network, Arc::new(self.solver()))?
            .with_settings(self.droop)
            .with_setpoint_clamp(self.pdu_clamp)
            .with_voltage_limits(limits))
    }
}

/// Load the engine configuration, or the defaults when no file is given.
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading engine config {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing engine config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::{Bus, BusId, ExtGridId, ExternalGrid, PerUnit, Volts};

    #[test]
    fn partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[solver]
backend = "faer"

[droop]
max_iterations = 50
"#,
        )
        .unwrap();
        assert_eq!(config.solver.backend, SolverKind::Faer);
        assert_eq!(config.solver.max_iterations, 30);
        assert_eq!(config.droop.max_iterations, 50);
        assert_eq!(config.droop.pdu_max_iterations, 100);
        assert_eq!(config.droop.soc_min_percent, 10.0);
    }

    #[test]
    fn pdu_clamp_reaches_the_orchestrator() {
        let config: EngineConfig = toml::from_str("[pdu_clamp]\nmin = 0.99\n").unwrap();
        assert_eq!(config.pdu_clamp.min, PerUnit(0.99));
        assert_eq!(config.pdu_clamp.max, PerUnit(1.02));

        let mut network = Network::new();
        network.add_bus(Bus::new(BusId::new(0), Volts(48.0)));
        network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
        let orchestrator = config
            .orchestrator(&network, VoltageLimits::odca())
            .unwrap();
        assert_eq!(orchestrator.setpoint_clamp(), config.pdu_clamp);
        assert_eq!(orchestrator.voltage_limits(), VoltageLimits::odca());
    }

    #[test]
    fn missing_path_gives_defaults() {
        let config = load_engine_config(None).unwrap();
        assert_eq!(config.droop, DroopSettings::default());
        assert_eq!(config.solver().backend, SolverKind::Gauss);
        assert_eq!(config.pdu_clamp, PduSetpointClamp::default());
    }
}
