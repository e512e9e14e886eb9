//! # Hierarchical load-flow orchestration
//!
//! A pass solves every subnetwork once, leaves before their feeders:
//!
//! ```text
//!   for S in downstream-first order:
//!     1. a temporary external grid per upstream link of S, at the converter terminal
//!     2. solve S, DC-corrected
//!     3. single-bus S: bus power taken from the attached element
//!     4. per upstream link: grid power through the converter → equivalent load upstream
//!   merge copies into the network, temporaries dropped
//! ```
//!
//! PDU links take their temporary grid setpoint from the upstream terminal
//! voltage of the previous pass, so a single pass is not enough once PDUs are
//! present. [`PowerFlowOrchestrator::run_pdu_loop`] repeats passes until the
//! voltages on both sides of every PDU agree.

use crate::converter::ConverterTransfer;
use crate::decompose::{Decomposition, Subnetwork};
use crate::hierarchy::{Hierarchy, HierarchyResolver, Link};
use crate::power_flow::{solve_subnetwork, SubnetworkSolver};
use crate::settings::{DroopSettings, PduSetpointClamp, VoltageLimits};
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{
    Asset, AssetKind, AssetOrigin, BusId, ConverterId, DcGridError, DcGridResult, Diagnostics,
    ExternalGrid, GridOrigin, Kilowatts, Network, PerUnit,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a pass treats converters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// PDU links follow the upstream voltage instead of a flat 1.0 p.u.
    pub pdu_setpoints: bool,
    pub include_standby: bool,
}

impl PassOptions {
    /// Normal operation
    pub const OPERATION: Self = Self {
        pdu_setpoints: true,
        include_standby: true,
    };
    /// Flat setpoints, standby counted (converter sizing)
    pub const SIZING: Self = Self {
        pdu_setpoints: false,
        include_standby: true,
    };
    /// Flat setpoints, no standby (cable trials)
    pub const CABLE_TRIAL: Self = Self {
        pdu_setpoints: false,
        include_standby: false,
    };
}

/// Outcome of the PDU fixed-point loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PduLoopReport {
    pub passes: usize,
    /// Σ |setpoint target − downstream terminal voltage| over PDU links
    pub deviation: f64,
    pub converged: bool,
}

pub struct PowerFlowOrchestrator {
    solver: Arc<dyn SubnetworkSolver>,
    decomposition: Decomposition,
    hierarchy: Hierarchy,
    settings: DroopSettings,
    clamp: PduSetpointClamp,
    limits: VoltageLimits,
}

impl PowerFlowOrchestrator {
    /// Decompose `network` and resolve its hierarchy. Topology is fixed for the
    /// run, so the result is reused for every pass, timestep and sizing trial.
    pub fn new(network: &Network, solver: Arc<dyn SubnetworkSolver>) -> DcGridResult<Self> {
        let mut decomposition = Decomposition::new(network);
        let hierarchy = HierarchyResolver::resolve(network, &mut decomposition)?;
        debug!(
            subnetworks = decomposition.len(),
            root = hierarchy.root(),
            solver = solver.name(),
            "orchestrator ready"
        );
        Ok(Self {
            solver,
            decomposition,
            hierarchy,
            settings: DroopSettings::default(),
            clamp: PduSetpointClamp::default(),
            limits: VoltageLimits::default(),
        })
    }

    pub fn with_settings(mut self, settings: DroopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setpoint_clamp(mut self, clamp: PduSetpointClamp) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn with_voltage_limits(mut self, limits: VoltageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn solver(&self) -> &Arc<dyn SubnetworkSolver> {
        &self.solver
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn settings(&self) -> &DroopSettings {
        &self.settings
    }

    pub fn voltage_limits(&self) -> VoltageLimits {
        self.limits
    }

    pub fn setpoint_clamp(&self) -> PduSetpointClamp {
        self.clamp
    }

    /// PDU loop followed by the high-voltage check.
    pub fn solve(&self, network: &mut Network, diag: &mut Diagnostics) -> DcGridResult<PduLoopReport> {
        let report = self.run_pdu_loop(network)?;
        if !report.converged {
            diag.add_warning(
                categories::CONVERGENCE,
                &format!(
                    "PDU loop stopped after {} passes with deviation {:.3e}",
                    report.passes, report.deviation
                ),
            );
        }
        self.check_high_voltage(network, diag);
        Ok(report)
    }

    /// One pass over all subnetworks with the plain subnetwork solve.
    pub fn run_pass(&self, network: &mut Network, options: PassOptions) -> DcGridResult<()> {
        let solver = self.solver.as_ref();
        self.run_pass_with(network, options, |_, subnet| {
            solve_subnetwork(solver, subnet).map(|_| ())
        })
    }

    /// One pass where `solve` replaces the plain subnetwork solve.
    ///
    /// `solve` receives the subnetwork id and its copy with the temporary grids
    /// already installed; it must leave solved results on the copy.
    pub fn run_pass_with<F>(
        &self,
        network: &mut Network,
        options: PassOptions,
        mut solve: F,
    ) -> DcGridResult<()>
    where
        F: FnMut(usize, &mut Network) -> DcGridResult<()>,
    {
        let previous: HashMap<BusId, PerUnit> = network
            .buses()
            .filter_map(|b| b.voltage_pu.map(|v| (b.id, v)))
            .collect();
        let mut copies = self.decomposition.extract_all(network)?;

        for &id in self.hierarchy.order() {
            let subnet = &self.decomposition.subnetworks()[id];
            self.install_link_grids(&mut copies[id], subnet, network, &previous, options)?;
            solve(id, &mut copies[id]).map_err(|err| in_subnetwork(err, id))?;
            if subnet.is_single_bus() {
                forward_single_bus(&mut copies[id]);
            }

            for link in &subnet.upstream_links {
                let requested = emulation_supply(&copies[id], link.converter);
                let converter = network.converter_mut(link.converter).ok_or_else(|| {
                    DcGridError::Topology(format!("unknown converter {}", link.converter.value()))
                })?;
                let transfer =
                    ConverterTransfer::through(converter, requested, options.include_standby);
                converter.flow = Some(transfer.flow());
                install_equivalent_load(&mut copies[link.remote], id, link, transfer.upstream);
            }
        }

        Decomposition::merge(network, &copies);
        Ok(())
    }

    /// Repeat passes until both terminals of every PDU agree, or the cap is hit.
    ///
    /// Networks without PDU links need exactly one pass.
    pub fn run_pdu_loop(&self, network: &mut Network) -> DcGridResult<PduLoopReport> {
        let pdu_links = self.pdu_links(network);
        if pdu_links.is_empty() {
            self.run_pass(network, PassOptions::OPERATION)?;
            return Ok(PduLoopReport {
                passes: 1,
                deviation: 0.0,
                converged: true,
            });
        }

        let tolerance = self.settings.pdu_tolerance;
        let mut previous = f64::INFINITY;
        let mut deviation = f64::INFINITY;
        for pass in 1..=self.settings.pdu_max_iterations {
            self.run_pass(network, PassOptions::OPERATION)?;
            deviation = self.pdu_deviation(network, &pdu_links);
            if deviation < tolerance && (deviation - previous).abs() < tolerance {
                return Ok(PduLoopReport {
                    passes: pass,
                    deviation,
                    converged: true,
                });
            }
            previous = deviation;
        }

        warn!(
            passes = self.settings.pdu_max_iterations,
            deviation, "PDU loop reached its iteration cap"
        );
        Ok(PduLoopReport {
            passes: self.settings.pdu_max_iterations,
            deviation,
            converged: false,
        })
    }

    /// Warn about buses above the upper voltage limit that no generator feeds
    /// through a converter.
    pub fn check_high_voltage(&self, network: &Network, diag: &mut Diagnostics) {
        for (bus, vm) in network.high_voltage_buses(self.limits.max) {
            warn!(%bus, voltage = vm.value(), limit = self.limits.max.value(), "high voltage");
            diag.add_warning_with_entity(
                categories::VOLTAGE,
                &format!(
                    "voltage {:.4} p.u. above the {:.4} p.u. limit",
                    vm.value(),
                    self.limits.max.value()
                ),
                &bus.to_string(),
            );
        }
    }

    /// (upstream terminal, downstream terminal) of every PDU link
    fn pdu_links(&self, network: &Network) -> Vec<(BusId, BusId)> {
        self.decomposition
            .subnetworks()
            .iter()
            .flat_map(|s| s.upstream_links.iter())
            .filter(|link| {
                network
                    .converter(link.converter)
                    .is_some_and(|c| c.kind.is_droop_controlled())
            })
            .map(|link| (link.remote_bus, link.local_bus))
            .collect()
    }

    fn pdu_deviation(&self, network: &Network, links: &[(BusId, BusId)]) -> f64 {
        let vm = |bus: BusId| {
            network
                .bus(bus)
                .and_then(|b| b.voltage_pu)
                .unwrap_or(PerUnit::ONE)
        };
        links
            .iter()
            .map(|&(up, down)| (self.clamp.apply(vm(up)) - vm(down)).value().abs())
            .sum()
    }

    fn install_link_grids(
        &self,
        copy: &mut Network,
        subnet: &Subnetwork,
        network: &Network,
        previous: &HashMap<BusId, PerUnit>,
        options: PassOptions,
    ) -> DcGridResult<()> {
        for link in &subnet.upstream_links {
            let converter = network.converter(link.converter).ok_or_else(|| {
                DcGridError::Topology(format!("unknown converter {}", link.converter.value()))
            })?;
            let setpoint = if options.pdu_setpoints && converter.kind.is_droop_controlled() {
                self.clamp
                    .apply(previous.get(&link.remote_bus).copied().unwrap_or(PerUnit::ONE))
            } else {
                PerUnit::ONE
            };

            let origin = GridOrigin::ConverterEmulation {
                converter: link.converter,
            };
            if let Some(grid) = copy.ext_grids_mut().find(|g| g.origin == origin) {
                grid.voltage_pu = setpoint;
                continue;
            }
            let id = copy.next_ext_grid_id();
            copy.add_ext_grid(ExternalGrid {
                name: format!("{} (upstream)", converter.name),
                voltage_pu: setpoint,
                origin,
                ..ExternalGrid::new(id, link.local_bus)
            });
        }
        Ok(())
    }
}

/// Keep the variant (sizing trials match on it) and name the subnetwork.
fn in_subnetwork(err: DcGridError, id: usize) -> DcGridError {
    match err {
        DcGridError::NonConvergence {
            context,
            iterations,
            mismatch,
        } => DcGridError::non_convergence(format!("subnetwork {id}: {context}"), iterations, mismatch),
        other => other,
    }
}

/// Power supplied by the temporary grid standing in for `converter`
fn emulation_supply(copy: &Network, converter: ConverterId) -> Kilowatts {
    copy.ext_grids()
        .find(|g| g.origin == GridOrigin::ConverterEmulation { converter })
        .and_then(|g| g.result)
        .unwrap_or(Kilowatts::ZERO)
}

/// A bus without lines reports the power exchanged with its attached elements.
fn forward_single_bus(copy: &mut Network) {
    let supplied: Option<Kilowatts> = copy
        .ext_grids()
        .filter(|g| g.in_service)
        .filter_map(|g| g.result)
        .reduce(|a, b| a + b);
    let power = supplied.unwrap_or_else(|| copy.assets().map(|a| a.consumption()).sum());
    for bus in copy.buses_mut() {
        bus.power = power;
    }
}

fn install_equivalent_load(copy: &mut Network, downstream: usize, link: &Link, power: Kilowatts) {
    let origin = AssetOrigin::ConverterEquivalent {
        subnetwork: downstream,
        converter: link.converter,
    };
    if let Some(asset) = copy.assets_mut().find(|a| a.origin == origin) {
        asset.power = power;
        asset.nominal_power = power;
        return;
    }
    let id = copy.next_asset_id();
    copy.add_asset(Asset {
        origin,
        ..Asset::new(
            id,
            format!("load of subnetwork {downstream}"),
            link.remote_bus,
            AssetKind::Load,
            power,
        )
    });
}
