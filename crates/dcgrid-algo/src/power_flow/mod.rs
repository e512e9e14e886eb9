//! # Subnetwork load flow
//!
//! Each subnetwork is a single DC voltage domain with one or more slack
//! sources. The orchestrator never solves the whole network at once; it hands
//! one subnetwork at a time to a [`SubnetworkSolver`].
//!
//! ## AC-equivalent emulation
//!
//! The solver contract is the one of a balanced three-phase AC engine fed with
//! purely resistive lines: consumptions go in multiplied by √3 and the
//! results come back as AC-equivalent quantities. [`correction`] translates
//! them into DC magnitudes:
//!
//! ```text
//!   P_dc    = P_ac / √3        (bus, element and line-end powers)
//!   Loss_dc = Loss_ac · 2/3    (line losses)
//!   I_dc    = I_ac             (line current)
//! ```
//!
//! With those factors the line current equals the DC load current and the
//! line loss equals the two-conductor loss 2·I²·R.
//!
//! ## Solving
//!
//! [`solve_subnetwork`] builds a [`SolveCase`] from a subnetwork copy, runs the
//! solver and writes the corrected results back onto the copy (bus voltages
//! and powers, line flows, asset and external-grid results).

mod correction;
mod newton;

pub use correction::{ac_equivalent, dc_line_loss, dc_power, SQRT_3};
pub use newton::NewtonDcEmulation;

use dcgrid_core::{
    Amperes, BusId, DcGridError, DcGridResult, Kilowatts, LineFlow, LineId, Network, PerUnit,
    Volts,
};
use std::collections::HashMap;

/// One bus of a solve case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseBus {
    pub id: BusId,
    pub nominal_voltage: Volts,
    /// AC-equivalent consumption (consumer convention)
    pub consumption: Kilowatts,
    /// Voltage setpoint when an in-service external grid sits on the bus
    pub slack: Option<PerUnit>,
}

/// One line of a solve case, endpoints as indices into [`SolveCase::buses`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaseLine {
    pub id: LineId,
    pub from: usize,
    pub to: usize,
    pub resistance_ohm: f64,
}

/// Solver input for a single subnetwork
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveCase {
    pub buses: Vec<CaseBus>,
    pub lines: Vec<CaseLine>,
}

impl SolveCase {
    /// Build the AC-equivalent case of a subnetwork copy.
    ///
    /// Fails when a line references a bus outside the copy or has a
    /// non-positive resistance.
    pub fn from_network(network: &Network) -> DcGridResult<Self> {
        let mut index = HashMap::new();
        let mut buses = Vec::new();
        for bus in network.buses() {
            index.insert(bus.id, buses.len());
            buses.push(CaseBus {
                id: bus.id,
                nominal_voltage: bus.nominal_voltage,
                consumption: Kilowatts::ZERO,
                slack: None,
            });
        }

        for asset in network.assets() {
            if let Some(&i) = index.get(&asset.bus) {
                buses[i].consumption = buses[i].consumption + ac_equivalent(asset.consumption());
            }
        }
        for grid in network.ext_grids().filter(|g| g.in_service) {
            if let Some(&i) = index.get(&grid.bus) {
                buses[i].slack.get_or_insert(grid.voltage_pu);
            }
        }

        let mut lines = Vec::new();
        for line in network.lines() {
            let (Some(&from), Some(&to)) = (index.get(&line.from_bus), index.get(&line.to_bus))
            else {
                return Err(DcGridError::Topology(format!(
                    "{} leaves its subnetwork",
                    line.name
                )));
            };
            let resistance_ohm = line.resistance_ohm();
            if !(resistance_ohm > 0.0) {
                return Err(DcGridError::Validation(format!(
                    "{} has resistance {resistance_ohm} Ω",
                    line.name
                )));
            }
            lines.push(CaseLine {
                id: line.id,
                from,
                to,
                resistance_ohm,
            });
        }

        Ok(Self { buses, lines })
    }

    pub fn has_slack(&self) -> bool {
        self.buses.iter().any(|b| b.slack.is_some())
    }
}

/// AC-equivalent flow on one line
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AcLineFlow {
    pub p_from: Kilowatts,
    pub p_to: Kilowatts,
    pub loss: Kilowatts,
    pub current: Amperes,
}

/// Solver output, indexed like the [`SolveCase`] it answers.
#[derive(Debug, Clone, Default)]
pub struct AcSolution {
    pub vm: Vec<PerUnit>,
    /// Net injection into the network at each bus (producer convention)
    pub injection: Vec<Kilowatts>,
    pub lines: Vec<AcLineFlow>,
    pub iterations: usize,
    pub max_mismatch: f64,
}

/// Numerical engine solving one subnetwork.
///
/// Implementations return [`DcGridError::NonConvergence`] when the iteration
/// fails; the sizing engine relies on that variant to reject a trial.
pub trait SubnetworkSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, case: &SolveCase) -> DcGridResult<AcSolution>;
}

/// Summary of one subnetwork solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub max_mismatch: f64,
}

/// Solve a subnetwork copy in place and write DC-corrected results onto it.
pub fn solve_subnetwork(
    solver: &dyn SubnetworkSolver,
    network: &mut Network,
) -> DcGridResult<SolveReport> {
    let case = SolveCase::from_network(network)?;
    let solution = solver.solve(&case)?;
    write_results(network, &case, &solution);
    Ok(SolveReport {
        iterations: solution.iterations,
        max_mismatch: solution.max_mismatch,
    })
}

fn write_results(network: &mut Network, case: &SolveCase, solution: &AcSolution) {
    let index: HashMap<BusId, usize> = case
        .buses
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id, i))
        .collect();

    for bus in network.buses_mut() {
        if let Some(&i) = index.get(&bus.id) {
            bus.voltage_pu = Some(solution.vm[i]);
            bus.power = -dc_power(solution.injection[i]);
        }
    }

    let mut grids_per_bus: HashMap<BusId, usize> = HashMap::new();
    for grid in network.ext_grids().filter(|g| g.in_service) {
        *grids_per_bus.entry(grid.bus).or_default() += 1;
    }
    for grid in network.ext_grids_mut() {
        grid.result = match (grid.in_service, index.get(&grid.bus)) {
            (true, Some(&i)) => {
                let supplied = solution.injection[i] + case.buses[i].consumption;
                let sharing = grids_per_bus.get(&grid.bus).copied().unwrap_or(1) as f64;
                Some(dc_power(supplied) / sharing)
            }
            _ => Some(Kilowatts::ZERO),
        };
    }

    for asset in network.assets_mut() {
        asset.result = Some(if asset.in_service {
            asset.power
        } else {
            Kilowatts::ZERO
        });
    }

    let flows: HashMap<LineId, AcLineFlow> = case
        .lines
        .iter()
        .zip(&solution.lines)
        .map(|(line, flow)| (line.id, *flow))
        .collect();
    let vm: HashMap<BusId, PerUnit> = case
        .buses
        .iter()
        .zip(&solution.vm)
        .map(|(b, v)| (b.id, *v))
        .collect();
    for line in network.lines_mut() {
        let Some(flow) = flows.get(&line.id) else {
            continue;
        };
        line.flow = Some(LineFlow {
            p_from: dc_power(flow.p_from),
            p_to: dc_power(flow.p_to),
            loss: dc_line_loss(flow.loss),
            current: flow.current,
            loading_percent: flow.current.loading_percent(line.max_current),
            vm_from: vm.get(&line.from_bus).copied().unwrap_or(PerUnit::ONE),
            vm_to: vm.get(&line.to_bus).copied().unwrap_or(PerUnit::ONE),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::{Asset, AssetId, AssetKind, Bus, ExtGridId, ExternalGrid, Line};

    fn feeder(load_kw: f64) -> Network {
        let mut network = Network::new();
        network.add_bus(Bus::new(BusId::new(0), Volts(48.0)));
        network.add_bus(Bus::new(BusId::new(1), Volts(48.0)));
        network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
        network.add_asset(Asset::new(
            AssetId::new(0),
            "load 1",
            BusId::new(1),
            AssetKind::Load,
            Kilowatts(load_kw),
        ));
        network
            .add_line(Line::new(LineId::new(0), BusId::new(0), BusId::new(1), 100.0, 0.001))
            .unwrap();
        network
    }

    #[test]
    fn test_case_scales_consumption() {
        let case = SolveCase::from_network(&feeder(1.0)).unwrap();
        assert_eq!(case.buses.len(), 2);
        assert_eq!(case.buses[0].slack, Some(PerUnit::ONE));
        assert!((case.buses[1].consumption.value() - SQRT_3).abs() < 1e-12);
        assert!((case.lines[0].resistance_ohm - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_case_rejects_zero_resistance() {
        let mut network = feeder(1.0);
        for line in network.lines_mut() {
            line.resistance_ohm_per_m = 0.0;
        }
        let err = SolveCase::from_network(&network).unwrap_err();
        assert!(matches!(err, DcGridError::Validation(_)));
    }

    #[test]
    fn test_solve_writes_dc_results() {
        let mut network = feeder(1.0);
        let solver = NewtonDcEmulation::default();
        solve_subnetwork(&solver, &mut network).unwrap();

        let grid = network.ext_grids().next().unwrap();
        let supplied = grid.result.unwrap().value();
        let load = network.assets().next().unwrap();
        assert_eq!(load.result, Some(Kilowatts(1.0)));
        // Grid covers the load plus something for the cable
        assert!(supplied > 1.0 && supplied < 1.2, "supplied {supplied}");

        let line = network.lines().next().unwrap();
        let flow = line.flow.unwrap();
        assert!(flow.p_from.value() > 0.0);
        assert!(flow.p_to.value() < 0.0);
        assert!(flow.loss.value() > 0.0);
        assert_eq!(flow.vm_from, PerUnit::ONE);
    }
}
