//! Cable sizing inside one subnetwork.
//!
//! Lines are visited closest-to-slack first. Each line steps down the
//! catalogue while the trial stays within loading and voltage limits, then
//! every line between it and the slack is bumped until none is smaller.

use super::TrialOutcome;
use crate::power_flow::{solve_subnetwork, SubnetworkSolver};
use dcgrid_core::{
    bus_distances, shortest_line_path, BusId, CableCatalogue, DcGridResult, LineId, Network,
    PerUnit,
};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CableStats {
    pub resized: usize,
    pub bumps: usize,
}

pub struct CableSizer<'a> {
    solver: &'a dyn SubnetworkSolver,
    catalogue: &'a CableCatalogue,
    /// Loading limit in percent of ampacity
    loading_limit: f64,
    min_voltage: PerUnit,
}

impl<'a> CableSizer<'a> {
    pub fn new(
        solver: &'a dyn SubnetworkSolver,
        catalogue: &'a CableCatalogue,
        loading_limit: f64,
        min_voltage: PerUnit,
    ) -> Self {
        Self {
            solver,
            catalogue,
            loading_limit,
            min_voltage,
        }
    }

    /// Size every ranked line of `network` and leave it solved.
    pub fn size(&self, network: &mut Network, stats: &mut CableStats) -> DcGridResult<()> {
        solve_subnetwork(self.solver, network)?;

        let sources: Vec<BusId> = network
            .ext_grids()
            .filter(|g| g.in_service)
            .map(|g| g.bus)
            .collect();
        let distances = bus_distances(network, &sources);
        for line in network.lines_mut() {
            let hops = |bus| distances.get(&bus).copied().unwrap_or(usize::MAX);
            line.distance = Some(hops(line.from_bus).min(hops(line.to_bus)));
        }

        let mut order: Vec<(usize, LineId)> = network
            .lines()
            .filter(|l| l.cable_rank.is_some())
            .map(|l| (l.distance.unwrap_or(usize::MAX), l.id))
            .collect();
        order.sort_by_key(|&(distance, _)| distance);

        for (_, id) in order {
            self.adjust_single_cable(network, id, stats)?;
            if let Some(&slack) = sources.first() {
                self.enforce_consistency(network, id, slack, &distances, stats)?;
            }
        }
        Ok(())
    }

    /// Step one line down the catalogue until a trial breaks a limit or fails,
    /// then settle on the last size that held.
    fn adjust_single_cable(
        &self,
        network: &mut Network,
        id: LineId,
        stats: &mut CableStats,
    ) -> DcGridResult<()> {
        let Some(line) = network.line(id) else {
            return Ok(());
        };
        let Some(initial) = line.cable_rank else {
            return Ok(());
        };
        // the receiving end is fixed by the flow at the initial size
        let key_bus = match &line.flow {
            Some(flow) if flow.p_from.value() > 0.0 => line.to_bus,
            _ => line.from_bus,
        };

        let mut feasible = initial;
        let mut holds = self.within_limits(network, id, key_bus);
        while holds && feasible > 0 {
            let candidate = feasible - 1;
            self.install(network, id, candidate);
            match TrialOutcome::solve(self.solver, network)? {
                TrialOutcome::Converged => {
                    holds = self.within_limits(network, id, key_bus);
                    if holds {
                        feasible = candidate;
                    }
                }
                TrialOutcome::Failed(reason) => {
                    debug!(line = id.value(), candidate, %reason, "cable trial failed");
                    holds = false;
                }
            }
        }

        if network.line(id).and_then(|l| l.cable_rank) != Some(feasible) {
            self.install(network, id, feasible);
            solve_subnetwork(self.solver, network)?;
        }
        if feasible != initial {
            stats.resized += 1;
            debug!(line = id.value(), from = initial, to = feasible, "cable sized");
        }
        Ok(())
    }

    /// Bump every line between `id` and the slack that is smaller than `id`,
    /// one catalogue step per sweep, until a sweep changes nothing.
    fn enforce_consistency(
        &self,
        network: &mut Network,
        id: LineId,
        slack: BusId,
        distances: &HashMap<BusId, usize>,
        stats: &mut CableStats,
    ) -> DcGridResult<()> {
        let Some(line) = network.line(id) else {
            return Ok(());
        };
        let Some(rank) = line.cable_rank else {
            return Ok(());
        };
        let hops = |bus| distances.get(&bus).copied().unwrap_or(usize::MAX);
        let start = if hops(line.from_bus) <= hops(line.to_bus) {
            line.from_bus
        } else {
            line.to_bus
        };
        let path: Vec<LineId> = shortest_line_path(network, start, slack)
            .unwrap_or_default()
            .into_iter()
            .filter(|&other| other != id)
            .collect();

        loop {
            let mut bumped = false;
            for &other in &path {
                let Some(current) = network.line(other).and_then(|l| l.cable_rank) else {
                    continue;
                };
                if current < rank && self.install(network, other, current + 1) {
                    stats.bumps += 1;
                    bumped = true;
                }
            }
            if !bumped {
                return Ok(());
            }
            solve_subnetwork(self.solver, network)?;
        }
    }

    fn install(&self, network: &mut Network, id: LineId, rank: usize) -> bool {
        match (network.line_mut(id), self.catalogue.get(rank)) {
            (Some(line), Some(cable)) => {
                line.apply_cable(rank, cable);
                true
            }
            _ => false,
        }
    }

    fn within_limits(&self, network: &Network, id: LineId, key_bus: BusId) -> bool {
        let loading = network
            .line(id)
            .and_then(|l| l.flow.as_ref())
            .map_or(0.0, |f| f.loading_percent);
        let voltage = network
            .bus(key_bus)
            .and_then(|b| b.voltage_pu)
            .unwrap_or(PerUnit::ONE);
        loading < self.loading_limit && voltage > self.min_voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_flow::NewtonDcEmulation;
    use dcgrid_core::*;

    fn catalogue() -> CableCatalogue {
        CableCatalogue::from_specs(
            [(1.5, 0.0121, 20.0), (4.0, 0.0046, 36.0), (10.0, 0.0018, 63.0), (25.0, 0.0007, 110.0)]
                .into_iter()
                .map(|(section, r, imax)| CableSpec {
                    section_mm2: section,
                    resistance_ohm_per_m: r,
                    max_current: Amperes(imax),
                })
                .collect(),
        )
    }

    /// grid 0 -- 1 -- 2 with loads on 1 and 2, all lines at the largest cable
    fn feeder(catalogue: &CableCatalogue, load_kw: f64) -> Network {
        let largest = catalogue.largest_rank().unwrap();
        let mut network = Network::new();
        for id in 0..3 {
            network.add_bus(Bus::new(BusId::new(id), Volts(400.0)));
        }
        network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
        for (id, (a, b)) in [(0, 1), (1, 2)].into_iter().enumerate() {
            network
                .add_line(
                    Line::new(LineId::new(id), BusId::new(a), BusId::new(b), 30.0, 0.0)
                        .with_cable(largest, catalogue.get(largest).unwrap()),
                )
                .unwrap();
        }
        for bus in [1, 2] {
            network.add_asset(Asset::new(
                AssetId::new(bus),
                format!("load {bus}"),
                BusId::new(bus),
                AssetKind::Load,
                Kilowatts(load_kw),
            ));
        }
        network
    }

    fn sizer<'a>(solver: &'a NewtonDcEmulation, catalogue: &'a CableCatalogue) -> CableSizer<'a> {
        CableSizer::new(solver, catalogue, 90.0, PerUnit(0.98))
    }

    #[test]
    fn test_light_feeder_shrinks_to_smallest_cable() {
        let catalogue = catalogue();
        let solver = NewtonDcEmulation::default();
        let mut network = feeder(&catalogue, 0.5);
        let mut stats = CableStats::default();
        sizer(&solver, &catalogue).size(&mut network, &mut stats).unwrap();

        assert!(network.lines().all(|l| l.cable_rank == Some(0)));
        assert_eq!(stats.resized, 2);
        assert_eq!(stats.bumps, 0);
        assert_eq!(network.line(LineId::new(0)).unwrap().distance, Some(0));
        assert_eq!(network.line(LineId::new(1)).unwrap().distance, Some(1));
    }

    #[test]
    fn test_sized_lines_respect_loading_limit() {
        let catalogue = catalogue();
        let solver = NewtonDcEmulation::default();
        let mut network = feeder(&catalogue, 6.0);
        sizer(&solver, &catalogue)
            .size(&mut network, &mut CableStats::default())
            .unwrap();

        for line in network.lines() {
            let flow = line.flow.unwrap();
            assert!(flow.loading_percent < 90.0, "{line:?}");
        }
        let feeder_rank = network.line(LineId::new(0)).unwrap().cable_rank;
        let branch_rank = network.line(LineId::new(1)).unwrap().cable_rank;
        assert!(feeder_rank >= branch_rank);
        // the feeder carries twice the current and cannot shrink as far
        assert!(feeder_rank > Some(0));
    }

    #[test]
    fn test_consistency_bumps_smaller_feeder() {
        let catalogue = catalogue();
        let solver = NewtonDcEmulation::default();
        let mut network = feeder(&catalogue, 0.5);
        // feeder pinned small, branch large
        network.line_mut(LineId::new(0)).unwrap().apply_cable(0, catalogue.get(0).unwrap());
        let mut stats = CableStats::default();
        let sizer = sizer(&solver, &catalogue);
        solve_subnetwork(&solver, &mut network).unwrap();
        let distances = bus_distances(&network, &[BusId::new(0)]);
        sizer
            .enforce_consistency(&mut network, LineId::new(1), BusId::new(0), &distances, &mut stats)
            .unwrap();

        assert_eq!(network.line(LineId::new(0)).unwrap().cable_rank, Some(3));
        assert_eq!(stats.bumps, 3);
    }
}
