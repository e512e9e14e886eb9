//! Splitting a network into voltage-isolated subnetworks.
//!
//! Buses joined by lines form one subnetwork; converters are boundaries and
//! never traversed. The partition depends on topology only, so it is computed
//! once per run. The per-subnetwork copies are re-extracted at the start of
//! every orchestration pass and merged back at its end.

use crate::hierarchy::Link;
use dcgrid_core::{line_components, AssetOrigin, BusId, DcGridResult, GridOrigin, Network};
use std::collections::{HashMap, HashSet};

/// One voltage domain of the network
#[derive(Debug, Clone)]
pub struct Subnetwork {
    pub id: usize,
    /// Member buses in network insertion order
    pub buses: Vec<BusId>,
    /// Links to subnetworks closer to the slack source
    pub upstream_links: Vec<Link>,
    /// Links to subnetworks fed through this one
    pub downstream_links: Vec<Link>,
}

impl Subnetwork {
    pub fn is_single_bus(&self) -> bool {
        self.buses.len() == 1
    }
}

/// Partition of a network's buses into subnetworks.
#[derive(Debug, Clone)]
pub struct Decomposition {
    subnetworks: Vec<Subnetwork>,
    bus_to_subnet: HashMap<BusId, usize>,
}

impl Decomposition {
    /// Partition by line connectivity. Buses without a line become singleton
    /// subnetworks; every bus lands in exactly one subnetwork.
    pub fn new(network: &Network) -> Self {
        let mut bus_to_subnet = HashMap::new();
        let subnetworks = line_components(network)
            .into_iter()
            .enumerate()
            .map(|(id, buses)| {
                for bus in &buses {
                    bus_to_subnet.insert(*bus, id);
                }
                Subnetwork {
                    id,
                    buses,
                    upstream_links: Vec::new(),
                    downstream_links: Vec::new(),
                }
            })
            .collect();
        Self {
            subnetworks,
            bus_to_subnet,
        }
    }

    pub fn len(&self) -> usize {
        self.subnetworks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnetworks.is_empty()
    }

    pub fn subnetworks(&self) -> &[Subnetwork] {
        &self.subnetworks
    }

    pub(crate) fn subnetworks_mut(&mut self) -> &mut [Subnetwork] {
        &mut self.subnetworks
    }

    pub fn get(&self, id: usize) -> Option<&Subnetwork> {
        self.subnetworks.get(id)
    }

    pub fn subnetwork_of(&self, bus: BusId) -> Option<usize> {
        self.bus_to_subnet.get(&bus).copied()
    }

    /// Private copy of one subnetwork: its buses, the lines between them and
    /// every asset and external grid attached to them.
    pub fn extract(&self, network: &Network, id: usize) -> DcGridResult<Network> {
        let members: HashSet<BusId> = self
            .subnetworks
            .get(id)
            .map(|s| s.buses.iter().copied().collect())
            .unwrap_or_default();

        let mut copy = Network::new();
        for bus in network.buses().filter(|b| members.contains(&b.id)) {
            copy.add_bus(bus.clone());
        }
        for asset in network.assets().filter(|a| members.contains(&a.bus)) {
            copy.add_asset(asset.clone());
        }
        for grid in network.ext_grids().filter(|g| members.contains(&g.bus)) {
            copy.add_ext_grid(grid.clone());
        }
        for line in network.lines().filter(|l| members.contains(&l.from_bus)) {
            copy.add_line(line.clone())?;
        }
        Ok(copy)
    }

    /// Copies of all subnetworks, indexed by subnetwork id
    pub fn extract_all(&self, network: &Network) -> DcGridResult<Vec<Network>> {
        (0..self.subnetworks.len())
            .map(|id| self.extract(network, id))
            .collect()
    }

    /// Write solved subnetwork state back into the full network.
    ///
    /// Bus results, lines (including any cable change) and the results of
    /// modelled assets and grids are copied; the temporary grids and
    /// equivalent loads of converter emulation stay behind.
    pub fn merge(network: &mut Network, copies: &[Network]) {
        for copy in copies {
            for bus in copy.buses() {
                if let Some(target) = network.bus_mut(bus.id) {
                    target.voltage_pu = bus.voltage_pu;
                    target.power = bus.power;
                }
            }
            for line in copy.lines() {
                if let Some(target) = network.line_mut(line.id) {
                    *target = line.clone();
                }
            }
            for asset in copy.assets().filter(|a| a.origin == AssetOrigin::Modelled) {
                if let Some(target) = network.asset_mut(asset.id) {
                    target.result = asset.result;
                }
            }
            for grid in copy.ext_grids().filter(|g| g.origin == GridOrigin::Modelled) {
                if let Some(target) = network.ext_grids_mut().find(|g| g.id == grid.id) {
                    target.result = grid.result;
                }
            }
        }
    }
}
