//! # dcgrid-core: DC Distribution Network Model
//!
//! Data structures for low-voltage DC distribution planning (buildings, ships,
//! data-center power trains).
//!
//! ## Design Philosophy
//!
//! A network is an **undirected multigraph**:
//! - **Nodes**: buses, attached assets (loads, generators, storage) and external grids
//! - **Edges**: cables ([`Line`]) and power converters ([`Converter`])
//!
//! Assets and external grids are isolated nodes that reference their bus by id,
//! so topology queries only ever walk bus-to-bus edges. Converters are the only
//! edges allowed to cross voltage domains; removing them splits the graph into
//! the subnetworks solved one at a time by `dcgrid-algo`.
//!
//! ## Quick Start
//!
//! ```rust
//! use dcgrid_core::*;
//!
//! let mut network = Network::new();
//! network.add_bus(Bus::new(BusId::new(0), Volts(48.0)));
//! network.add_bus(Bus::new(BusId::new(1), Volts(48.0)));
//!
//! network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
//! network.add_asset(Asset::new(
//!     AssetId::new(0),
//!     "load 1",
//!     BusId::new(1),
//!     AssetKind::Load,
//!     Kilowatts(1.0),
//! ));
//! network
//!     .add_line(Line::new(LineId::new(0), BusId::new(0), BusId::new(1), 10.0, 0.01))
//!     .unwrap();
//!
//! assert_eq!(network.stats().num_buses, 2);
//! ```
//!
//! ## Modules
//!
//! - [`builder`] - network construction from a serde input document
//! - [`catalogue`] - cable and converter catalogues
//! - [`curves`] - piecewise-linear efficiency and droop curves
//! - [`diagnostics`] - soft-warning collection
//! - [`graph_utils`] - line-only components, BFS distances, shortest paths
//! - [`solver`] - dense linear-system backends for Newton iterations

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod builder;
pub mod catalogue;
pub mod curves;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod solver;
pub mod units;

pub use builder::{DeviceOverrides, NetworkBuilder, NetworkInput};
pub use catalogue::{CableCatalogue, CableSpec, ConductorParams, ConverterCatalogue, ConverterSpec};
pub use curves::{DroopCurve, EfficiencyCurve};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{DcGridError, DcGridResult};
pub use graph_utils::*;
pub use petgraph::graph::NodeIndex;
pub use solver::*;
pub use units::{Amperes, Kilowatts, PerUnit, Volts};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConverterId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtGridId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LineId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LineId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl ConverterId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ConverterId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl AssetId {
    #[inline]
    pub fn new(value: usize) -> Self {
        AssetId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl ExtGridId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ExtGridId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bus {}", self.0)
    }
}

// ============================================================================
// Buses
// ============================================================================

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Nominal DC voltage; 0 V until inherited from the subnetwork
    pub nominal_voltage: Volts,
    /// Solved voltage magnitude, `None` before the first load flow
    pub voltage_pu: Option<PerUnit>,
    /// Net power drawn at the bus (consumer convention)
    pub power: Kilowatts,
}

impl Bus {
    pub fn new(id: BusId, nominal_voltage: Volts) -> Self {
        Self {
            id,
            name: format!("Bus {}", id.value()),
            nominal_voltage,
            voltage_pu: None,
            power: Kilowatts::ZERO,
        }
    }
}

// ============================================================================
// Lines (cables)
// ============================================================================

/// Solved flow on a cable, in DC magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineFlow {
    pub p_from: Kilowatts,
    pub p_to: Kilowatts,
    pub loss: Kilowatts,
    pub current: Amperes,
    pub loading_percent: f64,
    pub vm_from: PerUnit,
    pub vm_to: PerUnit,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub length_m: f64,
    pub resistance_ohm_per_m: f64,
    pub max_current: Amperes,
    /// Index into the ampacity-ordered cable catalogue; `None` for user-specified cables
    pub cable_rank: Option<usize>,
    pub section_mm2: Option<f64>,
    /// Hop count from the slack bus of its subnetwork (set during cable sizing)
    pub distance: Option<usize>,
    pub flow: Option<LineFlow>,
}

impl Line {
    pub fn new(
        id: LineId,
        from_bus: BusId,
        to_bus: BusId,
        length_m: f64,
        resistance_ohm_per_m: f64,
    ) -> Self {
        Self {
            id,
            name: format!("line {} - {}", from_bus.value(), to_bus.value()),
            from_bus,
            to_bus,
            length_m,
            resistance_ohm_per_m,
            max_current: Amperes(1e6),
            cable_rank: None,
            section_mm2: None,
            distance: None,
            flow: None,
        }
    }

    pub fn with_cable(mut self, rank: usize, cable: &CableSpec) -> Self {
        self.apply_cable(rank, cable);
        self
    }

    /// Total series resistance (Ω)
    pub fn resistance_ohm(&self) -> f64 {
        self.resistance_ohm_per_m * self.length_m
    }

    /// Swap in a catalogue cable, keeping geometry
    pub fn apply_cable(&mut self, rank: usize, cable: &CableSpec) {
        self.resistance_ohm_per_m = cable.resistance_ohm_per_m;
        self.max_current = cable.max_current;
        self.section_mm2 = Some(cable.section_mm2);
        self.cable_rank = Some(rank);
    }
}

// ============================================================================
// Converters
// ============================================================================

/// Converter type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConverterKind {
    Pdu,
    AcDc,
    DcAc,
    PvDcDc,
    EvDcDc,
    StorageDcDc,
    Ilc,
    Other,
}

impl ConverterKind {
    /// PDUs regulate their downstream voltage from the upstream side.
    pub fn is_droop_controlled(&self) -> bool {
        matches!(self, ConverterKind::Pdu)
    }

    /// AC/DC converters get their own sizing margin.
    pub fn is_ac_dc(&self) -> bool {
        matches!(self, ConverterKind::AcDc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConverterKind::Pdu => "PDU DC/DC",
            ConverterKind::AcDc => "AC/DC",
            ConverterKind::DcAc => "DC/AC",
            ConverterKind::PvDcDc => "PV DC/DC",
            ConverterKind::EvDcDc => "EV DC/DC",
            ConverterKind::StorageDcDc => "Storage DC/DC",
            ConverterKind::Ilc => "ILC",
            ConverterKind::Other => "Other",
        }
    }
}

impl std::str::FromStr for ConverterKind {
    type Err = DcGridError;

    /// Accepts catalogue labels ("PDU DC/DC Converter") and snake_case tags ("pdu").
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let label = input.trim().to_ascii_lowercase();
        let kind = if label.contains("pdu") {
            ConverterKind::Pdu
        } else if label.contains("storage") {
            ConverterKind::StorageDcDc
        } else if label.starts_with("pv") {
            ConverterKind::PvDcDc
        } else if label.starts_with("ev") {
            ConverterKind::EvDcDc
        } else if label.contains("ilc") {
            ConverterKind::Ilc
        } else if label.contains("ac/dc") || label.contains("ac_dc") {
            ConverterKind::AcDc
        } else if label.contains("dc/ac") || label.contains("dc_ac") {
            ConverterKind::DcAc
        } else if label == "other" || label.contains("dc/dc") {
            ConverterKind::Other
        } else {
            return Err(DcGridError::Parse(format!(
                "unknown converter type '{input}'"
            )));
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ConverterKind {
    type Error = DcGridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConverterKind> for String {
    fn from(kind: ConverterKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a converter's efficiency curve came from; user curves are rescaled
/// when sizing picks a new rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveSource {
    Catalogue,
    UserDefined,
}

/// Solved operating point of a converter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConverterFlow {
    /// Power drawn from the upstream side, losses included
    pub power: Kilowatts,
    /// Power requested by the downstream subnetwork
    pub requested: Kilowatts,
    pub loading_percent: f64,
    pub loss: Kilowatts,
}

#[derive(Debug, Clone)]
pub struct Converter {
    pub id: ConverterId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub kind: ConverterKind,
    pub nominal_power: Kilowatts,
    pub efficiency: EfficiencyCurve,
    pub efficiency_source: CurveSource,
    pub droop: Option<DroopCurve>,
    pub standby_loss: Kilowatts,
    /// Position in `candidates`; `None` when the rating is user-fixed
    pub catalog_rank: Option<usize>,
    /// Catalogue parts of the same type and voltage levels, ascending nominal power
    pub candidates: Arc<[ConverterSpec]>,
    pub flow: Option<ConverterFlow>,
}

impl Converter {
    pub fn new(
        id: ConverterId,
        name: impl Into<String>,
        from_bus: BusId,
        to_bus: BusId,
        kind: ConverterKind,
        nominal_power: Kilowatts,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            kind,
            nominal_power,
            efficiency: EfficiencyCurve::ideal(),
            efficiency_source: CurveSource::Catalogue,
            droop: None,
            standby_loss: Kilowatts::ZERO,
            catalog_rank: None,
            candidates: Arc::from(Vec::new()),
            flow: None,
        }
    }

    pub fn with_efficiency(mut self, curve: EfficiencyCurve, source: CurveSource) -> Self {
        self.efficiency = curve;
        self.efficiency_source = source;
        self
    }

    pub fn with_droop(mut self, curve: DroopCurve) -> Self {
        self.droop = Some(curve);
        self
    }

    pub fn with_catalogue(mut self, candidates: Vec<ConverterSpec>, rank: usize) -> Self {
        self.candidates = Arc::from(candidates);
        self.catalog_rank = Some(rank);
        self
    }

    pub fn is_sizable(&self) -> bool {
        self.catalog_rank.is_some() && !self.candidates.is_empty()
    }

    /// The bus on the other side of the converter
    pub fn opposite(&self, bus: BusId) -> BusId {
        if self.from_bus == bus {
            self.to_bus
        } else {
            self.from_bus
        }
    }

    pub fn touches(&self, bus: BusId) -> bool {
        self.from_bus == bus || self.to_bus == bus
    }
}

// ============================================================================
// Assets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Load,
    /// Static generator (PV)
    Generator,
    /// Stationary battery; SOC integrated by the droop loop
    Battery,
    /// EV charging point, modelled as storage without SOC tracking
    EvCharger,
}

impl AssetKind {
    /// Results-table section for the asset ("load", "sgen", "storage")
    pub fn table_section(&self) -> &'static str {
        match self {
            AssetKind::Load => "load",
            AssetKind::Generator => "sgen",
            AssetKind::Battery | AssetKind::EvCharger => "storage",
        }
    }

    /// Producers inject power; everything else draws it.
    pub fn is_producer(&self) -> bool {
        matches!(self, AssetKind::Generator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageState {
    pub soc_percent: f64,
    pub energy_capacity_kwh: f64,
}

/// Distinguishes modelled assets from loads the orchestrator injects to
/// represent a downstream subnetwork behind a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOrigin {
    Modelled,
    ConverterEquivalent {
        subnetwork: usize,
        converter: ConverterId,
    },
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub bus: BusId,
    pub kind: AssetKind,
    pub nominal_power: Kilowatts,
    /// Operating setpoint handed to the solver (sign per [`AssetKind`])
    pub power: Kilowatts,
    /// Per-timestep fractions of `nominal_power`
    pub profile: Option<Arc<[f64]>>,
    /// 24 hourly base values, expanded into `profile` by the profile generator
    pub daily_base: Option<Arc<[f64]>>,
    pub droop: Option<DroopCurve>,
    pub storage: Option<StorageState>,
    /// Converter this asset sits behind (governs its droop voltage)
    pub linked_converter: Option<ConverterId>,
    pub in_service: bool,
    pub origin: AssetOrigin,
    /// Solved power, `None` before the first load flow
    pub result: Option<Kilowatts>,
}

impl Asset {
    pub fn new(
        id: AssetId,
        name: impl Into<String>,
        bus: BusId,
        kind: AssetKind,
        power: Kilowatts,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            kind,
            nominal_power: power,
            power,
            profile: None,
            daily_base: None,
            droop: None,
            storage: None,
            linked_converter: None,
            in_service: true,
            origin: AssetOrigin::Modelled,
            result: None,
        }
    }

    pub fn with_storage(mut self, soc_percent: f64, energy_capacity_kwh: f64) -> Self {
        self.storage = Some(StorageState {
            soc_percent,
            energy_capacity_kwh,
        });
        self
    }

    pub fn with_profile(mut self, profile: Vec<f64>) -> Self {
        self.profile = Some(Arc::from(profile));
        self
    }

    pub fn with_droop(mut self, curve: DroopCurve) -> Self {
        self.droop = Some(curve);
        self
    }

    /// Power drawn from the bus (consumer convention), zero when out of service
    pub fn consumption(&self) -> Kilowatts {
        if !self.in_service {
            Kilowatts::ZERO
        } else if self.kind.is_producer() {
            -self.power
        } else {
            self.power
        }
    }

    pub fn is_battery(&self) -> bool {
        self.kind == AssetKind::Battery
    }
}

// ============================================================================
// External grids
// ============================================================================

/// Distinguishes the real slack source from the per-link grids the
/// orchestrator places at converter connection buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOrigin {
    Modelled,
    ConverterEmulation { converter: ConverterId },
}

#[derive(Debug, Clone)]
pub struct ExternalGrid {
    pub id: ExtGridId,
    pub name: String,
    pub bus: BusId,
    pub voltage_pu: PerUnit,
    pub in_service: bool,
    pub origin: GridOrigin,
    /// Power supplied into the network (producer convention)
    pub result: Option<Kilowatts>,
}

impl ExternalGrid {
    pub fn new(id: ExtGridId, bus: BusId) -> Self {
        Self {
            id,
            name: format!("Grid {}", bus.value()),
            bus,
            voltage_pu: PerUnit::ONE,
            in_service: true,
            origin: GridOrigin::Modelled,
            result: None,
        }
    }

    pub fn is_active_slack(&self) -> bool {
        self.in_service && self.origin == GridOrigin::Modelled
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Asset(Asset),
    ExtGrid(ExternalGrid),
}

#[derive(Debug, Clone)]
pub enum Edge {
    Line(Line),
    Converter(Converter),
}

/// The DC network graph
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> NodeIndex {
        self.graph.add_node(Node::Bus(bus))
    }

    pub fn add_asset(&mut self, asset: Asset) -> NodeIndex {
        self.graph.add_node(Node::Asset(asset))
    }

    pub fn add_ext_grid(&mut self, grid: ExternalGrid) -> NodeIndex {
        self.graph.add_node(Node::ExtGrid(grid))
    }

    pub fn add_line(&mut self, line: Line) -> DcGridResult<EdgeIndex> {
        let (a, b) = self.endpoints(line.from_bus, line.to_bus, &line.name)?;
        Ok(self.graph.add_edge(a, b, Edge::Line(line)))
    }

    pub fn add_converter(&mut self, converter: Converter) -> DcGridResult<EdgeIndex> {
        let (a, b) = self.endpoints(converter.from_bus, converter.to_bus, &converter.name)?;
        Ok(self.graph.add_edge(a, b, Edge::Converter(converter)))
    }

    fn endpoints(
        &self,
        from: BusId,
        to: BusId,
        element: &str,
    ) -> DcGridResult<(NodeIndex, NodeIndex)> {
        let a = self.bus_node(from).ok_or_else(|| {
            DcGridError::Topology(format!("{element} references unknown {from}"))
        })?;
        let b = self
            .bus_node(to)
            .ok_or_else(|| DcGridError::Topology(format!("{element} references unknown {to}")))?;
        Ok((a, b))
    }

    pub fn bus_node(&self, id: BusId) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| matches!(&self.graph[idx], Node::Bus(b) if b.id == id))
    }

    pub fn has_bus(&self, id: BusId) -> bool {
        self.bus_node(id).is_some()
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses().find(|b| b.id == id)
    }

    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses_mut().find(|b| b.id == id)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.graph.node_weights().filter_map(|n| match n {
            Node::Bus(b) => Some(b),
            _ => None,
        })
    }

    pub fn buses_mut(&mut self) -> impl Iterator<Item = &mut Bus> {
        self.graph.node_weights_mut().filter_map(|n| match n {
            Node::Bus(b) => Some(b),
            _ => None,
        })
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.graph.node_weights().filter_map(|n| match n {
            Node::Asset(a) => Some(a),
            _ => None,
        })
    }

    pub fn assets_mut(&mut self) -> impl Iterator<Item = &mut Asset> {
        self.graph.node_weights_mut().filter_map(|n| match n {
            Node::Asset(a) => Some(a),
            _ => None,
        })
    }

    pub fn asset_mut(&mut self, id: AssetId) -> Option<&mut Asset> {
        self.assets_mut().find(|a| a.id == id)
    }

    pub fn assets_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Asset> {
        self.assets().filter(move |a| a.bus == bus)
    }

    pub fn ext_grids(&self) -> impl Iterator<Item = &ExternalGrid> {
        self.graph.node_weights().filter_map(|n| match n {
            Node::ExtGrid(g) => Some(g),
            _ => None,
        })
    }

    pub fn ext_grids_mut(&mut self) -> impl Iterator<Item = &mut ExternalGrid> {
        self.graph.node_weights_mut().filter_map(|n| match n {
            Node::ExtGrid(g) => Some(g),
            _ => None,
        })
    }

    /// In-service modelled external grids (the slack candidates)
    pub fn active_ext_grids(&self) -> impl Iterator<Item = &ExternalGrid> {
        self.ext_grids().filter(|g| g.is_active_slack())
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.graph.edge_weights().filter_map(|e| match e {
            Edge::Line(l) => Some(l),
            _ => None,
        })
    }

    pub fn lines_mut(&mut self) -> impl Iterator<Item = &mut Line> {
        self.graph.edge_weights_mut().filter_map(|e| match e {
            Edge::Line(l) => Some(l),
            _ => None,
        })
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines().find(|l| l.id == id)
    }

    pub fn line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        self.lines_mut().find(|l| l.id == id)
    }

    pub fn converters(&self) -> impl Iterator<Item = &Converter> {
        self.graph.edge_weights().filter_map(|e| match e {
            Edge::Converter(c) => Some(c),
            _ => None,
        })
    }

    pub fn converters_mut(&mut self) -> impl Iterator<Item = &mut Converter> {
        self.graph.edge_weights_mut().filter_map(|e| match e {
            Edge::Converter(c) => Some(c),
            _ => None,
        })
    }

    pub fn converter(&self, id: ConverterId) -> Option<&Converter> {
        self.converters().find(|c| c.id == id)
    }

    pub fn converter_mut(&mut self, id: ConverterId) -> Option<&mut Converter> {
        self.converters_mut().find(|c| c.id == id)
    }

    pub fn converter_by_name(&self, name: &str) -> Option<&Converter> {
        self.converters().find(|c| c.name == name)
    }

    /// Converters with one terminal on `bus`, in insertion order
    pub fn converters_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Converter> {
        self.converters().filter(move |c| c.touches(bus))
    }

    pub fn next_asset_id(&self) -> AssetId {
        AssetId(self.assets().map(|a| a.id.0 + 1).max().unwrap_or(0))
    }

    pub fn next_ext_grid_id(&self) -> ExtGridId {
        ExtGridId(self.ext_grids().map(|g| g.id.0 + 1).max().unwrap_or(0))
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();

        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Asset(a) => {
                    stats.num_assets += 1;
                    match a.kind {
                        AssetKind::Load => stats.total_load_kw += a.power.value(),
                        AssetKind::Generator => stats.total_generation_kw += a.power.value(),
                        AssetKind::Battery | AssetKind::EvCharger => stats.num_storage += 1,
                    }
                }
                Node::ExtGrid(g) if g.is_active_slack() => stats.num_active_grids += 1,
                Node::ExtGrid(_) => {}
            }
        }
        for edge in self.graph.edge_weights() {
            match edge {
                Edge::Line(_) => stats.num_lines += 1,
                Edge::Converter(_) => stats.num_converters += 1,
            }
        }
        stats
    }

    /// Validate network data for issues that would break decomposition or solving.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        use diagnostics::categories;

        let stats = self.stats();
        if stats.num_buses == 0 {
            diag.add_error(categories::STRUCTURE, "Network has no buses");
            return;
        }
        if stats.num_active_grids == 0 {
            diag.add_error(categories::STRUCTURE, "Network has no active external grid");
        }

        for asset in self.assets() {
            if !self.has_bus(asset.bus) {
                diag.add_error_with_entity(
                    categories::STRUCTURE,
                    &format!("asset references unknown {}", asset.bus),
                    &asset.name,
                );
            }
            if let Some(storage) = &asset.storage {
                if asset.is_battery() && storage.energy_capacity_kwh <= 0.0 {
                    diag.add_warning_with_entity(
                        categories::INPUT,
                        "battery has no energy capacity; SOC will not move",
                        &asset.name,
                    );
                }
            }
        }
        for bus in self.buses() {
            if bus.nominal_voltage.is_unset() {
                diag.add_warning_with_entity(
                    categories::INPUT,
                    "bus nominal voltage is 0 V",
                    &bus.name,
                );
            }
        }
        for line in self.lines() {
            if line.resistance_ohm() <= 0.0 {
                diag.add_error_with_entity(
                    categories::STRUCTURE,
                    "line has non-positive resistance",
                    &line.name,
                );
            }
        }
    }

    /// Buses with a result above `threshold` that have no generator reachable
    /// through a converter on the same bus.
    pub fn high_voltage_buses(&self, threshold: PerUnit) -> Vec<(BusId, PerUnit)> {
        let mut flagged = Vec::new();
        for bus in self.buses() {
            let Some(vm) = bus.voltage_pu else {
                continue;
            };
            if vm <= threshold {
                continue;
            }
            let fed_by_generator = self.converters_at_bus(bus.id).any(|conv| {
                let other = conv.opposite(bus.id);
                self.assets_at_bus(other).any(|a| a.kind.is_producer())
            });
            if !fed_by_generator {
                flagged.push((bus.id, vm));
            }
        }
        flagged
    }
}

/// Statistics about a network's size
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_lines: usize,
    pub num_converters: usize,
    pub num_assets: usize,
    pub num_storage: usize,
    pub num_active_grids: usize,
    pub total_load_kw: f64,
    pub total_generation_kw: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} lines, {} converters, {} assets ({:.1} kW load, {:.1} kW generation)",
            self.num_buses,
            self.num_lines,
            self.num_converters,
            self.num_assets,
            self.total_load_kw,
            self.total_generation_kw
        )
    }
}

impl Node {
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(bus) => &bus.name,
            Node::Asset(asset) => &asset.name,
            Node::ExtGrid(grid) => &grid.name,
        }
    }
}

impl Edge {
    pub fn label(&self) -> &str {
        match self {
            Edge::Line(line) => &line.name,
            Edge::Converter(conv) => &conv.name,
        }
    }
}
