//! Network construction from an input document.
//!
//! [`NetworkInput`] is the serde form of a planning project: nodes with their
//! attached component, cables and converters. [`NetworkBuilder`] turns it into
//! a [`Network`] using the cable and converter catalogues and an optional map
//! of measured device values ([`DeviceOverrides`]).

use crate::catalogue::{CableCatalogue, ConverterCatalogue};
use crate::curves::{DroopCurve, EfficiencyCurve};
use crate::diagnostics::{categories, Diagnostics};
use crate::error::{DcGridError, DcGridResult};
use crate::graph_utils::line_components;
use crate::units::{Kilowatts, Volts};
use crate::{
    Asset, AssetKind, Bus, BusId, Converter, ConverterId, ConverterKind, CurveSource,
    ExternalGrid, Line, LineId, Network,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    AcGrid,
    DcLoad,
    AcLoad,
    Pv,
    Ev,
    Storage,
    None,
}

impl ComponentType {
    fn label(&self) -> &'static str {
        match self {
            ComponentType::AcGrid => "ac_grid",
            ComponentType::DcLoad => "dc_load",
            ComponentType::AcLoad => "ac_load",
            ComponentType::Pv => "pv",
            ComponentType::Ev => "ev",
            ComponentType::Storage => "storage",
            ComponentType::None => "none",
        }
    }
}

/// Either the catalogue/registered default or explicit points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveInput {
    Default,
    UserDefined(Vec<[f64; 2]>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileInput {
    /// One fraction of nominal power per simulation step
    UserDefined(Vec<f64>),
    /// 24 hourly base values, expanded by the profile generator
    Daily(Vec<f64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    pub id: usize,
    #[serde(default)]
    pub nominal_voltage_v: f64,
    #[serde(default = "default_component")]
    pub component: ComponentType,
    #[serde(default)]
    pub max_power_kw: Option<f64>,
    #[serde(default)]
    pub capacity_kwh: Option<f64>,
    #[serde(default)]
    pub droop_curve: Option<CurveInput>,
    #[serde(default)]
    pub profile: Option<ProfileInput>,
    /// Bus of the converter the asset sits behind
    #[serde(default)]
    pub linked_converter_bus: Option<usize>,
    /// Name of the converter the asset sits behind
    #[serde(default)]
    pub linked_converter: Option<String>,
}

fn default_component() -> ComponentType {
    ComponentType::None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineInput {
    pub from: usize,
    pub to: usize,
    pub length_m: f64,
    /// Fixed cable; when absent the largest catalogue cable is used and the line is sizable
    #[serde(default)]
    pub resistance_ohm_per_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterInput {
    pub name: String,
    pub kind: ConverterKind,
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub voltage_from_v: Option<f64>,
    #[serde(default)]
    pub voltage_to_v: Option<f64>,
    /// Fixed rating; when absent the smallest matching catalogue part is used
    #[serde(default)]
    pub nominal_power_kw: Option<f64>,
    /// Points are (% of nominal power, % efficiency)
    #[serde(default = "default_curve_input")]
    pub efficiency: CurveInput,
    #[serde(default)]
    pub droop_control: bool,
    #[serde(default)]
    pub droop_curve: Option<CurveInput>,
}

fn default_curve_input() -> CurveInput {
    CurveInput::Default
}

/// Serde form of a whole project network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInput {
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub converters: Vec<ConverterInput>,
    /// Default droop curves keyed by component type ("dc_load") or converter type ("PDU DC/DC")
    #[serde(default)]
    pub default_droop_curves: BTreeMap<String, Vec<[f64; 2]>>,
}

impl NetworkInput {
    /// Load from `.yaml`/`.yml` or `.json`, chosen by extension.
    pub fn from_path(path: &Path) -> DcGridResult<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            Some("json") => Ok(serde_json::from_str(&text)?),
            other => Err(DcGridError::Parse(format!(
                "unsupported network file extension {other:?}"
            ))),
        }
    }

    fn default_droop(&self, key: &str) -> DroopCurve {
        self.default_droop_curves
            .get(key)
            .map(|pairs| DroopCurve::from_pairs(pairs))
            .unwrap_or_else(DroopCurve::default_asset)
    }
}

/// Measured device values keyed by friendly name (`D{node}`), in kW.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceOverrides(BTreeMap<String, f64>);

/// One measured value as delivered by the device-data feed
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceReading {
    pub friendly_name: String,
    pub value: f64,
}

impl DeviceOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for(bus: BusId) -> String {
        format!("D{}", bus.value())
    }

    pub fn insert(&mut self, key: impl Into<String>, kw: f64) {
        self.0.insert(key.into(), kw);
    }

    pub fn get(&self, bus: BusId) -> Option<f64> {
        self.0.get(&Self::key_for(bus)).copied()
    }

    pub fn from_readings(readings: impl IntoIterator<Item = DeviceReading>) -> Self {
        Self(
            readings
                .into_iter()
                .map(|r| (r.friendly_name, r.value))
                .collect(),
        )
    }

    /// Read a JSON list of `{friendly_name, value}` objects.
    pub fn from_json_path(path: &Path) -> DcGridResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let readings: Vec<DeviceReading> = serde_json::from_str(&text)?;
        Ok(Self::from_readings(readings))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Oversized overrides are cut to this multiple of the declared maximum power.
const MAX_OVERRIDE_FACTOR: f64 = 1.5;
/// EV chargers are modelled with this many hours of energy at full power.
const EV_ENERGY_HOURS: f64 = 4.0;

pub struct NetworkBuilder<'a> {
    cables: &'a CableCatalogue,
    converters: &'a ConverterCatalogue,
    overrides: Option<&'a DeviceOverrides>,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(cables: &'a CableCatalogue, converters: &'a ConverterCatalogue) -> Self {
        Self {
            cables,
            converters,
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a DeviceOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn build(&self, input: &NetworkInput, diag: &mut Diagnostics) -> DcGridResult<Network> {
        let mut network = Network::new();

        for node in &input.nodes {
            self.add_node(&mut network, input, node, diag)?;
        }
        for (idx, conv) in input.converters.iter().enumerate() {
            self.add_converter(&mut network, input, ConverterId::new(idx), conv, diag)?;
        }
        for (idx, line) in input.lines.iter().enumerate() {
            self.add_line(&mut network, LineId::new(idx), line)?;
        }
        inherit_subnetwork_voltages(&mut network);
        link_assets_to_converters(&mut network, input)?;

        Ok(network)
    }

    fn add_node(
        &self,
        network: &mut Network,
        input: &NetworkInput,
        node: &NodeInput,
        diag: &mut Diagnostics,
    ) -> DcGridResult<()> {
        let bus = BusId::new(node.id);
        if network.has_bus(bus) {
            return Err(DcGridError::Validation(format!("duplicate node {}", node.id)));
        }
        network.add_bus(Bus::new(bus, Volts(node.nominal_voltage_v)));

        let max_power = node.max_power_kw.unwrap_or(0.0);
        let asset_id = network.next_asset_id();
        let asset = match node.component {
            ComponentType::AcGrid => {
                let id = network.next_ext_grid_id();
                network.add_ext_grid(ExternalGrid::new(id, bus));
                None
            }
            ComponentType::DcLoad | ComponentType::AcLoad => {
                let power = self.load_power(bus, max_power, diag);
                let mut load = Asset::new(
                    asset_id,
                    format!("load {}", node.id),
                    bus,
                    AssetKind::Load,
                    Kilowatts(power),
                );
                if let Some(CurveInput::Default) = node.droop_curve {
                    load.droop = Some(input.default_droop(node.component.label()));
                } else if let Some(CurveInput::UserDefined(points)) = &node.droop_curve {
                    load.droop = Some(DroopCurve::from_pairs(points));
                }
                Some(load)
            }
            ComponentType::Ev => Some(
                Asset::new(
                    asset_id,
                    format!("EV {}", node.id),
                    bus,
                    AssetKind::EvCharger,
                    Kilowatts(max_power),
                )
                .with_storage(100.0, max_power * EV_ENERGY_HOURS),
            ),
            ComponentType::Storage => Some(match node.max_power_kw {
                Some(p) => Asset::new(
                    asset_id,
                    format!("Battery {}", node.id),
                    bus,
                    AssetKind::Battery,
                    Kilowatts(p),
                )
                .with_storage(100.0, node.capacity_kwh.unwrap_or(0.0)),
                None => Asset::new(
                    asset_id,
                    format!("Battery {}", node.id),
                    bus,
                    AssetKind::Battery,
                    Kilowatts::ZERO,
                )
                .with_storage(50.0, 0.0),
            }),
            ComponentType::Pv => Some(Asset::new(
                asset_id,
                format!("PV {}", node.id),
                bus,
                AssetKind::Generator,
                Kilowatts(max_power),
            )),
            ComponentType::None => None,
        };

        if let Some(mut asset) = asset {
            match &node.profile {
                Some(ProfileInput::UserDefined(values)) => {
                    asset.profile = Some(Arc::from(values.clone()));
                }
                Some(ProfileInput::Daily(base)) => {
                    asset.daily_base = Some(Arc::from(base.clone()));
                }
                None => {}
            }
            network.add_asset(asset);
        }

        if let Some(linked) = node.linked_converter_bus {
            ensure_bus(network, BusId::new(linked), None);
        }
        Ok(())
    }

    /// Load power from the override map when present, clamped to `[0, 1.5 × max]`.
    fn load_power(&self, bus: BusId, max_power: f64, diag: &mut Diagnostics) -> f64 {
        let requested = self
            .overrides
            .and_then(|o| o.get(bus))
            .unwrap_or(max_power);
        let ceiling = max_power * MAX_OVERRIDE_FACTOR;
        let key = DeviceOverrides::key_for(bus);
        if requested > ceiling {
            diag.add_warning_with_entity(
                categories::INPUT,
                &format!("{requested} kW exceeds {ceiling} kW, limited"),
                &key,
            );
            ceiling
        } else if requested < 0.0 {
            diag.add_warning_with_entity(
                categories::INPUT,
                &format!("negative power {requested} kW set to 0"),
                &key,
            );
            0.0
        } else {
            requested
        }
    }

    fn add_converter(
        &self,
        network: &mut Network,
        input: &NetworkInput,
        id: ConverterId,
        conv: &ConverterInput,
        diag: &mut Diagnostics,
    ) -> DcGridResult<()> {
        let from = BusId::new(conv.from);
        let to = BusId::new(conv.to);
        ensure_bus(network, from, conv.voltage_from_v);
        ensure_bus(network, to, conv.voltage_to_v);

        let droop = if conv.droop_control {
            match &conv.droop_curve {
                Some(CurveInput::UserDefined(points)) => DroopCurve::from_pairs(points),
                _ => input.default_droop(conv.kind.as_str()),
            }
        } else {
            DroopCurve::default_converter()
        };

        let converter = match conv.nominal_power_kw {
            Some(kw) => {
                let nominal = Kilowatts(kw);
                let (curve, source) = match &conv.efficiency {
                    CurveInput::UserDefined(points) => (
                        EfficiencyCurve::from_percent_points(points, nominal),
                        CurveSource::UserDefined,
                    ),
                    CurveInput::Default => match self.converters.of_kind(conv.kind).first() {
                        Some(part) => (
                            EfficiencyCurve::from_percent_points(&part.efficiency_percent, nominal),
                            CurveSource::Catalogue,
                        ),
                        None => {
                            diag.add_warning_with_entity(
                                categories::CATALOGUE,
                                "no catalogue part for default efficiency, assuming lossless",
                                &conv.name,
                            );
                            (EfficiencyCurve::ideal(), CurveSource::Catalogue)
                        }
                    },
                };
                Converter::new(id, &conv.name, from, to, conv.kind, nominal)
                    .with_efficiency(curve, source)
            }
            None => {
                let v_to = conv
                    .voltage_to_v
                    .or_else(|| network.bus(to).map(|b| b.nominal_voltage.value()))
                    .unwrap_or(0.0);
                let candidates = self.converters.candidates(conv.kind, conv.voltage_from_v, v_to);
                let part = candidates.first().cloned().ok_or_else(|| {
                    DcGridError::Catalogue(format!(
                        "no {} part for {:?} V -> {} V ({})",
                        conv.kind, conv.voltage_from_v, v_to, conv.name
                    ))
                })?;
                let (curve, source) = match &conv.efficiency {
                    CurveInput::UserDefined(points) => (
                        EfficiencyCurve::from_percent_points(points, part.nominal_power),
                        CurveSource::UserDefined,
                    ),
                    CurveInput::Default => (part.efficiency_curve(), CurveSource::Catalogue),
                };
                let mut converter =
                    Converter::new(id, &conv.name, from, to, conv.kind, part.nominal_power)
                        .with_efficiency(curve, source)
                        .with_catalogue(candidates, 0);
                converter.standby_loss = part.standby_loss();
                converter
            }
        };

        network.add_converter(converter.with_droop(droop))?;
        Ok(())
    }

    fn add_line(&self, network: &mut Network, id: LineId, input: &LineInput) -> DcGridResult<()> {
        let from = BusId::new(input.from);
        let to = BusId::new(input.to);
        ensure_bus(network, from, None);
        ensure_bus(network, to, None);

        let line = match input.resistance_ohm_per_m {
            Some(r) => Line::new(id, from, to, input.length_m, r),
            None => {
                let rank = self.cables.largest_rank().ok_or_else(|| {
                    DcGridError::Catalogue("cable catalogue is empty".to_string())
                })?;
                let cable = self.cables.get(rank).ok_or_else(|| {
                    DcGridError::Catalogue(format!("cable rank {rank} out of range"))
                })?;
                Line::new(id, from, to, input.length_m, cable.resistance_ohm_per_m)
                    .with_cable(rank, cable)
            }
        };
        network.add_line(line)?;
        Ok(())
    }
}

/// Create the bus if missing; a known voltage overrides the stored one.
fn ensure_bus(network: &mut Network, id: BusId, voltage: Option<f64>) {
    match network.bus_mut(id) {
        Some(bus) => {
            if let Some(v) = voltage {
                bus.nominal_voltage = Volts(v);
            }
        }
        None => {
            network.add_bus(Bus::new(id, Volts(voltage.unwrap_or(0.0))));
        }
    }
}

/// Buses still at 0 V take the first non-zero nominal voltage of their subnetwork.
fn inherit_subnetwork_voltages(network: &mut Network) {
    for component in line_components(network) {
        let inherited = component
            .iter()
            .filter_map(|id| network.bus(*id))
            .map(|b| b.nominal_voltage)
            .find(|v| !v.is_unset());
        let Some(voltage) = inherited else {
            continue;
        };
        for id in &component {
            if let Some(bus) = network.bus_mut(*id) {
                if bus.nominal_voltage.is_unset() {
                    bus.nominal_voltage = voltage;
                }
            }
        }
    }
}

fn link_assets_to_converters(network: &mut Network, input: &NetworkInput) -> DcGridResult<()> {
    let mut links: Vec<(BusId, ConverterId)> = Vec::new();
    for node in &input.nodes {
        let Some(name) = &node.linked_converter else {
            continue;
        };
        let conv = network.converter_by_name(name).ok_or_else(|| {
            DcGridError::Topology(format!(
                "node {} links unknown converter '{name}'",
                node.id
            ))
        })?;
        links.push((BusId::new(node.id), conv.id));
    }
    for (bus, conv) in links {
        for asset in network.assets_mut().filter(|a| a.bus == bus) {
            asset.linked_converter = Some(conv);
        }
    }
    Ok(())
}
