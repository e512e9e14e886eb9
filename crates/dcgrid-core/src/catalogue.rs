//! Cable and converter catalogues.
//!
//! Cables come from a CSV of conductor constants; the usable list depends on the
//! project's conductor parameters (material, insulation, operating temperature)
//! and is ordered by ampacity so that "rank" means "the n-th smallest cable".
//! Converters come from a CSV or JSON part list, filtered by ecosystem and
//! later by type and voltage levels.

use crate::curves::EfficiencyCurve;
use crate::error::{DcGridError, DcGridResult};
use crate::units::{Amperes, Kilowatts};
use crate::ConverterKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Cables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material {
    Cu,
    Al,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Insulation {
    Pvc,
    Xlpe,
}

impl Material {
    fn matches(&self, label: &str) -> bool {
        let label = label.trim().to_ascii_lowercase();
        match self {
            Material::Cu => label == "cu",
            Material::Al => label == "al",
        }
    }
}

impl Insulation {
    fn matches(&self, label: &str) -> bool {
        let label = label.trim().to_ascii_lowercase();
        match self {
            Insulation::Pvc => label == "pvc",
            Insulation::Xlpe => label == "xlpe",
        }
    }
}

/// Project-level conductor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConductorParams {
    #[serde(rename = "operating_temperature_c")]
    pub temperature_c: f64,
    pub material: Material,
    pub insulation: Insulation,
}

impl Default for ConductorParams {
    fn default() -> Self {
        Self {
            temperature_c: 30.0,
            material: Material::Cu,
            insulation: Insulation::Pvc,
        }
    }
}

/// One row of the raw cable constants file
#[derive(Debug, Clone, Deserialize)]
pub struct CableRecord {
    #[serde(rename = "materiaux")]
    pub material: String,
    #[serde(rename = "isolation")]
    pub insulation: String,
    pub section: f64,
    /// Resistance at 20 °C (Ω/m)
    #[serde(rename = "Coef")]
    pub coef: f64,
    #[serde(rename = "Const_r")]
    pub const_r: f64,
    /// Maximum conductor temperature (°C)
    #[serde(rename = "Tcond")]
    pub t_cond: f64,
    #[serde(rename = "Const_isol")]
    pub const_isol: f64,
}

/// A usable cable at the project operating temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CableSpec {
    pub section_mm2: f64,
    pub resistance_ohm_per_m: f64,
    pub max_current: Amperes,
}

impl CableSpec {
    /// R = Coef·(1 + Const_r·(T − 20)), Imax = √((Tcond − T) / (Const_isol·R))
    pub fn from_record(record: &CableRecord, temperature_c: f64) -> Self {
        let r = record.coef * (1.0 + record.const_r * (temperature_c - 20.0));
        let headroom = (record.t_cond - temperature_c).max(0.0);
        let i_max = (headroom / (record.const_isol * r)).sqrt();
        Self {
            section_mm2: record.section,
            resistance_ohm_per_m: r,
            max_current: Amperes(i_max),
        }
    }
}

/// Cables ordered by ascending ampacity
#[derive(Debug, Clone, Default)]
pub struct CableCatalogue {
    entries: Vec<CableSpec>,
}

impl CableCatalogue {
    pub fn from_records(records: &[CableRecord], params: &ConductorParams) -> DcGridResult<Self> {
        let mut entries: Vec<CableSpec> = records
            .iter()
            .filter(|r| params.material.matches(&r.material))
            .filter(|r| params.insulation.matches(&r.insulation))
            .map(|r| CableSpec::from_record(r, params.temperature_c))
            .collect();
        if entries.is_empty() {
            return Err(DcGridError::Catalogue(format!(
                "no cable for {:?}/{:?}",
                params.material, params.insulation
            )));
        }
        entries.sort_by(|a, b| a.max_current.value().total_cmp(&b.max_current.value()));
        Ok(Self { entries })
    }

    pub fn from_csv_path(path: &Path, params: &ConductorParams) -> DcGridResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<CableRecord>, _>>()?;
        Self::from_records(&records, params)
    }

    /// Catalogue from already-processed specs (sorted on construction)
    pub fn from_specs(mut entries: Vec<CableSpec>) -> Self {
        entries.sort_by(|a, b| a.max_current.value().total_cmp(&b.max_current.value()));
        Self { entries }
    }

    pub fn get(&self, rank: usize) -> Option<&CableSpec> {
        self.entries.get(rank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn largest_rank(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CableSpec> {
        self.entries.iter()
    }
}

// ============================================================================
// Converters
// ============================================================================

/// One catalogue part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterSpec {
    pub ecosystem: String,
    pub kind: ConverterKind,
    pub voltage_v1: f64,
    pub voltage_v2: f64,
    pub nominal_power: Kilowatts,
    /// (% of nominal power, % efficiency)
    pub efficiency_percent: Vec<[f64; 2]>,
    #[serde(default)]
    pub standby_loss_w: f64,
}

impl ConverterSpec {
    pub fn efficiency_curve(&self) -> EfficiencyCurve {
        EfficiencyCurve::from_percent_points(&self.efficiency_percent, self.nominal_power)
    }

    pub fn standby_loss(&self) -> Kilowatts {
        Kilowatts(self.standby_loss_w / 1000.0)
    }

    fn connects(&self, v_from: Option<f64>, v_to: f64) -> bool {
        let same = |a: f64, b: f64| (a - b).abs() < 1e-9;
        match v_from {
            None => same(self.voltage_v1, v_to) || same(self.voltage_v2, v_to),
            Some(v_from) => {
                (same(self.voltage_v1, v_to) && same(self.voltage_v2, v_from))
                    || (same(self.voltage_v1, v_from) && same(self.voltage_v2, v_to))
            }
        }
    }
}

/// Row of the converter catalogue CSV; the efficiency curve is a string of
/// `[x;y]` pairs, e.g. `[10;90],[50;95],[100;94]`.
#[derive(Debug, Clone, Deserialize)]
struct ConverterRecord {
    #[serde(rename = "Ecosystem")]
    ecosystem: String,
    #[serde(rename = "Converter type")]
    kind: String,
    #[serde(rename = "Voltage level V1 (V)")]
    voltage_v1: f64,
    #[serde(rename = "Voltage level V2 (V)")]
    voltage_v2: f64,
    #[serde(rename = "Nominal power (kW)")]
    nominal_power_kw: f64,
    #[serde(rename = "Efficiency curve")]
    efficiency: String,
    #[serde(rename = "Stand-by losses (W)", default)]
    standby_loss_w: f64,
}

/// Parse `[x;y],[x;y],...` into point pairs.
pub fn parse_curve_string(raw: &str) -> DcGridResult<Vec<[f64; 2]>> {
    let json = format!("[{}]", raw.replace(';', ","));
    serde_json::from_str(&json)
        .map_err(|e| DcGridError::Parse(format!("invalid curve '{raw}': {e}")))
}

impl TryFrom<ConverterRecord> for ConverterSpec {
    type Error = DcGridError;

    fn try_from(record: ConverterRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            ecosystem: record.ecosystem,
            kind: record.kind.parse()?,
            voltage_v1: record.voltage_v1,
            voltage_v2: record.voltage_v2,
            nominal_power: Kilowatts(record.nominal_power_kw),
            efficiency_percent: parse_curve_string(&record.efficiency)?,
            standby_loss_w: record.standby_loss_w,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConverterCatalogue {
    entries: Vec<ConverterSpec>,
}

impl ConverterCatalogue {
    pub fn new(entries: Vec<ConverterSpec>) -> Self {
        Self { entries }
    }

    pub fn from_csv_path(path: &Path) -> DcGridResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = Vec::new();
        for record in reader.deserialize::<ConverterRecord>() {
            entries.push(ConverterSpec::try_from(record?)?);
        }
        Ok(Self { entries })
    }

    pub fn from_json_path(path: &Path) -> DcGridResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            entries: serde_json::from_str(&text)?,
        })
    }

    /// Load by extension: `.json` or CSV otherwise.
    pub fn from_path(path: &Path) -> DcGridResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_path(path),
            _ => Self::from_csv_path(path),
        }
    }

    /// Keep only parts of the project's ecosystem.
    pub fn for_ecosystem(&self, ecosystem: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.ecosystem == ecosystem)
                .cloned()
                .collect(),
        }
    }

    /// All parts of a type, ascending nominal power.
    pub fn of_kind(&self, kind: ConverterKind) -> Vec<ConverterSpec> {
        let mut parts: Vec<_> = self.entries.iter().filter(|e| e.kind == kind).cloned().collect();
        parts.sort_by(|a, b| a.nominal_power.value().total_cmp(&b.nominal_power.value()));
        parts
    }

    /// Parts of a type that connect the given voltage levels, ascending nominal power.
    /// With no `v_from`, any part with either side at `v_to` qualifies.
    pub fn candidates(&self, kind: ConverterKind, v_from: Option<f64>, v_to: f64) -> Vec<ConverterSpec> {
        let mut parts = self.of_kind(kind);
        parts.retain(|e| e.connects(v_from, v_to));
        parts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
