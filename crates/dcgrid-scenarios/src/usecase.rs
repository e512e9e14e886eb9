use anyhow::{anyhow, Context, Result};
use dcgrid_algo::{SizingMargins, VoltageLimits};
use dcgrid_core::{ConductorParams, PerUnit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Project description read once at the start of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseCase {
    pub project: ProjectSpec,
    #[serde(default)]
    pub sizing: SizingFactors,
    #[serde(default)]
    pub conductor: ConductorParams,
    pub scenarios: WorstCases,
    #[serde(default)]
    pub simulation: SimulationSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default)]
    pub ecosystem: Ecosystem,
}

/// DC ecosystem the installation follows. Fixes the admissible voltage band
/// and which converter catalogue entries may be used.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Ecosystem {
    #[default]
    CurrentOS,
    ODCA,
    Custom { min_v_pu: f64, max_v_pu: f64 },
}

impl Ecosystem {
    pub fn voltage_limits(&self) -> VoltageLimits {
        match *self {
            Ecosystem::CurrentOS => VoltageLimits::current_os(),
            Ecosystem::ODCA => VoltageLimits::odca(),
            Ecosystem::Custom { min_v_pu, max_v_pu } => {
                VoltageLimits::custom(PerUnit(min_v_pu), PerUnit(max_v_pu))
            }
        }
    }

    /// Ecosystem column value in the converter catalogue, `None` to keep every entry
    pub fn catalogue_name(&self) -> Option<&'static str> {
        match self {
            Ecosystem::CurrentOS => Some("CurrentOS"),
            Ecosystem::ODCA => Some("ODCA"),
            Ecosystem::Custom { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizingFactors {
    #[serde(default = "default_cable_margin")]
    pub cable_margin_percent: f64,
    #[serde(default = "default_ac_dc_margin")]
    pub ac_dc_margin_percent: f64,
    #[serde(default = "default_converter_margin")]
    pub other_converter_margin_percent: f64,
    #[serde(default = "default_percent")]
    pub load_expansion_percent: f64,
}

fn default_cable_margin() -> f64 {
    10.0
}

fn default_ac_dc_margin() -> f64 {
    20.0
}

fn default_converter_margin() -> f64 {
    10.0
}

fn default_percent() -> f64 {
    100.0
}

impl Default for SizingFactors {
    fn default() -> Self {
        Self {
            cable_margin_percent: default_cable_margin(),
            ac_dc_margin_percent: default_ac_dc_margin(),
            other_converter_margin_percent: default_converter_margin(),
            load_expansion_percent: default_percent(),
        }
    }
}

impl SizingFactors {
    pub fn margins(&self) -> SizingMargins {
        SizingMargins {
            cable_percent: self.cable_margin_percent,
            ac_dc_percent: self.ac_dc_margin_percent,
            other_converter_percent: self.other_converter_margin_percent,
        }
    }
}

/// The three worst cases a network is sized against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorstCases {
    pub storage: WorstCase,
    pub cables_and_converters: WorstCase,
    pub ac_dc: WorstCase,
}

/// Scaling applied to the base network for one worst case, in percent of
/// the nominal values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorstCase {
    #[serde(default = "default_percent")]
    pub load_percent: f64,
    #[serde(default = "default_percent")]
    pub pv_percent: f64,
    #[serde(default = "default_percent")]
    pub ev_percent: f64,
    /// Share of battery power discharged into the network
    #[serde(default)]
    pub storage_contribution_percent: Option<f64>,
    /// Hours of autonomy a sized battery must provide
    #[serde(default)]
    pub storage_duration_h: Option<f64>,
}

impl Default for WorstCase {
    fn default() -> Self {
        Self {
            load_percent: default_percent(),
            pv_percent: default_percent(),
            ev_percent: default_percent(),
            storage_contribution_percent: None,
            storage_duration_h: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationSpec {
    #[serde(default = "default_step_minutes")]
    pub step_minutes: u32,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_step_minutes() -> u32 {
    60
}

fn default_days() -> u32 {
    1
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            step_minutes: default_step_minutes(),
            days: default_days(),
            seed: None,
        }
    }
}

impl SimulationSpec {
    /// The step must divide a day and the horizon must cover at least one day.
    pub fn validate(&self) -> Result<()> {
        if self.step_minutes == 0 || 1440 % self.step_minutes != 0 {
            return Err(anyhow!(
                "step_minutes must divide a day, got {}",
                self.step_minutes
            ));
        }
        if self.days == 0 {
            return Err(anyhow!("simulation must cover at least one day"));
        }
        Ok(())
    }
}

pub fn load_use_case_from_path(path: &Path) -> Result<UseCase> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading use case '{}'", path.display()))?;
    let use_case: UseCase = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing use case yaml")?
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing use case json")?
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing use case")?,
    };
    validate(&use_case)
        .with_context(|| format!("validating use case '{}'", path.display()))?;
    Ok(use_case)
}

pub fn validate(use_case: &UseCase) -> Result<()> {
    if let Ecosystem::Custom { min_v_pu, max_v_pu } = use_case.project.ecosystem {
        if !(min_v_pu > 0.0 && min_v_pu < max_v_pu) {
            return Err(anyhow!(
                "custom voltage band [{min_v_pu}, {max_v_pu}] p.u. is empty"
            ));
        }
    }

    let sizing = &use_case.sizing;
    for (label, margin) in [
        ("cable_margin_percent", sizing.cable_margin_percent),
        ("ac_dc_margin_percent", sizing.ac_dc_margin_percent),
        ("other_converter_margin_percent", sizing.other_converter_margin_percent),
    ] {
        if !(0.0..100.0).contains(&margin) {
            return Err(anyhow!("{label} must lie in [0, 100), got {margin}"));
        }
    }
    if sizing.load_expansion_percent < 0.0 {
        return Err(anyhow!("load_expansion_percent cannot be negative"));
    }

    for (label, case) in use_case.scenarios.labelled() {
        let percentages = [
            case.load_percent,
            case.pv_percent,
            case.ev_percent,
            case.storage_contribution_percent.unwrap_or(0.0),
        ];
        if percentages.iter().any(|p| *p < 0.0 || !p.is_finite()) {
            return Err(anyhow!("scenario '{label}' has a negative or invalid percentage"));
        }
        if let Some(hours) = case.storage_duration_h {
            if hours <= 0.0 {
                return Err(anyhow!("scenario '{label}' storage_duration_h must be positive"));
            }
        }
    }

    use_case.simulation.validate()
}

impl WorstCases {
    pub fn labelled(&self) -> [(&'static str, &WorstCase); 3] {
        [
            ("storage", &self.storage),
            ("cables_and_converters", &self.cables_and_converters),
            ("ac_dc", &self.ac_dc),
        ]
    }
}
