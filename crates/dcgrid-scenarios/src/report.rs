use anyhow::{Context, Result};
use dcgrid_core::Network;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

use crate::sizing::{BatteryRating, ScenarioCheck, SizingOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub length_m: f64,
    pub cable_rank: Option<usize>,
    pub section_mm2: Option<f64>,
    pub max_current_a: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterRecord {
    pub name: String,
    pub kind: String,
    pub nominal_kw: f64,
    pub catalog_rank: Option<usize>,
    pub standby_loss_kw: f64,
}

/// Component ratings chosen by a sizing run, ready for external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedNetworkReport {
    pub project: String,
    pub lines: Vec<LineRecord>,
    pub converters: Vec<ConverterRecord>,
    #[serde(default)]
    pub batteries: Vec<BatteryRating>,
    #[serde(default)]
    pub checks: Vec<ScenarioCheck>,
}

impl SizedNetworkReport {
    pub fn from_network(project: &str, network: &Network) -> Self {
        let lines = network
            .lines()
            .map(|line| LineRecord {
                name: line.name.clone(),
                from_bus: line.from_bus.value(),
                to_bus: line.to_bus.value(),
                length_m: line.length_m,
                cable_rank: line.cable_rank,
                section_mm2: line.section_mm2,
                max_current_a: line.max_current.value(),
            })
            .collect();
        let converters = network
            .converters()
            .map(|converter| ConverterRecord {
                name: converter.name.clone(),
                kind: converter.kind.to_string(),
                nominal_kw: converter.nominal_power.value(),
                catalog_rank: converter.catalog_rank,
                standby_loss_kw: converter.standby_loss.value(),
            })
            .collect();
        Self {
            project: project.to_string(),
            lines,
            converters,
            batteries: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn from_outcome(project: &str, outcome: &SizingOutcome, checks: Vec<ScenarioCheck>) -> Self {
        Self {
            batteries: outcome.batteries.clone(),
            checks,
            ..Self::from_network(project, &outcome.network)
        }
    }
}

pub fn write_report(path: &Path, report: &SizedNetworkReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory '{}'", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("creating sizing report '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("writing sizing report '{}'", path.display()))?;
    Ok(())
}

pub fn load_report(path: &Path) -> Result<SizedNetworkReport> {
    let file = File::open(path)
        .with_context(|| format!("opening sizing report '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing sizing report '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::*;
    use tempfile::NamedTempFile;

    #[test]
    fn writes_and_reads_report() {
        let mut network = Network::new();
        network.add_bus(Bus::new(BusId::new(0), Volts(400.0)));
        network.add_bus(Bus::new(BusId::new(1), Volts(400.0)));
        let cable = CableSpec {
            section_mm2: 16.0,
            resistance_ohm_per_m: 0.00115,
            max_current: Amperes(80.0),
        };
        network
            .add_line(
                Line::new(LineId::new(0), BusId::new(0), BusId::new(1), 12.0, 0.0)
                    .with_cable(2, &cable),
            )
            .unwrap();

        let tmp = NamedTempFile::new().unwrap();
        let report = SizedNetworkReport::from_network("office", &network);
        write_report(tmp.path(), &report).unwrap();

        let parsed = load_report(tmp.path()).unwrap();
        assert_eq!(parsed, report);
        let line = parsed.lines.first().unwrap();
        assert_eq!(line.cable_rank, Some(2));
        assert_eq!(line.section_mm2, Some(16.0));
        assert_eq!(line.max_current_a, 80.0);
        assert!(parsed.converters.is_empty());
    }
}
