use anyhow::Result;
use dcgrid_algo::DroopControlLoop;
use dcgrid_cli::{EngineConfig, ProjectArgs};
use dcgrid_core::{Diagnostics, Network};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use super::common::{load_project, orchestrator, report_diagnostics, write_json};

#[derive(Debug, Serialize)]
struct BusResult {
    id: usize,
    name: String,
    v_pu: Option<f64>,
}

#[derive(Debug, Serialize)]
struct LineResult {
    name: String,
    from_bus: usize,
    to_bus: usize,
    current_a: Option<f64>,
    loading_percent: Option<f64>,
    loss_kw: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ConverterResult {
    name: String,
    kind: String,
    power_kw: Option<f64>,
    loading_percent: Option<f64>,
    loss_kw: Option<f64>,
}

#[derive(Debug, Serialize)]
struct LoadFlowResults {
    grid_supply_kw: f64,
    buses: Vec<BusResult>,
    lines: Vec<LineResult>,
    converters: Vec<ConverterResult>,
}

impl LoadFlowResults {
    fn collect(network: &Network) -> Self {
        Self {
            grid_supply_kw: network
                .ext_grids()
                .filter(|g| g.is_active_slack())
                .filter_map(|g| g.result.map(|p| p.value()))
                .sum(),
            buses: network
                .buses()
                .map(|b| BusResult {
                    id: b.id.value(),
                    name: b.name.clone(),
                    v_pu: b.voltage_pu.map(|v| v.value()),
                })
                .collect(),
            lines: network
                .lines()
                .map(|l| LineResult {
                    name: l.name.clone(),
                    from_bus: l.from_bus.value(),
                    to_bus: l.to_bus.value(),
                    current_a: l.flow.map(|f| f.current.value()),
                    loading_percent: l.flow.map(|f| f.loading_percent),
                    loss_kw: l.flow.map(|f| f.loss.value()),
                })
                .collect(),
            converters: network
                .converters()
                .map(|c| ConverterResult {
                    name: c.name.clone(),
                    kind: c.kind.to_string(),
                    power_kw: c.flow.map(|f| f.power.value()),
                    loading_percent: c.flow.map(|f| f.loading_percent),
                    loss_kw: c.flow.map(|f| f.loss.value()),
                })
                .collect(),
        }
    }
}

pub fn handle(project: &ProjectArgs, out: Option<&PathBuf>, config: &EngineConfig) -> Result<()> {
    let mut diag = Diagnostics::new();
    let mut loaded = load_project(project, &mut diag)?;
    let orch = orchestrator(&loaded.network, config, &loaded.use_case)?;
    let report = DroopControlLoop::new(&orch).run(&mut loaded.network, None, &mut diag)?;
    info!(
        iterations = report.iterations,
        converged = report.converged,
        "load flow finished"
    );

    let results = LoadFlowResults::collect(&loaded.network);
    let (v_min, v_max) = results
        .buses
        .iter()
        .filter_map(|b| b.v_pu)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    println!(
        "Load flow {} after {} droop iteration(s): {} bus(es), voltage range [{:.4}, {:.4}] p.u., grid supply {:.3} kW",
        if report.converged { "converged" } else { "stopped" },
        report.iterations,
        results.buses.len(),
        v_min,
        v_max,
        results.grid_supply_kw
    );

    if let Some(path) = out {
        write_json(path, &results)?;
        println!("Results written to {}", path.display());
    }
    report_diagnostics(&diag);
    Ok(())
}
