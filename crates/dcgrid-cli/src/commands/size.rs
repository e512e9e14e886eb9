use anyhow::Result;
use dcgrid_cli::{EngineConfig, ProjectArgs};
use dcgrid_core::Diagnostics;
use dcgrid_scenarios::{write_report, ScenarioPlanner, SizedNetworkReport};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::common::{load_project, report_diagnostics};

pub fn handle(
    project: &ProjectArgs,
    out: &Path,
    validate: bool,
    config: &EngineConfig,
) -> Result<()> {
    let mut diag = Diagnostics::new();
    let loaded = load_project(project, &mut diag)?;
    let planner = ScenarioPlanner::new(&loaded.use_case, &loaded.cables, Arc::new(config.solver()))
        .with_settings(config.droop)
        .with_setpoint_clamp(config.pdu_clamp);

    let outcome = planner.run(&loaded.network, &mut diag)?;
    let checks = if validate {
        planner.validate(&outcome.network, &mut diag)?
    } else {
        Vec::new()
    };
    for check in &checks {
        info!(
            scenario = %check.scenario,
            min_v = check.min_voltage_pu,
            max_v = check.max_voltage_pu,
            "scenario check"
        );
    }

    let report = SizedNetworkReport::from_outcome(&loaded.use_case.project.name, &outcome, checks);
    write_report(out, &report)?;
    println!(
        "Sized {} line(s), {} converter(s) and {} battery(ies); report written to {}",
        report.lines.len(),
        report.converters.len(),
        report.batteries.len(),
        out.display()
    );
    report_diagnostics(&diag);
    Ok(())
}
