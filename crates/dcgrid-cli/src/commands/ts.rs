use anyhow::Result;
use dcgrid_cli::{EngineConfig, ProjectArgs};
use dcgrid_core::Diagnostics;
use dcgrid_ts::{Horizon, ProfileGenerator, TimeSeriesSimulator};
use std::path::{Path, PathBuf};

use super::common::{load_project, orchestrator, report_diagnostics, write_json};

pub fn handle(
    project: &ProjectArgs,
    out: &Path,
    summary_out: Option<&PathBuf>,
    config: &EngineConfig,
) -> Result<()> {
    let mut diag = Diagnostics::new();
    let mut loaded = load_project(project, &mut diag)?;
    let simulation = loaded.use_case.simulation;
    let horizon = Horizon::try_from(&simulation)?;

    ProfileGenerator::new(horizon, simulation.seed).assign(&mut loaded.network, &mut diag)?;
    let orch = orchestrator(&loaded.network, config, &loaded.use_case)?;
    let run = TimeSeriesSimulator::new(&orch, horizon).run(&mut loaded.network, &mut diag)?;

    println!(
        "Simulated {} step(s) of {:.2} h ({} not converged)",
        run.results.len(),
        run.step_hours,
        run.unconverged_steps()
    );
    run.results.write(out)?;
    println!("Results written to {}", out.display());

    let summary = run.summary();
    println!(
        "Energy: generated {:.3} kWh, consumed {:.3} kWh, losses {:.3} kWh, efficiency {:.2} %",
        summary.generated_kwh,
        summary.consumed_kwh,
        summary.total_losses_kwh(),
        summary.efficiency_percent
    );
    if let Some(path) = summary_out {
        write_json(path, &summary)?;
    }
    report_diagnostics(&diag);
    Ok(())
}
