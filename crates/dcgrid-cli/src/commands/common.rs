use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dcgrid_algo::PowerFlowOrchestrator;
use dcgrid_cli::{EngineConfig, ProjectArgs};
use dcgrid_core::{
    CableCatalogue, ConverterCatalogue, DeviceOverrides, Diagnostics, Network, NetworkBuilder,
    NetworkInput,
};
use dcgrid_scenarios::{load_use_case_from_path, UseCase};
use serde::Serialize;
use tracing::{info, warn};

/// Everything read from disk for one command
pub struct Project {
    pub use_case: UseCase,
    pub cables: CableCatalogue,
    pub network: Network,
}

pub fn load_project(args: &ProjectArgs, diag: &mut Diagnostics) -> Result<Project> {
    let use_case = load_use_case_from_path(&args.use_case)?;
    let cables = CableCatalogue::from_csv_path(&args.cables, &use_case.conductor)
        .with_context(|| format!("loading cable catalogue {}", args.cables.display()))?;
    let mut converters = ConverterCatalogue::from_path(&args.converters)
        .with_context(|| format!("loading converter catalogue {}", args.converters.display()))?;
    if let Some(ecosystem) = use_case.project.ecosystem.catalogue_name() {
        converters = converters.for_ecosystem(ecosystem);
    }

    let input = NetworkInput::from_path(&args.network)
        .with_context(|| format!("loading network {}", args.network.display()))?;
    let overrides = match &args.overrides {
        Some(path) => DeviceOverrides::from_json_path(path)
            .with_context(|| format!("loading device values {}", path.display()))?,
        None => DeviceOverrides::new(),
    };
    let network = NetworkBuilder::new(&cables, &converters)
        .with_overrides(&overrides)
        .build(&input, diag)
        .context("building network")?;

    network.validate_into(diag);
    if diag.has_errors() {
        return Err(anyhow!("invalid network: {diag}"));
    }
    let stats = network.stats();
    info!(
        project = %use_case.project.name,
        buses = stats.num_buses,
        lines = stats.num_lines,
        converters = stats.num_converters,
        "network loaded"
    );

    Ok(Project {
        use_case,
        cables,
        network,
    })
}

pub fn orchestrator(
    network: &Network,
    config: &EngineConfig,
    use_case: &UseCase,
) -> Result<PowerFlowOrchestrator> {
    config
        .orchestrator(network, use_case.project.ecosystem.voltage_limits())
        .context("resolving converter hierarchy")
}

/// Log the collected warnings and print their count to stderr.
pub fn report_diagnostics(diag: &Diagnostics) {
    for issue in diag.warnings() {
        warn!("{issue}");
    }
    if !diag.issues.is_empty() {
        eprintln!("Diagnostics: {}", diag.summary());
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
