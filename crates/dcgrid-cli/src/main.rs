use clap::Parser;
use dcgrid_cli::{load_engine_config, Cli, Commands};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::{pf, size, topology, ts};

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_engine_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Pf { project, out } => pf::handle(project, out.as_ref(), &config),
        Commands::Size {
            project,
            out,
            no_validate,
        } => size::handle(project, out, !no_validate, &config),
        Commands::Ts {
            project,
            out,
            summary,
        } => ts::handle(project, out, summary.as_ref(), &config),
        Commands::Topology { project, format } => topology::handle(project, *format),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    info!("dcgrid {}", env!("CARGO_PKG_VERSION"));
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
