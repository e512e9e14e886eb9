use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dcgrid", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Engine tuning file (TOML); built-in defaults when omitted
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Files describing one planning project
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Network document (.yaml, .yml or .json)
    #[arg(value_hint = ValueHint::FilePath)]
    pub network: PathBuf,

    /// Use-case document (.yaml, .yml or .json)
    #[arg(long, short = 'u', value_hint = ValueHint::FilePath)]
    pub use_case: PathBuf,

    /// Raw cable constants (CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub cables: PathBuf,

    /// Converter catalogue (CSV or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub converters: PathBuf,

    /// Measured device values (JSON list of `{friendly_name, value}` readings)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub overrides: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Steady-state load flow with droop control
    Pf {
        #[command(flatten)]
        project: ProjectArgs,
        /// Write bus, line and converter results as JSON
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// Size storage, cables and converters over the worst-case scenarios
    Size {
        #[command(flatten)]
        project: ProjectArgs,
        /// Sized network report (JSON)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
        /// Skip the load flow of the sized network under each scenario
        #[arg(long)]
        no_validate: bool,
    },
    /// Time-series simulation over the use-case horizon
    Ts {
        #[command(flatten)]
        project: ProjectArgs,
        /// Results table (.csv or .parquet)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
        /// Energy summary (JSON)
        #[arg(long, value_hint = ValueHint::FilePath)]
        summary: Option<PathBuf>,
    },
    /// Print subnetworks and the converter hierarchy
    Topology {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long, value_enum, default_value_t = TopologyFormat::Plain)]
        format: TopologyFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    Plain,
    Json,
    Dot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_size_command() {
        let cli = Cli::try_parse_from([
            "dcgrid",
            "--log-level",
            "debug",
            "size",
            "net.yaml",
            "-u",
            "case.yaml",
            "--cables",
            "cables.csv",
            "--converters",
            "conv.json",
            "-o",
            "report.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        match cli.command {
            Commands::Size {
                project,
                no_validate,
                ..
            } => {
                assert_eq!(project.network, PathBuf::from("net.yaml"));
                assert!(project.overrides.is_none());
                assert!(!no_validate);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
