pub mod cli;
pub mod config;

pub use cli::{Cli, Commands, ProjectArgs, TopologyFormat};
pub use config::{load_engine_config, EngineConfig};
