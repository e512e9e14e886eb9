//! Use-case documents and worst-case scenario sizing for DC installations.

pub mod apply;
pub mod merge;
pub mod report;
pub mod sizing;
pub mod usecase;

pub use apply::{apply_worst_case, isolate_storage, StorageMode};
pub use merge::{merge_max, MergeReport};
pub use report::{load_report, write_report, SizedNetworkReport};
pub use sizing::{apply_battery_ratings, BatteryRating, ScenarioCheck, ScenarioPlanner, SizingOutcome};
pub use usecase::{
    load_use_case_from_path, validate, Ecosystem, SimulationSpec, SizingFactors, UseCase,
    WorstCase, WorstCases,
};
