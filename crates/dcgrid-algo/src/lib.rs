//! # dcgrid-algo: Hierarchical DC Load Flow and Sizing
//!
//! Load flow for DC networks whose voltage domains are joined only by power
//! converters. Each domain (subnetwork) is solved on its own; converters carry
//! the demand of one domain upstream to the next, losses included.
//!
//! ## Pipeline
//!
//! | Step | Type | Role |
//! |------|------|------|
//! | Decomposition | [`Decomposition`] | Buses split into line-connected subnetworks |
//! | Hierarchy | [`HierarchyResolver`] | Upstream/downstream direction of every converter, solve order |
//! | Pass | [`PowerFlowOrchestrator`] | Leaves first, converter losses propagated to the root |
//! | PDU loop | [`PowerFlowOrchestrator::run_pdu_loop`] | Passes repeated until both sides of every PDU agree |
//! | Asset droop | [`DroopControlLoop`] | Voltage-dependent setpoints and storage SOC per timestep |
//! | Sizing | [`SizingEngine`] | Catalogue parts for converters and cables |
//!
//! ### Subnetwork solver
//!
//! Subnetworks are solved through the [`SubnetworkSolver`] trait. The bundled
//! [`NewtonDcEmulation`] runs a Newton-Raphson on a resistive network in
//! emulated three-phase units and converts the result back to DC magnitudes
//! (see [`power_flow`]).
//!
//! ## Example
//!
//! ```ignore
//! use dcgrid_algo::{NewtonDcEmulation, PowerFlowOrchestrator};
//! use dcgrid_core::Diagnostics;
//! use std::sync::Arc;
//!
//! let orchestrator = PowerFlowOrchestrator::new(&network, Arc::new(NewtonDcEmulation::default()))?;
//! let mut diag = Diagnostics::new();
//! let report = orchestrator.solve(&mut network, &mut diag)?;
//! println!("{} passes, PDU deviation {:.2e}", report.passes, report.deviation);
//! ```

pub mod converter;
pub mod decompose;
pub mod droop;
pub mod hierarchy;
pub mod orchestrator;
pub mod power_flow;
pub mod settings;
pub mod sizing;

pub use converter::ConverterTransfer;
pub use decompose::{Decomposition, Subnetwork};
pub use droop::{DroopControlLoop, DroopReport, TimeStep};
pub use hierarchy::{Hierarchy, HierarchyResolver, Link};
pub use orchestrator::{PassOptions, PduLoopReport, PowerFlowOrchestrator};
pub use power_flow::{solve_subnetwork, NewtonDcEmulation, SolveCase, SubnetworkSolver};
pub use settings::{DroopSettings, PduSetpointClamp, SizingMargins, VoltageLimits};
pub use sizing::{SizingEngine, SizingReport, TrialOutcome};
