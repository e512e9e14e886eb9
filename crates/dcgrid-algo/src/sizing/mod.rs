//! # Catalogue-driven sizing
//!
//! Sizing runs in three steps on one network:
//!
//! 1. **Converters**: one pass with flat setpoints, then every converter with
//!    a catalogue takes the smallest part whose usable rating covers the
//!    observed power ([`converter::size_converters`]).
//! 2. **Cables**: a second pass where each subnetwork copy is sized in place
//!    before its demand is carried upstream ([`cable::CableSizer`]). Leaves are
//!    sized first, so feeders see the demand of already-sized leaves.
//! 3. **Check**: a final pass and the high-voltage alert.
//!
//! Each trial solve yields a [`TrialOutcome`]. Only numerical failure of the
//! solver becomes `Failed`; every other error aborts sizing.

pub mod cable;
pub mod converter;

use crate::orchestrator::{PassOptions, PowerFlowOrchestrator};
use crate::power_flow::{solve_subnetwork, SubnetworkSolver};
use crate::settings::SizingMargins;
use cable::{CableSizer, CableStats};
use dcgrid_core::{CableCatalogue, DcGridResult, Diagnostics, Network};
use tracing::info;

pub use converter::{apply_catalogue_part, size_converters};

/// Result of one trial solve during sizing
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Converged,
    Failed(String),
}

impl TrialOutcome {
    /// Solve `network` once and classify the result.
    pub fn solve(solver: &dyn SubnetworkSolver, network: &mut Network) -> DcGridResult<Self> {
        match solve_subnetwork(solver, network) {
            Ok(_) => Ok(Self::Converged),
            Err(err) if err.is_non_convergence() => Ok(Self::Failed(err.to_string())),
            Err(err) => Err(err),
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizingReport {
    /// Converters whose catalogue part changed
    pub converters_resized: usize,
    /// Converters that fell back to the largest part
    pub converter_fallbacks: usize,
    pub lines_resized: usize,
    /// One-step upgrades made to keep feeders at least as large as their branches
    pub consistency_bumps: usize,
}

pub struct SizingEngine<'a> {
    orchestrator: &'a PowerFlowOrchestrator,
    cables: &'a CableCatalogue,
    margins: SizingMargins,
}

impl<'a> SizingEngine<'a> {
    pub fn new(orchestrator: &'a PowerFlowOrchestrator, cables: &'a CableCatalogue) -> Self {
        Self {
            orchestrator,
            cables,
            margins: SizingMargins::default(),
        }
    }

    pub fn with_margins(mut self, margins: SizingMargins) -> Self {
        self.margins = margins;
        self
    }

    /// Size converters, then cables, and leave the network solved with the chosen parts.
    pub fn run(&self, network: &mut Network, diag: &mut Diagnostics) -> DcGridResult<SizingReport> {
        let mut report = SizingReport::default();

        self.orchestrator.run_pass(network, PassOptions::SIZING)?;
        let converters = size_converters(network, &self.margins, diag);
        report.converters_resized = converters.resized;
        report.converter_fallbacks = converters.fallbacks;

        let sizer = CableSizer::new(
            self.orchestrator.solver().as_ref(),
            self.cables,
            self.margins.cable_loading_limit(),
            self.orchestrator.voltage_limits().min,
        );
        let mut stats = CableStats::default();
        self.orchestrator
            .run_pass_with(network, PassOptions::CABLE_TRIAL, |_, copy| {
                sizer.size(copy, &mut stats)
            })?;
        report.lines_resized = stats.resized;
        report.consistency_bumps = stats.bumps;

        self.orchestrator.run_pass(network, PassOptions::SIZING)?;
        self.orchestrator.check_high_voltage(network, diag);

        info!(
            converters = report.converters_resized,
            fallbacks = report.converter_fallbacks,
            lines = report.lines_resized,
            bumps = report.consistency_bumps,
            "sizing finished"
        );
        Ok(report)
    }
}
