//! Sequential time-step loop.
//!
//! Steps cannot run in parallel: the SOC of every battery carries over from
//! one step to the next.

use std::collections::HashSet;

use anyhow::{Context, Result};
use dcgrid_algo::{DroopControlLoop, DroopReport, PowerFlowOrchestrator, TimeStep};
use dcgrid_algo::droop::profile_value;
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{AssetId, AssetOrigin, Diagnostics, Network};
use tracing::{debug, info, warn};

use crate::results::ResultsTable;
use crate::summary::EnergySummary;
use crate::Horizon;

/// Everything a time-series run produces
#[derive(Debug)]
pub struct TimeSeriesRun {
    pub results: ResultsTable,
    /// Solved network after every step, in step order
    pub snapshots: Vec<Network>,
    pub reports: Vec<DroopReport>,
    pub step_hours: f64,
}

impl TimeSeriesRun {
    pub fn summary(&self) -> EnergySummary {
        EnergySummary::from_snapshots(&self.snapshots, self.step_hours)
    }

    /// Steps whose droop loop hit its iteration cap
    pub fn unconverged_steps(&self) -> usize {
        self.reports.iter().filter(|r| !r.converged).count()
    }
}

pub struct TimeSeriesSimulator<'a> {
    orchestrator: &'a PowerFlowOrchestrator,
    horizon: Horizon,
}

impl<'a> TimeSeriesSimulator<'a> {
    pub fn new(orchestrator: &'a PowerFlowOrchestrator, horizon: Horizon) -> Self {
        Self {
            orchestrator,
            horizon,
        }
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Run every step of the horizon on `network`.
    ///
    /// The network is left in the state of the last step.
    pub fn run(&self, network: &mut Network, diag: &mut Diagnostics) -> Result<TimeSeriesRun> {
        let steps = self.horizon.steps();
        let hours = self.horizon.step_hours();
        let droop = DroopControlLoop::new(self.orchestrator);
        let mut results = ResultsTable::for_network(network);
        let mut snapshots = Vec::with_capacity(steps);
        let mut reports = Vec::with_capacity(steps);
        let mut clamped = HashSet::new();

        info!(steps, step_hours = hours, "starting time-series run");
        for index in 0..steps {
            let step = (steps > 1).then_some(TimeStep { index, hours });
            if let Some(step) = step {
                update_setpoints(network, step.index, &mut clamped, diag);
            }
            let report = droop
                .run(network, step, diag)
                .with_context(|| format!("solving timestep {index}"))?;
            debug!(
                index,
                iterations = report.iterations,
                error_percent = report.error_percent,
                "timestep solved"
            );

            results.push_row(network)?;
            snapshots.push(network.clone());
            reports.push(report);
        }

        let run = TimeSeriesRun {
            results,
            snapshots,
            reports,
            step_hours: hours,
        };
        info!(
            steps,
            unconverged = run.unconverged_steps(),
            "time-series run finished"
        );
        Ok(run)
    }
}

/// Profile-driven setpoints for the non-battery assets.
///
/// Profiles shorter than the horizon hold their last value; each asset is
/// reported once.
fn update_setpoints(
    network: &mut Network,
    index: usize,
    clamped: &mut HashSet<AssetId>,
    diag: &mut Diagnostics,
) {
    for asset in network
        .assets_mut()
        .filter(|a| a.origin == AssetOrigin::Modelled && !a.is_battery())
    {
        let Some((value, was_clamped)) = asset.profile.as_deref().and_then(|p| profile_value(p, index))
        else {
            continue;
        };
        if was_clamped && clamped.insert(asset.id) {
            warn!(asset = %asset.name, index, "profile shorter than the horizon, holding last value");
            diag.add_warning_with_entity(
                categories::PROFILE,
                &format!("profile ends before timestep {index}, last value reused"),
                &asset.name,
            );
        }
        asset.power = asset.nominal_power * value;
    }
}
