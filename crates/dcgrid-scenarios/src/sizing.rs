//! Worst-case sizing of a whole installation.
//!
//! Three scenarios are sized independently on copies of the base network and
//! merged component by component:
//!
//! | Scenario | Sizes |
//! |---|---|
//! | storage | battery power and energy (each battery alone as the source) |
//! | cables and converters | cables, PDU, DC/AC, PV and EV converters |
//! | AC/DC | the AC/DC front end |
//!
//! The storage scenario runs first because its battery ratings feed the two
//! others. Those two are independent and run in parallel.

use anyhow::{anyhow, Context, Result};
use dcgrid_algo::{
    DroopSettings, PduSetpointClamp, PowerFlowOrchestrator, SizingEngine, SizingReport,
    SubnetworkSolver,
};
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{
    AssetId, BusId, CableCatalogue, ConverterKind, Diagnostics, ExtGridId, ExternalGrid, Kilowatts,
    Network, StorageState,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::apply::{apply_worst_case, isolate_storage, StorageMode};
use crate::merge::merge_max;
use crate::usecase::{UseCase, WorstCase};

/// Battery ratings are rounded up to this step.
pub const STORAGE_STEP_KW: f64 = 5.0;

/// Rating derived for one battery by the storage scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryRating {
    pub asset: usize,
    pub name: String,
    /// Power the battery had to supply alone
    pub drawn_kw: f64,
    pub nominal_kw: f64,
    pub energy_kwh: f64,
}

/// Plain load flow of the sized network under one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCheck {
    pub scenario: String,
    pub min_voltage_pu: f64,
    pub max_voltage_pu: f64,
    pub max_line_loading_percent: f64,
    pub max_converter_loading_percent: f64,
    pub grid_supply_kw: f64,
}

#[derive(Debug, Clone)]
pub struct SizingOutcome {
    pub network: Network,
    pub batteries: Vec<BatteryRating>,
    pub cables_and_converters: SizingReport,
    pub ac_dc: SizingReport,
}

/// Runs the sizing scenarios of a use case against a base network.
pub struct ScenarioPlanner<'a> {
    use_case: &'a UseCase,
    cables: &'a CableCatalogue,
    solver: Arc<dyn SubnetworkSolver>,
    settings: DroopSettings,
    clamp: PduSetpointClamp,
}

impl<'a> ScenarioPlanner<'a> {
    pub fn new(
        use_case: &'a UseCase,
        cables: &'a CableCatalogue,
        solver: Arc<dyn SubnetworkSolver>,
    ) -> Self {
        Self {
            use_case,
            cables,
            solver,
            settings: DroopSettings::default(),
            clamp: PduSetpointClamp::default(),
        }
    }

    pub fn with_settings(mut self, settings: DroopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setpoint_clamp(mut self, clamp: PduSetpointClamp) -> Self {
        self.clamp = clamp;
        self
    }

    fn orchestrator(&self, network: &Network) -> Result<PowerFlowOrchestrator> {
        let orchestrator = PowerFlowOrchestrator::new(network, Arc::clone(&self.solver))?
            .with_settings(self.settings)
            .with_setpoint_clamp(self.clamp)
            .with_voltage_limits(self.use_case.project.ecosystem.voltage_limits());
        Ok(orchestrator)
    }

    fn scaled(&self, base: &Network, case: &WorstCase, storage: StorageMode) -> Network {
        let mut network = base.clone();
        apply_worst_case(
            &mut network,
            case,
            self.use_case.sizing.load_expansion_percent,
            storage,
        );
        network
    }

    /// Size cables and converters of `base` under one worst case.
    pub fn size_scenario(
        &self,
        base: &Network,
        case: &WorstCase,
        diag: &mut Diagnostics,
    ) -> Result<(Network, SizingReport)> {
        let mut network = self.scaled(base, case, StorageMode::AsConfigured);
        let orchestrator = self.orchestrator(&network)?;
        let report = SizingEngine::new(&orchestrator, self.cables)
            .with_margins(self.use_case.sizing.margins())
            .run(&mut network, diag)?;
        Ok((network, report))
    }

    /// Whether the network has a storage converter the storage scenario can size
    pub fn needs_storage_sizing(network: &Network) -> bool {
        network
            .converters()
            .any(|c| c.kind == ConverterKind::StorageDcDc && c.catalog_rank.is_some())
    }

    /// Size every battery as the only source of the storage worst case.
    ///
    /// **Algorithm:**
    /// 1. Scale a copy of `base` to the storage case and take every external
    ///    grid and battery out of service.
    /// 2. For each battery, install a 1.0 p.u. grid at its bus and run the
    ///    sizing engine on that copy.
    /// 3. Round the power the grid supplies up to a multiple of
    ///    [`STORAGE_STEP_KW`]; the energy is that rating times the storage
    ///    duration.
    ///
    /// Returns the ratings and the sized copies, one per battery.
    pub fn size_storage(
        &self,
        base: &Network,
        diag: &mut Diagnostics,
    ) -> Result<(Vec<BatteryRating>, Vec<Network>)> {
        let case = &self.use_case.scenarios.storage;
        let hours = case
            .storage_duration_h
            .ok_or_else(|| anyhow!("scenario 'storage' needs storage_duration_h"))?;

        let mut isolated = self.scaled(base, case, StorageMode::AsConfigured);
        isolate_storage(&mut isolated);
        let grid_id = ExtGridId::new(
            isolated
                .ext_grids()
                .map(|g| g.id.value() + 1)
                .max()
                .unwrap_or(0),
        );
        let batteries: Vec<(AssetId, String, BusId)> = isolated
            .assets()
            .filter(|a| a.is_battery())
            .map(|a| (a.id, a.name.clone(), a.bus))
            .collect();

        let runs: Vec<Result<(BatteryRating, Network, Diagnostics)>> = batteries
            .par_iter()
            .map(|(asset, name, bus)| {
                let mut network = isolated.clone();
                network.add_ext_grid(ExternalGrid::new(grid_id, *bus));
                let mut local = Diagnostics::new();
                let orchestrator = self.orchestrator(&network)?;
                SizingEngine::new(&orchestrator, self.cables)
                    .with_margins(self.use_case.sizing.margins())
                    .run(&mut network, &mut local)
                    .with_context(|| format!("sizing the network supplied by {name}"))?;

                let drawn = network
                    .ext_grids()
                    .find(|g| g.id == grid_id)
                    .and_then(|g| g.result)
                    .unwrap_or(Kilowatts::ZERO)
                    .value();
                let nominal = round_up_to_step(drawn);
                info!(battery = %name, drawn_kw = drawn, nominal_kw = nominal, "battery sized");
                let rating = BatteryRating {
                    asset: asset.value(),
                    name: name.clone(),
                    drawn_kw: drawn,
                    nominal_kw: nominal,
                    energy_kwh: nominal * hours,
                };
                Ok((rating, network, local))
            })
            .collect();

        let mut ratings = Vec::with_capacity(runs.len());
        let mut sized = Vec::with_capacity(runs.len());
        for run in runs {
            let (rating, network, local) = run?;
            diag.merge(local);
            ratings.push(rating);
            sized.push(network);
        }
        Ok((ratings, sized))
    }

    /// Run the three scenarios and merge their results into `base`.
    ///
    /// Battery ratings are written into `base` before the other scenarios
    /// run, so their storage contribution uses the sized batteries.
    pub fn run(&self, base: &Network, diag: &mut Diagnostics) -> Result<SizingOutcome> {
        let mut network = base.clone();

        let (batteries, storage_runs) = if Self::needs_storage_sizing(&network) {
            let (ratings, sized) = self.size_storage(&network, diag)?;
            apply_battery_ratings(&mut network, &ratings);
            (ratings, sized)
        } else {
            warn!("no Storage DC/DC converter with a catalogue part; storage sizing skipped");
            diag.add_warning(
                categories::SCENARIO,
                "storage sizing skipped: no Storage DC/DC converter with a catalogue part",
            );
            (Vec::new(), Vec::new())
        };

        let scenarios = &self.use_case.scenarios;
        let mut cables_diag = Diagnostics::new();
        let mut ac_dc_diag = Diagnostics::new();
        let (cables_and_converters, ac_dc) = rayon::join(
            || self.size_scenario(&network, &scenarios.cables_and_converters, &mut cables_diag),
            || self.size_scenario(&network, &scenarios.ac_dc, &mut ac_dc_diag),
        );
        diag.merge(cables_diag);
        diag.merge(ac_dc_diag);
        let (mut merged, cables_report) =
            cables_and_converters.context("sizing the cables and converters scenario")?;
        let (ac_dc_network, ac_dc_report) = ac_dc.context("sizing the AC/DC scenario")?;

        for sized in &storage_runs {
            merge_max(&mut merged, sized);
        }
        let taken = merge_max(&mut merged, &ac_dc_network);
        info!(
            batteries = batteries.len(),
            converters_from_ac_dc = taken.converters,
            lines_from_ac_dc = taken.lines,
            "scenario results merged"
        );

        // setpoints and results of the merged copy belong to one scenario only
        restore_setpoints(&mut merged, &network);
        Ok(SizingOutcome {
            network: merged,
            batteries,
            cables_and_converters: cables_report,
            ac_dc: ac_dc_report,
        })
    }

    /// Re-run a plain load flow of `sized` under every scenario, batteries
    /// discharging, for reporting.
    pub fn validate(&self, sized: &Network, diag: &mut Diagnostics) -> Result<Vec<ScenarioCheck>> {
        let include_storage = Self::needs_storage_sizing(sized);
        let cases: Vec<_> = self
            .use_case
            .scenarios
            .labelled()
            .into_iter()
            .filter(|(label, _)| include_storage || *label != "storage")
            .collect();

        let runs: Vec<Result<(ScenarioCheck, Diagnostics)>> = cases
            .par_iter()
            .map(|(label, case)| {
                let mut network = self.scaled(sized, case, StorageMode::Discharging);
                let mut local = Diagnostics::new();
                self.orchestrator(&network)?
                    .solve(&mut network, &mut local)
                    .with_context(|| format!("validating scenario '{label}'"))?;
                Ok((summarize(label, &network), local))
            })
            .collect();

        let mut checks = Vec::with_capacity(runs.len());
        for run in runs {
            let (check, local) = run?;
            diag.merge(local);
            checks.push(check);
        }
        Ok(checks)
    }
}

fn round_up_to_step(kw: f64) -> f64 {
    (kw.max(0.0) / STORAGE_STEP_KW).ceil() * STORAGE_STEP_KW
}

/// Write battery ratings into the network: power and nominal at the rating,
/// energy capacity from the autonomy.
pub fn apply_battery_ratings(network: &mut Network, ratings: &[BatteryRating]) {
    for rating in ratings {
        let Some(asset) = network.asset_mut(AssetId::new(rating.asset)) else {
            continue;
        };
        asset.nominal_power = Kilowatts(rating.nominal_kw);
        asset.power = Kilowatts(rating.nominal_kw);
        let soc_percent = asset.storage.map_or(50.0, |s| s.soc_percent);
        asset.storage = Some(StorageState {
            soc_percent,
            energy_capacity_kwh: rating.energy_kwh,
        });
    }
}

fn restore_setpoints(merged: &mut Network, base: &Network) {
    for asset in merged.assets_mut() {
        if let Some(original) = base.assets().find(|a| a.id == asset.id) {
            asset.power = original.power;
            asset.result = None;
        }
    }
}

fn summarize(label: &str, network: &Network) -> ScenarioCheck {
    let voltages: Vec<f64> = network
        .buses()
        .filter_map(|b| b.voltage_pu.map(|v| v.value()))
        .collect();
    ScenarioCheck {
        scenario: label.to_string(),
        min_voltage_pu: voltages.iter().copied().fold(f64::INFINITY, f64::min),
        max_voltage_pu: voltages.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        max_line_loading_percent: peak(
            network.lines().filter_map(|l| l.flow.map(|f| f.loading_percent)),
        ),
        max_converter_loading_percent: peak(
            network.converters().filter_map(|c| c.flow.map(|f| f.loading_percent)),
        ),
        grid_supply_kw: network
            .active_ext_grids()
            .filter_map(|g| g.result.map(|p| p.value()))
            .sum(),
    }
}

fn peak(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}
