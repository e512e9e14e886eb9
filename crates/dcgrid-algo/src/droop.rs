//! # Asset droop control
//!
//! Loads, generators and storage scale their power with the voltage of the
//! bus that governs them. The loop below wraps the PDU loop of the
//! orchestrator and iterates on a relaxed voltage estimate:
//!
//! ```text
//!   solve → v_est
//!   repeat (≤ max_iterations):
//!     setpoints ← droop(v_est) · nominal · profile[t]
//!     solve → v_last
//!     v_new = (1 − α) · v_est + α · v_last
//!     stop when max |v_new − v_est| / v_new < tolerance (percent)
//!     v_est = v_new
//! ```
//!
//! Batteries integrate their state of charge over the timestep. When the
//! projected SOC would leave its band the power is back-solved so the SOC lands
//! exactly on the bound. The new SOC is committed once the loop ends.

use crate::orchestrator::{PduLoopReport, PowerFlowOrchestrator};
use crate::settings::DroopSettings;
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{
    Asset, AssetId, AssetOrigin, BusId, DcGridResult, Diagnostics, DroopCurve, Kilowatts, Network,
    PerUnit,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Position in the simulated horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub index: usize,
    pub hours: f64,
}

/// Outcome of one droop-controlled solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroopReport {
    pub iterations: usize,
    /// Largest relative voltage change of the last iteration, in percent
    pub error_percent: f64,
    pub converged: bool,
    /// PDU loops that stopped at their cap
    pub capped_pdu_loops: usize,
}

/// Profile value at `index`, or the last value when the profile is shorter.
///
/// The flag reports that the index was clamped.
pub fn profile_value(profile: &[f64], index: usize) -> Option<(f64, bool)> {
    match profile.get(index) {
        Some(&value) => Some((value, false)),
        None => profile.last().map(|&value| (value, true)),
    }
}

/// Battery power and resulting SOC over `hours`, clamped to the SOC band.
///
/// A battery without capacity keeps its SOC and requested power.
pub fn integrate_soc(
    power: Kilowatts,
    soc_percent: f64,
    capacity_kwh: f64,
    hours: f64,
    settings: &DroopSettings,
) -> (Kilowatts, f64) {
    if capacity_kwh <= 0.0 || hours <= 0.0 {
        return (power, soc_percent);
    }
    let projected = soc_percent + power.value() * hours / capacity_kwh * 100.0;
    let bound = if projected < settings.soc_min_percent {
        settings.soc_min_percent
    } else if projected > settings.soc_max_percent {
        settings.soc_max_percent
    } else {
        return (power, projected);
    };
    let clamped = (bound - soc_percent) / (100.0 * hours) * capacity_kwh;
    (Kilowatts(clamped), bound)
}

/// Bus whose voltage drives an asset, with the curve that applies.
///
/// A converter on the asset's bus hands control to its opposite terminal;
/// otherwise the linked converter's output bus; otherwise the asset's own bus.
pub fn governing(network: &Network, asset: &Asset) -> (BusId, DroopCurve) {
    let via = network
        .converters_at_bus(asset.bus)
        .next()
        .map(|c| (c.opposite(asset.bus), c))
        .or_else(|| {
            asset
                .linked_converter
                .and_then(|id| network.converter(id))
                .map(|c| (c.to_bus, c))
        });
    match via {
        Some((bus, converter)) => (
            bus,
            converter.droop.clone().unwrap_or_else(DroopCurve::default_asset),
        ),
        None => (
            asset.bus,
            asset.droop.clone().unwrap_or_else(DroopCurve::default_asset),
        ),
    }
}

pub struct DroopControlLoop<'a> {
    orchestrator: &'a PowerFlowOrchestrator,
}

impl<'a> DroopControlLoop<'a> {
    pub fn new(orchestrator: &'a PowerFlowOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Solve `network` with voltage-dependent setpoints.
    ///
    /// `step` selects the profile value and the SOC integration interval;
    /// without it assets run at nominal power and SOC stays put.
    pub fn run(
        &self,
        network: &mut Network,
        step: Option<TimeStep>,
        diag: &mut Diagnostics,
    ) -> DcGridResult<DroopReport> {
        let settings = *self.orchestrator.settings();
        let mut capped_pdu_loops = 0;
        let mut tally = |report: PduLoopReport| {
            if !report.converged {
                capped_pdu_loops += 1;
            }
        };

        tally(self.orchestrator.run_pdu_loop(network)?);
        let mut v_est = voltages(network);
        let soc_start: HashMap<AssetId, f64> = network
            .assets()
            .filter(|a| a.is_battery())
            .filter_map(|a| a.storage.map(|s| (a.id, s.soc_percent)))
            .collect();
        let mut soc_end = HashMap::new();

        let alpha = settings.relaxation;
        let mut error_percent = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;
        while iterations < settings.max_iterations {
            iterations += 1;
            self.apply_setpoints(network, &v_est, step, &soc_start, &mut soc_end, &settings);
            tally(self.orchestrator.run_pdu_loop(network)?);

            let v_last = voltages(network);
            error_percent = 0.0;
            for (bus, estimate) in v_est.iter_mut() {
                let last = v_last.get(bus).copied().unwrap_or(*estimate);
                let next = *estimate * (1.0 - alpha) + last * alpha;
                if next.abs() > 1e-12 {
                    error_percent = error_percent.max((next - *estimate).abs() / next * 100.0);
                }
                *estimate = next;
            }
            if error_percent < settings.tolerance_percent {
                converged = true;
                break;
            }
        }

        if converged {
            debug!(iterations, error_percent, "droop loop converged");
        } else {
            warn!(iterations, error_percent, "droop loop reached its iteration cap");
            diag.add_warning(
                categories::CONVERGENCE,
                &format!(
                    "droop loop stopped after {iterations} iterations with {error_percent:.3e} % voltage change"
                ),
            );
        }
        if capped_pdu_loops > 0 {
            diag.add_warning(
                categories::CONVERGENCE,
                &format!("PDU loop reached its iteration cap in {capped_pdu_loops} solves"),
            );
        }

        for asset in network.assets_mut() {
            if let (Some(soc), Some(storage)) = (soc_end.get(&asset.id), asset.storage.as_mut()) {
                storage.soc_percent = *soc;
            }
        }
        self.orchestrator.check_high_voltage(network, diag);

        Ok(DroopReport {
            iterations,
            error_percent,
            converged,
            capped_pdu_loops,
        })
    }

    fn apply_setpoints(
        &self,
        network: &mut Network,
        v_est: &HashMap<BusId, f64>,
        step: Option<TimeStep>,
        soc_start: &HashMap<AssetId, f64>,
        soc_end: &mut HashMap<AssetId, f64>,
        settings: &DroopSettings,
    ) {
        let mut setpoints = Vec::new();
        for asset in network
            .assets()
            .filter(|a| a.in_service && a.origin == AssetOrigin::Modelled)
        {
            let (bus, curve) = governing(network, asset);
            let voltage = PerUnit(v_est.get(&bus).copied().unwrap_or(1.0));
            let scale = curve.scale_at(voltage);

            if asset.is_battery() {
                let requested = asset.nominal_power * scale;
                let integrated = match (step, asset.storage, soc_start.get(&asset.id)) {
                    (Some(step), Some(storage), Some(&soc)) => Some(integrate_soc(
                        requested,
                        soc,
                        storage.energy_capacity_kwh,
                        step.hours,
                        settings,
                    )),
                    _ => None,
                };
                match integrated {
                    Some((power, soc)) => {
                        soc_end.insert(asset.id, soc);
                        setpoints.push((asset.id, power));
                    }
                    None => setpoints.push((asset.id, requested)),
                }
            } else {
                let fraction = match (step, asset.profile.as_deref()) {
                    (Some(step), Some(profile)) => {
                        profile_value(profile, step.index).map_or(1.0, |(v, _)| v)
                    }
                    _ => 1.0,
                };
                setpoints.push((asset.id, asset.nominal_power * fraction * scale));
            }
        }

        for (id, power) in setpoints {
            if let Some(asset) = network.asset_mut(id) {
                asset.power = power;
            }
        }
    }
}

fn voltages(network: &Network) -> HashMap<BusId, f64> {
    network
        .buses()
        .filter_map(|b| b.voltage_pu.map(|v| (b.id, v.value())))
        .collect()
}
