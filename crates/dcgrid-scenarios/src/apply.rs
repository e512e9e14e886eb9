use dcgrid_core::{AssetKind, Kilowatts, Network};

use crate::usecase::WorstCase;

/// How battery setpoints are treated when a worst case is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StorageMode {
    /// Batteries keep their setpoint unless the case names a contribution
    AsConfigured,
    /// Batteries always discharge, at the case contribution or 100 %
    Discharging,
}

/// Scale a network to one worst case, in place.
///
/// **Algorithm:**
/// 1. Loads: `nominal × load% × expansion%`.
/// 2. Generators: `nominal × pv%`.
/// 3. EV chargers: `nominal × ev%`.
/// 4. Batteries: `−|nominal| × storage%`, when the case has a contribution
///    (or always, with 100 % as default, under [`StorageMode::Discharging`]).
///
/// Scaling starts from `nominal_power`, so applying a case twice gives the
/// same setpoints as applying it once.
pub fn apply_worst_case(
    network: &mut Network,
    case: &WorstCase,
    load_expansion_percent: f64,
    storage: StorageMode,
) {
    let contribution = match storage {
        StorageMode::AsConfigured => case.storage_contribution_percent,
        StorageMode::Discharging => Some(case.storage_contribution_percent.unwrap_or(100.0)),
    };
    let load_factor = case.load_percent / 100.0 * load_expansion_percent / 100.0;

    for asset in network.assets_mut() {
        let scaled = match asset.kind {
            AssetKind::Load => asset.nominal_power * load_factor,
            AssetKind::Generator => asset.nominal_power * (case.pv_percent / 100.0),
            AssetKind::EvCharger => asset.nominal_power * (case.ev_percent / 100.0),
            AssetKind::Battery => match contribution {
                Some(percent) => -asset.nominal_power.abs() * (percent / 100.0),
                None => continue,
            },
        };
        asset.power = scaled;
    }
}

/// Take every active external grid and battery out of service, leaving a
/// network with no supply of its own.
pub fn isolate_storage(network: &mut Network) {
    for grid in network.ext_grids_mut() {
        grid.in_service = false;
    }
    for asset in network.assets_mut().filter(|a| a.is_battery()) {
        asset.in_service = false;
        asset.power = Kilowatts::ZERO;
    }
}
