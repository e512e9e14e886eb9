//! Energy balance of a time-series run.
//!
//! Generation counts PV output, discharging storage and grid import.
//! Consumption counts loads, charging storage and grid export. The efficiency
//! is the share of generated energy that reaches a consumer.

use dcgrid_core::{AssetKind, AssetOrigin, Kilowatts, Network};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub generated_kwh: f64,
    pub consumed_kwh: f64,
    pub cable_losses_kwh: f64,
    pub converter_losses_kwh: f64,
    /// `consumed / generated` in percent, 0 without generation
    pub efficiency_percent: f64,
}

impl EnergySummary {
    pub fn from_snapshots(snapshots: &[Network], step_hours: f64) -> Self {
        let mut summary = Self::default();
        for network in snapshots {
            let balance = StepBalance::of(network);
            summary.generated_kwh += balance.generated.over_hours(step_hours);
            summary.consumed_kwh += balance.consumed.over_hours(step_hours);
            summary.cable_losses_kwh += balance.cable_losses.over_hours(step_hours);
            summary.converter_losses_kwh += balance.converter_losses.over_hours(step_hours);
        }
        if summary.generated_kwh > 0.0 {
            summary.efficiency_percent = summary.consumed_kwh / summary.generated_kwh * 100.0;
        }
        summary
    }

    pub fn total_losses_kwh(&self) -> f64 {
        self.cable_losses_kwh + self.converter_losses_kwh
    }
}

#[derive(Default)]
struct StepBalance {
    generated: Kilowatts,
    consumed: Kilowatts,
    cable_losses: Kilowatts,
    converter_losses: Kilowatts,
}

impl StepBalance {
    fn of(network: &Network) -> Self {
        let mut balance = Self::default();
        let mut book = |power: Kilowatts| {
            if power.value() >= 0.0 {
                balance.consumed = balance.consumed + power;
            } else {
                balance.generated = balance.generated - power;
            }
        };

        for asset in network
            .assets()
            .filter(|a| a.origin == AssetOrigin::Modelled && a.in_service)
        {
            let Some(power) = asset.result else { continue };
            match asset.kind {
                AssetKind::Generator => book(-power),
                AssetKind::Load | AssetKind::Battery | AssetKind::EvCharger => book(power),
            }
        }
        for grid in network.ext_grids().filter(|g| g.is_active_slack()) {
            if let Some(supplied) = grid.result {
                book(-supplied);
            }
        }

        balance.cable_losses = network
            .lines()
            .filter_map(|l| l.flow.map(|f| f.loss))
            .sum();
        balance.converter_losses = network
            .converters()
            .filter_map(|c| c.flow.map(|f| f.loss))
            .sum();
        balance
    }
}
