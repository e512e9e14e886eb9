//! Converter part selection.

use crate::settings::SizingMargins;
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{Converter, CurveSource, Diagnostics, Kilowatts, Network};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConverterSizing {
    pub resized: usize,
    pub fallbacks: usize,
}

/// Give every converter with a catalogue the smallest part whose usable
/// rating exceeds the power it carried in the last pass.
///
/// When no part is large enough the largest one is installed and a
/// catalogue warning recorded.
pub fn size_converters(
    network: &mut Network,
    margins: &SizingMargins,
    diag: &mut Diagnostics,
) -> ConverterSizing {
    let mut sizing = ConverterSizing::default();
    for converter in network.converters_mut().filter(|c| c.is_sizable()) {
        let observed = converter.flow.map_or(Kilowatts::ZERO, |f| f.power.abs());
        let usable = margins.converter_usable_fraction(converter.kind);
        let chosen = converter
            .candidates
            .iter()
            .position(|part| part.nominal_power.value() * usable > observed.value());

        let rank = match chosen {
            Some(rank) => rank,
            None => {
                let largest = converter.candidates.len() - 1;
                warn!(
                    converter = %converter.name,
                    observed = observed.value(),
                    "no catalogue part covers the observed power, using the largest"
                );
                diag.add_warning_with_entity(
                    categories::CATALOGUE,
                    &format!(
                        "observed {:.2} kW exceeds every catalogue part, largest part ({:.2} kW) installed",
                        observed.value(),
                        converter.candidates[largest].nominal_power.value()
                    ),
                    &converter.name,
                );
                sizing.fallbacks += 1;
                largest
            }
        };

        if converter.catalog_rank != Some(rank) {
            sizing.resized += 1;
        }
        apply_catalogue_part(converter, rank);
        debug!(
            converter = %converter.name,
            rank,
            nominal = converter.nominal_power.value(),
            "converter sized"
        );
    }
    sizing
}

/// Install candidate `rank` on `converter`.
///
/// A user-defined efficiency curve keeps its shape and is stretched to the new
/// rating; a catalogue curve is replaced by the part's own.
pub fn apply_catalogue_part(converter: &mut Converter, rank: usize) {
    let Some(part) = converter.candidates.get(rank).cloned() else {
        return;
    };
    converter.efficiency = match converter.efficiency_source {
        CurveSource::UserDefined => converter
            .efficiency
            .rescaled(converter.nominal_power, part.nominal_power),
        CurveSource::Catalogue => part.efficiency_curve(),
    };
    converter.nominal_power = part.nominal_power;
    converter.standby_loss = part.standby_loss();
    converter.catalog_rank = Some(rank);
}
