use dcgrid_core::Network;

/// Components taken over from the other network by [`merge_max`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub converters: usize,
    pub lines: usize,
}

/// Keep the larger of two sizing results for every component.
///
/// Converters are compared by nominal power and lines by ampacity. The
/// winner's rating travels as a whole (rating, curve, standby loss and
/// catalogue rank for converters, resistance, ampacity, section and rank for
/// lines), so a component never mixes parameters of two parts.
///
/// Components are matched by id; both networks must come from the same
/// base network.
pub fn merge_max(into: &mut Network, other: &Network) -> MergeReport {
    let mut report = MergeReport::default();

    for converter in into.converters_mut() {
        let Some(theirs) = other.converter(converter.id) else {
            continue;
        };
        if theirs.nominal_power.value() > converter.nominal_power.value() {
            converter.nominal_power = theirs.nominal_power;
            converter.efficiency = theirs.efficiency.clone();
            converter.standby_loss = theirs.standby_loss;
            converter.catalog_rank = theirs.catalog_rank;
            report.converters += 1;
        }
    }

    for line in into.lines_mut() {
        let Some(theirs) = other.line(line.id) else {
            continue;
        };
        if theirs.max_current.value() > line.max_current.value() {
            line.resistance_ohm_per_m = theirs.resistance_ohm_per_m;
            line.max_current = theirs.max_current;
            line.section_mm2 = theirs.section_mm2;
            line.cable_rank = theirs.cable_rank;
            report.lines += 1;
        }
    }

    report
}
