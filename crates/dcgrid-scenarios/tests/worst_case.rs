//! Worst-case sizing of a small installation: 750 V grid, AC/DC front end,
//! 400 V feeder with a load, and a battery behind a Storage DC/DC converter.

use dcgrid_algo::NewtonDcEmulation;
use dcgrid_core::*;
use dcgrid_scenarios::{merge_max, ScenarioPlanner, SizedNetworkReport, UseCase};
use std::sync::Arc;

const USE_CASE: &str = r#"
project:
  name: workshop
  ecosystem: CurrentOS
scenarios:
  storage:
    load_percent: 100
    pv_percent: 0
    ev_percent: 100
    storage_duration_h: 2
  cables_and_converters:
    load_percent: 100
    pv_percent: 0
    ev_percent: 100
  ac_dc:
    load_percent: 100
    pv_percent: 0
    ev_percent: 100
    storage_contribution_percent: 100
"#;

fn cables() -> CableCatalogue {
    CableCatalogue::from_specs(
        [
            (1.5, 0.0121, 20.0),
            (4.0, 0.0046, 36.0),
            (10.0, 0.0018, 63.0),
            (25.0, 0.0007, 110.0),
            (50.0, 0.00039, 160.0),
        ]
        .into_iter()
        .map(|(section_mm2, resistance_ohm_per_m, imax)| CableSpec {
            section_mm2,
            resistance_ohm_per_m,
            max_current: Amperes(imax),
        })
        .collect(),
    )
}

fn part(kind: ConverterKind, v1: f64, v2: f64, kw: f64) -> ConverterSpec {
    ConverterSpec {
        ecosystem: "CurrentOS".into(),
        kind,
        voltage_v1: v1,
        voltage_v2: v2,
        nominal_power: Kilowatts(kw),
        efficiency_percent: vec![[10.0, 92.0], [50.0, 96.0], [100.0, 95.0]],
        standby_loss_w: 2.0 * kw,
    }
}

fn workshop(catalogue: &CableCatalogue) -> Network {
    let rank = catalogue.largest_rank().unwrap();
    let cable = *catalogue.get(rank).unwrap();
    let mut network = Network::new();
    for (id, v) in [(0, 750.0), (1, 400.0), (2, 400.0), (3, 48.0)] {
        network.add_bus(Bus::new(BusId::new(id), Volts(v)));
    }
    network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
    network
        .add_line(
            Line::new(LineId::new(0), BusId::new(1), BusId::new(2), 20.0, 0.0)
                .with_cable(rank, &cable),
        )
        .unwrap();

    let ac_dc: Vec<_> = [10.0, 50.0, 100.0]
        .map(|kw| part(ConverterKind::AcDc, 750.0, 400.0, kw))
        .to_vec();
    let storage: Vec<_> = [5.0, 10.0, 20.0]
        .map(|kw| part(ConverterKind::StorageDcDc, 400.0, 48.0, kw))
        .to_vec();
    for (id, (from, to, kind, parts)) in [
        (0, 1, ConverterKind::AcDc, ac_dc),
        (2, 3, ConverterKind::StorageDcDc, storage),
    ]
    .into_iter()
    .enumerate()
    {
        let largest = parts.len() - 1;
        let spec = parts[largest].clone();
        network
            .add_converter(
                Converter::new(
                    ConverterId::new(id),
                    format!("{kind} {id}"),
                    BusId::new(from),
                    BusId::new(to),
                    kind,
                    spec.nominal_power,
                )
                .with_efficiency(spec.efficiency_curve(), CurveSource::Catalogue)
                .with_catalogue(parts, largest),
            )
            .unwrap();
    }

    network.add_asset(Asset::new(
        AssetId::new(0),
        "machines",
        BusId::new(2),
        AssetKind::Load,
        Kilowatts(8.0),
    ));
    network.add_asset(
        Asset::new(
            AssetId::new(1),
            "Battery 3",
            BusId::new(3),
            AssetKind::Battery,
            Kilowatts::ZERO,
        )
        .with_storage(50.0, 0.0),
    );
    network
}

fn use_case() -> UseCase {
    serde_yaml::from_str(USE_CASE).unwrap()
}

#[test]
fn battery_covers_the_load_alone() {
    let use_case = use_case();
    let catalogue = cables();
    let network = workshop(&catalogue);
    let planner = ScenarioPlanner::new(&use_case, &catalogue, Arc::new(NewtonDcEmulation::default()));
    assert!(ScenarioPlanner::needs_storage_sizing(&network));

    let mut diag = Diagnostics::new();
    let (ratings, sized) = planner.size_storage(&network, &mut diag).unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(sized.len(), 1);

    let rating = &ratings[0];
    // the load plus converter and cable losses
    assert!(rating.drawn_kw > 8.0 && rating.drawn_kw < 10.0, "{rating:?}");
    assert_eq!(rating.nominal_kw, 10.0);
    assert_eq!(rating.energy_kwh, 20.0);

    // the base network is untouched, the copy was supplied from the battery bus
    assert_eq!(network.ext_grids().count(), 1);
    let copy = &sized[0];
    assert_eq!(copy.active_ext_grids().count(), 1);
    assert_eq!(copy.active_ext_grids().next().unwrap().bus, BusId::new(3));
}

#[test]
fn merged_network_keeps_the_most_demanding_scenario() {
    let use_case = use_case();
    let catalogue = cables();
    let network = workshop(&catalogue);
    let planner = ScenarioPlanner::new(&use_case, &catalogue, Arc::new(NewtonDcEmulation::default()));

    let mut diag = Diagnostics::new();
    let outcome = planner.run(&network, &mut diag).unwrap();
    assert!(!diag.has_errors(), "{}", diag.summary());

    let battery = outcome.network.assets().find(|a| a.is_battery()).unwrap();
    assert_eq!(battery.nominal_power, Kilowatts(10.0));
    assert_eq!(battery.storage.unwrap().energy_capacity_kwh, 20.0);

    // charging at 10 kW next to the 8 kW load needs the 50 kW front end,
    // discharging (the AC/DC scenario) would have left the 10 kW part
    let ac_dc = outcome.network.converter(ConverterId::new(0)).unwrap();
    assert_eq!(ac_dc.nominal_power, Kilowatts(50.0));
    assert_eq!(ac_dc.catalog_rank, Some(1));
    let storage = outcome.network.converter(ConverterId::new(1)).unwrap();
    assert_eq!(storage.nominal_power, Kilowatts(20.0));

    let line = outcome.network.line(LineId::new(0)).unwrap();
    assert!(line.cable_rank.is_some());
    assert!(line.cable_rank < catalogue.largest_rank());

    let checks = planner.validate(&outcome.network, &mut diag).unwrap();
    let labels: Vec<_> = checks.iter().map(|c| c.scenario.as_str()).collect();
    assert_eq!(labels, ["storage", "cables_and_converters", "ac_dc"]);
    for check in &checks {
        assert!(check.min_voltage_pu > 0.9 && check.max_voltage_pu < 1.1, "{check:?}");
    }

    let report = SizedNetworkReport::from_outcome("workshop", &outcome, checks);
    assert_eq!(report.converters.len(), 2);
    assert_eq!(report.batteries.len(), 1);
}

#[test]
fn storage_sizing_is_skipped_without_a_catalogue_part() {
    let use_case = use_case();
    let catalogue = cables();
    let mut network = workshop(&catalogue);
    for converter in network.converters_mut() {
        if converter.kind == ConverterKind::StorageDcDc {
            converter.catalog_rank = None;
        }
    }
    let planner = ScenarioPlanner::new(&use_case, &catalogue, Arc::new(NewtonDcEmulation::default()));
    let mut diag = Diagnostics::new();
    let outcome = planner.run(&network, &mut diag).unwrap();

    assert!(outcome.batteries.is_empty());
    assert_eq!(
        diag.issues_by_category(diagnostics::categories::SCENARIO).count(),
        1
    );
}

#[test]
fn merge_keeps_larger_converter_rating() {
    let catalogue = cables();
    let mut fifty = workshop(&catalogue);
    let mut eighty = workshop(&catalogue);
    for (network, kw) in [(&mut fifty, 50.0), (&mut eighty, 80.0)] {
        let converter = network.converter_mut(ConverterId::new(0)).unwrap();
        converter.nominal_power = Kilowatts(kw);
    }

    let smaller = fifty.clone();
    let report = merge_max(&mut fifty, &eighty);
    assert_eq!(report.converters, 1);
    assert_eq!(
        fifty.converter(ConverterId::new(0)).unwrap().nominal_power,
        Kilowatts(80.0)
    );

    // merging back the smaller network changes nothing
    let report = merge_max(&mut eighty, &smaller);
    assert_eq!(report.converters, 0);
    assert_eq!(
        eighty.converter(ConverterId::new(0)).unwrap().nominal_power,
        Kilowatts(80.0)
    );
}
