//! Time-series runs on a 400 V feeder with a profiled load, a PV array and a
//! battery.

use dcgrid_algo::{NewtonDcEmulation, PowerFlowOrchestrator};
use dcgrid_core::*;
use dcgrid_ts::{EnergySummary, Horizon, ProfileGenerator, TimeSeriesSimulator};
use std::sync::Arc;
use tempfile::tempdir;

const SUNNY: [f64; 24] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.2, 0.4, 0.6, 0.8, 0.9, 1.0, 0.9, 0.8, 0.6, 0.4, 0.2,
    0.1, 0.0, 0.0, 0.0, 0.0, 0.0,
];

fn feeder() -> Network {
    let mut network = Network::new();
    for id in 0..3 {
        network.add_bus(Bus::new(BusId::new(id), Volts(400.0)));
    }
    network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
    network
        .add_line(Line::new(LineId::new(0), BusId::new(0), BusId::new(1), 30.0, 0.0018))
        .unwrap();
    network
        .add_line(Line::new(LineId::new(1), BusId::new(1), BusId::new(2), 15.0, 0.0018))
        .unwrap();
    network.add_asset(
        Asset::new(AssetId::new(0), "desk", BusId::new(1), AssetKind::Load, Kilowatts(4.0))
            .with_profile(vec![0.25, 0.5, 1.0]),
    );
    network.add_asset(
        Asset::new(
            AssetId::new(1),
            "Battery 2",
            BusId::new(2),
            AssetKind::Battery,
            Kilowatts(-2.0),
        )
        .with_storage(50.0, 10.0),
    );
    network
}

fn quarter_days() -> Horizon {
    Horizon {
        step_minutes: 360,
        days: 1,
    }
}

#[test]
fn profile_drives_each_step_and_soc_carries_over() {
    let mut network = feeder();
    let orch = PowerFlowOrchestrator::new(&network, Arc::new(NewtonDcEmulation::default())).unwrap();
    let mut diag = Diagnostics::new();
    let run = TimeSeriesSimulator::new(&orch, quarter_days())
        .run(&mut network, &mut diag)
        .unwrap();

    assert_eq!(run.snapshots.len(), 4);
    assert_eq!(run.results.len(), 4);
    assert_eq!(run.unconverged_steps(), 0);

    let load: Vec<f64> = run
        .results
        .column("load desk: p_kw")
        .unwrap()
        .iter()
        .map(|v| v.unwrap())
        .collect();
    assert_eq!(load, [1.0, 2.0, 4.0, 4.0]);
    // the profile ran out once, reported once
    assert_eq!(
        diag.issues_by_category(diagnostics::categories::PROFILE).count(),
        1
    );

    // 2 kW over 6 h would empty a 10 kWh battery; it stops at 10 % in step 0
    let soc = run.results.column("storage Battery 2: SOC").unwrap();
    assert!(soc.iter().all(|v| (v.unwrap() - 10.0).abs() < 1e-9), "{soc:?}");
    let battery: Vec<f64> = run
        .results
        .column("storage Battery 2: p_kw")
        .unwrap()
        .iter()
        .map(|v| v.unwrap())
        .collect();
    assert!((battery[0] + 40.0 / 600.0 * 10.0).abs() < 1e-9);
    assert!(battery[1].abs() < 1e-9);

    // snapshots are independent copies
    let first = run.snapshots[0].assets().next().unwrap().result.unwrap();
    let last = run.snapshots[3].assets().next().unwrap().result.unwrap();
    assert_eq!(first, Kilowatts(1.0));
    assert_eq!(last, Kilowatts(4.0));

    let summary: EnergySummary = run.summary();
    assert!(summary.cable_losses_kwh > 0.0);
    assert_eq!(summary.converter_losses_kwh, 0.0);
    assert!(summary.consumed_kwh >= 66.0);
    assert!(summary.efficiency_percent > 95.0 && summary.efficiency_percent < 100.0);
}

#[test]
fn steady_state_runs_assets_at_nominal() {
    let mut network = feeder();
    let orch = PowerFlowOrchestrator::new(&network, Arc::new(NewtonDcEmulation::default())).unwrap();
    let mut diag = Diagnostics::new();
    let run = TimeSeriesSimulator::new(&orch, Horizon::steady_state())
        .run(&mut network, &mut diag)
        .unwrap();

    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results.column("load desk: p_kw").unwrap()[0], Some(4.0));
    assert_eq!(diag.issues_by_category(diagnostics::categories::PROFILE).count(), 0);
}

#[test]
fn generated_pv_profile_feeds_the_run_and_exports() {
    let mut network = feeder();
    let mut pv = Asset::new(
        AssetId::new(2),
        "roof",
        BusId::new(2),
        AssetKind::Generator,
        Kilowatts(3.0),
    );
    pv.daily_base = Some(Arc::from(SUNNY.to_vec()));
    network.add_asset(pv);

    let horizon = Horizon {
        step_minutes: 60,
        days: 1,
    };
    let mut diag = Diagnostics::new();
    let generated = ProfileGenerator::new(horizon, Some(11))
        .assign(&mut network, &mut diag)
        .unwrap();
    assert_eq!(generated, 1);

    let orch = PowerFlowOrchestrator::new(&network, Arc::new(NewtonDcEmulation::default())).unwrap();
    let run = TimeSeriesSimulator::new(&orch, horizon)
        .run(&mut network, &mut diag)
        .unwrap();
    let roof = run.results.column("sgen roof: p_kw").unwrap();
    assert_eq!(roof.len(), 24);
    assert!(roof.iter().all(|v| (0.0..=3.0).contains(&v.unwrap())));

    let dir = tempdir().unwrap();
    let path = dir.path().join("results.csv");
    run.results.write(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 25);
    assert!(text.lines().next().unwrap().contains("sgen roof: p_kw"));
}

#[test]
fn battery_discharges_down_to_lower_bound_then_holds() {
    let mut network = feeder();
    let battery = network.asset_mut(AssetId::new(1)).unwrap();
    battery.nominal_power = Kilowatts(-1.0);
    battery.power = Kilowatts(-1.0);
    battery.storage = Some(StorageState {
        soc_percent: 40.0,
        energy_capacity_kwh: 10.0,
    });

    let orch = PowerFlowOrchestrator::new(&network, Arc::new(NewtonDcEmulation::default())).unwrap();
    let horizon = Horizon {
        step_minutes: 60,
        days: 1,
    };
    let run = TimeSeriesSimulator::new(&orch, horizon)
        .run(&mut network, &mut Diagnostics::new())
        .unwrap();

    let soc = run.results.column("storage Battery 2: SOC").unwrap();
    let power = run.results.column("storage Battery 2: p_kw").unwrap();
    assert_eq!(soc.len(), 24);

    // 1 kW out of 10 kWh takes 10 % per hour: 30, 20, 10, then nothing left to give
    for (step, expected) in [30.0, 20.0, 10.0].into_iter().enumerate() {
        assert!((soc[step].unwrap() - expected).abs() < 1e-9, "step {step}: {soc:?}");
        assert!((power[step].unwrap() + 1.0).abs() < 1e-9, "step {step}: {power:?}");
    }
    for step in 3..24 {
        assert!((soc[step].unwrap() - 10.0).abs() < 1e-9, "step {step}: {soc:?}");
        assert!(power[step].unwrap().abs() < 1e-9, "step {step}: {power:?}");
    }
    let last = network.assets().find(|a| a.id == AssetId::new(1)).unwrap();
    assert!((last.storage.unwrap().soc_percent - 10.0).abs() < 1e-9);
}
