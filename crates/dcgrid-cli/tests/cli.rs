use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const NETWORK: &str = r#"{
  "nodes": [
    { "id": 0, "nominal_voltage_v": 400, "component": "ac_grid" },
    { "id": 1, "nominal_voltage_v": 400, "component": "none" },
    { "id": 2, "nominal_voltage_v": 48, "component": "dc_load", "max_power_kw": 2.0 }
  ],
  "lines": [
    { "from": 0, "to": 1, "length_m": 25 }
  ],
  "converters": [
    { "name": "PDU 1", "kind": "PDU DC/DC", "from": 1, "to": 2, "voltage_from_v": 400, "voltage_to_v": 48 }
  ]
}"#;

const USE_CASE: &str = r#"
project:
  name: bench
  ecosystem: CurrentOS
scenarios:
  storage: {}
  cables_and_converters: {}
  ac_dc: {}
simulation:
  step_minutes: 60
  days: 1
  seed: 3
"#;

const CABLES: &str = "\
materiaux,isolation,section,Coef,Const_r,Tcond,Const_isol
Cu,PVC,1.5,0.0121,0.00393,70,11
Cu,PVC,4,0.0046,0.00393,70,11
Cu,PVC,10,0.0018,0.00393,70,11
Cu,PVC,25,0.00072,0.00393,70,11
Al,PVC,25,0.0012,0.00403,70,11
";

const CONVERTERS: &str = r#"[
  { "ecosystem": "CurrentOS", "kind": "PDU DC/DC", "voltage_v1": 400, "voltage_v2": 48,
    "nominal_power": 5, "efficiency_percent": [[10, 92], [100, 96]], "standby_loss_w": 5 },
  { "ecosystem": "CurrentOS", "kind": "PDU DC/DC", "voltage_v1": 400, "voltage_v2": 48,
    "nominal_power": 20, "efficiency_percent": [[10, 93], [100, 97]], "standby_loss_w": 15 }
]"#;

/// Project files in a temporary directory
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        for (name, text) in [
            ("network.json", NETWORK),
            ("use_case.yaml", USE_CASE),
            ("cables.csv", CABLES),
            ("converters.json", CONVERTERS),
        ] {
            fs::write(dir.path().join(name), text).unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::cargo_bin("dcgrid").unwrap();
        cmd.arg("--log-level").arg("warn").arg(subcommand);
        cmd.arg(self.path("network.json"))
            .arg("--use-case")
            .arg(self.path("use_case.yaml"))
            .arg("--cables")
            .arg(self.path("cables.csv"))
            .arg("--converters")
            .arg(self.path("converters.json"));
        cmd
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn dcgrid_pf_writes_results() {
    let fixture = Fixture::new();
    let out = fixture.path("pf/results.json");
    fixture
        .command("pf")
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Load flow converged"));

    let results = read_json(&out);
    assert_eq!(results["buses"].as_array().unwrap().len(), 3);
    assert_eq!(results["converters"][0]["name"], "PDU 1");
    // load plus converter and cable losses
    let supply = results["grid_supply_kw"].as_f64().unwrap();
    assert!(supply > 2.0 && supply < 2.5, "{supply}");
}

#[test]
fn dcgrid_size_writes_report() {
    let fixture = Fixture::new();
    let out = fixture.path("report.json");
    fixture
        .command("size")
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Sized 1 line(s), 1 converter(s)"));

    let report = read_json(&out);
    assert_eq!(report["project"], "bench");
    let line = &report["lines"][0];
    assert!(line["cable_rank"].as_u64().unwrap() < 3);
    assert_eq!(report["converters"][0]["nominal_kw"].as_f64(), Some(5.0));
    assert_eq!(report["checks"].as_array().unwrap().len(), 2);
}

#[test]
fn dcgrid_ts_exports_table_and_summary() {
    let fixture = Fixture::new();
    let out = fixture.path("ts/results.csv");
    let summary = fixture.path("ts/summary.json");
    fixture
        .command("ts")
        .arg("-o")
        .arg(&out)
        .arg("--summary")
        .arg(&summary)
        .assert()
        .success()
        .stdout(predicate::str::contains("Simulated 24 step(s)"));

    let table = fs::read_to_string(&out).unwrap();
    assert_eq!(table.lines().count(), 25);
    assert!(table.lines().next().unwrap().contains("PDU 1: loading"));
    let summary = read_json(&summary);
    assert!(summary["consumed_kwh"].as_f64().unwrap() > 47.0);
    assert!(summary["converter_losses_kwh"].as_f64().unwrap() > 0.0);
}

#[test]
fn dcgrid_topology_lists_the_hierarchy() {
    let fixture = Fixture::new();
    fixture
        .command("topology")
        .assert()
        .success()
        .stdout(predicate::str::contains("Root subnetwork"))
        .stdout(predicate::str::contains("PDU 1"));

    fixture
        .command("topology")
        .args(["--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph dc_network"));
}

#[test]
fn dcgrid_rejects_a_broken_engine_config() {
    let fixture = Fixture::new();
    let config = fixture.path("engine.toml");
    fs::write(&config, "[solver]\nbackend = \"lapack\"\n").unwrap();
    Command::cargo_bin("dcgrid")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("topology")
        .arg(fixture.path("network.json"))
        .arg("--use-case")
        .arg(fixture.path("use_case.yaml"))
        .arg("--cables")
        .arg(fixture.path("cables.csv"))
        .arg("--converters")
        .arg(fixture.path("converters.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("engine config"));
}
