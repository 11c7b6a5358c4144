//! Integration tests for the `evtrip` binary.
//!
//! A small charge network is written with the library and the CLI is run
//! against it with `assert_cmd`.

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;
use tempfile::TempDir;

use evtrip_lib::{great_circle_km, ChargeNetwork, Leg, NetworkMeta, Station};

fn stations_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures/stations_sample.csv")
}

/// Temporary directory holding a saved charge network.
struct TestEnv {
    _temp_dir: TempDir,
    network_path: PathBuf,
}

impl TestEnv {
    /// Three stations on the equator about 556 km apart plus an isolated one.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let network_path = temp_dir.path().join("charge_network.evcn");

        let stations = vec![
            Station::at(1, 0.0, 0.0).with_name("Alpha"),
            Station::at(2, 0.0, 5.0).with_name("Bravo"),
            Station::at(3, 0.0, 10.0).with_name("Charlie"),
            Station::at(4, 10.0, 0.0).with_name("Isolated"),
        ];
        let leg = |a: &Station, b: &Station| {
            let d = great_circle_km(a, b);
            Leg::new(a.id, b.id, d, d * 36.0)
        };
        let legs = vec![
            leg(&stations[0], &stations[1]),
            leg(&stations[1], &stations[2]),
        ];
        let meta = NetworkMeta {
            max_range_km: 700.0,
            min_fast_chargers: 4,
            cluster_diameter_km: 60.0,
            built_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        ChargeNetwork::new(meta, stations, legs)
            .expect("fixture network is valid")
            .save(&network_path)
            .expect("save fixture network");

        Self {
            _temp_dir: temp_dir,
            network_path,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("evtrip");
        cmd.env("RUST_LOG", "error")
            .arg("--network")
            .arg(&self.network_path);
        cmd
    }
}

fn long_range(cmd: &mut Command) -> &mut Command {
    cmd.args([
        "--range",
        "680",
        "--min-soc",
        "0.15",
        "--max-soc",
        "1.0",
        "--start-soc",
        "1.0",
    ])
}

#[test]
fn route_by_name_prints_trip_summary() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["route", "--from", "Alpha", "--to", "Charlie"]);
    long_range(&mut cmd);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Trip: Alpha -> Charlie"))
        .stdout(predicate::str::contains("algorithm: a-star"))
        .stdout(predicate::str::contains("1,111.9 kms"))
        .stdout(predicate::str::contains("arriving with 15.0%"));
}

#[test]
fn dijkstra_algorithm_is_supported() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["route", "--from", "1", "--to", "3"]);
    cmd.args(["--algorithm", "dijkstra"]);
    long_range(&mut cmd);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("algorithm: dijkstra"));
}

#[test]
fn json_route_reports_status() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["--format", "json", "route"]);
    cmd.args(["--from", "Alpha", "--to", "Charlie"]);
    long_range(&mut cmd);

    let output = cmd.assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(value["status"], "ok");
    let legs = value["summary"]["legs_summary"].as_array().unwrap();
    assert_eq!(legs.len(), 2);
    let request = &value["summary"]["request"];
    assert_eq!(request["start"], 1);
    assert_eq!(request["end"], 3);
    assert_eq!(request["full_range_km"], 680.0);
}

#[test]
fn short_range_is_rejected_with_reason() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args([
        "--format",
        "json",
        "route",
        "--from",
        "Alpha",
        "--to",
        "Charlie",
        "--range",
        "500",
        "--min-soc",
        "0.15",
        "--max-soc",
        "1.0",
    ]);

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("\"reason\": \"leg_exceeds_range\""));
}

#[test]
fn short_range_text_error_suggests_next_steps() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["route", "--from", "Alpha", "--to", "Charlie"]);
    cmd.args(["--range", "500"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Try a larger --range"));
}

#[test]
fn isolated_station_has_no_route() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["route", "--from", "Alpha", "--to", "Isolated"]);
    long_range(&mut cmd);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No route found between stations 1 and 4."));
}

#[test]
fn unknown_station_error_is_friendly() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["route", "--from", "Alpha", "--to", "Charlei"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unknown station 'Charlei'"))
        .stderr(predicate::str::contains("Did you mean 'Charlie'?"));
}

#[test]
fn json_unknown_station_reports_invalid_input() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["--format", "json", "route"]);
    cmd.args(["--from", "Alpha", "--to", "Charlei"]);

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"error\""))
        .stdout(predicate::str::contains("\"reason\": \"invalid_input\""));
}

#[test]
fn inspect_summarises_the_network() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.arg("inspect");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("stations: 4"))
        .stdout(predicate::str::contains("legs: 2"))
        .stdout(predicate::str::contains("isolated stations: 1"));
}

#[test]
fn inspect_station_lists_its_legs() {
    let env = TestEnv::new();
    let mut cmd = env.cmd();
    cmd.args(["--format", "json", "inspect", "--station", "Bravo"]);

    let output = cmd.assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(value["station"]["id"], 2);
    assert_eq!(value["station"]["phone"], "not available");
    assert_eq!(value["neighbours"].as_array().unwrap().len(), 2);
}

#[test]
fn missing_network_points_to_build_command() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let mut cmd = cargo_bin_cmd!("evtrip");
    cmd.env("RUST_LOG", "error")
        .arg("--network")
        .arg(temp_dir.path().join("absent.evcn"))
        .args(["route", "--from", "1", "--to", "2"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("evtrip build-network"));
}

#[test]
fn build_requires_a_directions_key() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let network_path = temp_dir.path().join("charge_network.evcn");
    let mut cmd = cargo_bin_cmd!("evtrip");
    cmd.env("RUST_LOG", "error")
        .env_remove("EVTRIP_DIRECTIONS_API_KEY")
        .arg("--network")
        .arg(&network_path)
        .arg("build-network")
        .arg("--stations")
        .arg(stations_fixture());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("EVTRIP_DIRECTIONS_API_KEY"));
    assert!(!network_path.exists());
}
