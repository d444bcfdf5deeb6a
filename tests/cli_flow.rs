//! End-to-end CLI flows against a throwaway database.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("oee.db")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("oee-tracker").unwrap();
        cmd.current_dir(self.dir.path())
            .env_remove("OEE_TRACKER_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.db());
        cmd
    }

    /// Run with `--json` and return the parsed stdout.
    fn json(&self, args: &[&str]) -> serde_json::Value {
        let out = self.cmd().arg("--json").args(args).assert().success();
        serde_json::from_slice(&out.get_output().stdout).unwrap()
    }

    fn id(&self, args: &[&str]) -> String {
        self.json(args)["id"].as_i64().unwrap().to_string()
    }
}

fn sample_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("sample").join("data")
}

#[test]
fn test_reference_run_through_cli() {
    let ws = Workspace::new();
    let machine = ws.id(&["machine", "create", "Mill", "60", "--location", "Bay 1"]);
    let shift = ws.id(&["shift", "create", "Day"]);
    let operator = ws.id(&["operator", "create", "Avery"]);
    ws.cmd()
        .args(["reason", "create", "JAM", "Material jam"])
        .assert()
        .success();

    let run = ws.id(&[
        "run",
        "create",
        machine.as_str(),
        shift.as_str(),
        operator.as_str(),
        "2024-01-15 08:00:00",
        "2024-01-15 16:00:00",
    ]);
    ws.cmd()
        .args(["run", "start", run.as_str(), "--at", "2024-01-15 08:00:00"])
        .assert()
        .success();
    ws.cmd()
        .args([
            "downtime",
            "create",
            run.as_str(),
            "JAM",
            "--start",
            "2024-01-15 10:00:00",
            "--end",
            "2024-01-15 10:30:00",
        ])
        .assert()
        .success();
    ws.cmd()
        .args(["run", "stop", run.as_str(), "100", "10", "--at", "2024-01-15 16:00:00"])
        .assert()
        .success();

    ws.cmd()
        .args(["report", "oee", run.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Availability: 93.8%"))
        .stdout(predicate::str::contains("Quality:      90.9%"))
        .stdout(predicate::str::contains("OEE:          20.8%"));

    let result = ws.json(&["report", "oee", run.as_str()]);
    let oee = result["oee"].as_f64().unwrap();
    assert!((oee - 0.208_333).abs() < 1e-5);

    ws.cmd()
        .args(["report", "downtime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("JAM"))
        .stdout(predicate::str::contains("30.0 min"));
}

#[test]
fn test_overlapping_downtime_rejected() {
    let ws = Workspace::new();
    let machine = ws.id(&["machine", "create", "Mill", "60"]);
    let shift = ws.id(&["shift", "create", "Day"]);
    let operator = ws.id(&["operator", "create", "Avery"]);
    ws.cmd().args(["reason", "create", "JAM", "Jam"]).assert().success();
    let run = ws.id(&[
        "run",
        "create",
        machine.as_str(),
        shift.as_str(),
        operator.as_str(),
        "2024-01-15 08:00:00",
        "2024-01-15 16:00:00",
    ]);

    let log = |start: &str, end: &str| {
        ws.cmd()
            .args(["downtime", "create", run.as_str(), "JAM", "--start", start, "--end", end])
            .assert()
    };
    log("2024-01-15 10:00:00", "2024-01-15 11:00:00").success();
    log("2024-01-15 10:30:00", "2024-01-15 10:45:00")
        .failure()
        .stderr(predicate::str::contains("overlaps"));
    log("2024-01-15 11:00:00", "2024-01-15 11:15:00").success();
}

#[test]
fn test_sample_data_reports() {
    let ws = Workspace::new();
    let dir = sample_dir();
    ws.cmd()
        .args(["load-sample", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 4 machines, 3 shifts"));

    ws.cmd()
        .args(["report", "machines"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CNC Mill 1"))
        .stdout(predicate::str::contains("Stamping Press"));

    let shifts = ws.json(&["report", "shifts"]);
    let shifts = shifts.as_array().unwrap();
    assert_eq!(shifts.len(), 3);
    let oee: Vec<f64> = shifts.iter().map(|s| s["avg_oee"].as_f64().unwrap()).collect();
    assert!(oee.windows(2).all(|w| w[0] >= w[1]));

    let top = ws.json(&["report", "downtime", "--limit", "2"]);
    assert_eq!(top.as_array().unwrap().len(), 2);

    let machine = ws.json(&["report", "machine", "1", "--start", "2024-01-16", "--end", "2024-01-18"]);
    assert!(machine["runs_included"].as_u64().unwrap() >= 1);
    assert_eq!(machine["name"], "CNC Mill 1");

    // Run 42 is scheduled but never started.
    ws.cmd()
        .args(["report", "oee", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no data available"));

    ws.cmd()
        .args(["report", "machine", "1", "--start", "2030-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no data available"))
        .stderr(predicate::str::contains("0 candidate runs"));

    // Loading twice must not duplicate anything.
    ws.cmd().args(["load-sample", "--dir"]).arg(&dir).assert().failure();
    let machines = ws.json(&["machine", "list"]);
    assert_eq!(machines.as_array().unwrap().len(), 4);
}

#[test]
fn test_not_found_exits_non_zero() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["machine", "get", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("machine 99 not found"));
    ws.cmd()
        .args(["run", "stop", "5", "1", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_stop_pending_run_is_rejected() {
    let ws = Workspace::new();
    let machine = ws.id(&["machine", "create", "Mill", "60"]);
    let shift = ws.id(&["shift", "create", "Day"]);
    let operator = ws.id(&["operator", "create", "Avery"]);
    let run = ws.id(&[
        "run",
        "create",
        machine.as_str(),
        shift.as_str(),
        operator.as_str(),
        "2024-01-15 08:00:00",
        "2024-01-15 16:00:00",
    ]);
    ws.cmd()
        .args(["run", "stop", run.as_str(), "10", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pending"));
}

#[test]
fn test_config_file_sets_database() {
    let ws = Workspace::new();
    let db = ws.dir.path().join("from-config.db");
    let config = ws.dir.path().join("oee-tracker.toml");
    std::fs::write(
        &config,
        format!("[database]\npath = {:?}\n", db.display().to_string()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("oee-tracker").unwrap();
    cmd.current_dir(ws.dir.path())
        .env_remove("OEE_TRACKER_CONFIG")
        .env_remove("OEE_TRACKER_DB")
        .args(["shift", "create", "Day"])
        .assert()
        .success();
    assert!(db.exists());
}

#[test]
fn test_pending_only_machine_reports_candidate_count() {
    let ws = Workspace::new();
    let machine = ws.id(&["machine", "create", "Mill", "60"]);
    let shift = ws.id(&["shift", "create", "Day"]);
    let operator = ws.id(&["operator", "create", "Avery"]);
    ws.id(&[
        "run",
        "create",
        machine.as_str(),
        shift.as_str(),
        operator.as_str(),
        "2024-01-15 08:00:00",
        "2024-01-15 16:00:00",
    ]);

    ws.cmd()
        .args(["report", "machine", machine.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no data available"))
        .stderr(predicate::str::contains("Mill: 1 candidate runs, none scored"));
}

#[test]
fn test_zero_downtime_limit_in_config_is_rejected() {
    let ws = Workspace::new();
    let config = ws.dir.path().join("limits.toml");
    std::fs::write(&config, "[report]\ndowntime_limit = 0\n").unwrap();

    ws.cmd()
        .arg("--config")
        .arg(&config)
        .args(["report", "downtime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}
