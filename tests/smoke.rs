//! Smoke tests -- verify the binary runs and the subcommands are wired up.

use assert_cmd::Command;

fn cli() -> Command {
    Command::cargo_bin("oee-tracker").unwrap()
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("OEE reporting"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("oee-tracker"));
}

#[test]
fn test_entity_subcommands_exist() {
    for group in ["machine", "shift", "operator", "reason", "run", "downtime"] {
        cli().args([group, "list", "--help"]).assert().success();
    }
}

#[test]
fn test_report_subcommands_exist() {
    for report in ["oee", "machine", "shift", "downtime", "machines", "shifts"] {
        cli().args(["report", report, "--help"]).assert().success();
    }
}

#[test]
fn test_load_sample_subcommand_exists() {
    cli()
        .args(["load-sample", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--dir"));
}

#[test]
fn test_bad_timestamp_rejected_by_parser() {
    cli()
        .args(["run", "create", "1", "1", "1", "tomorrow", "2024-01-15 16:00:00"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid timestamp"));
}
