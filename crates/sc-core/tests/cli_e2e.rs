//! CLI end-to-end tests.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sc_core() -> Command {
    let mut cmd = Command::cargo_bin("sc-core").unwrap();
    cmd.env_remove("SENSOR_CLEAN_CONFIG")
        .env_remove("SENSOR_CLEAN_DATA")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", "/nonexistent-sc-core-config");
    cmd
}

/// Temp workspace with a config file and one source batch.
struct Workspace {
    _tmp: TempDir,
    root: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let config = root.join("sensor_clean.toml");
        fs::write(
            &config,
            format!(
                "data_dir = '{}'\nsource_dir = '{}'\narchive_dir = '{}'\n\n\
                 [logging]\nlevel = \"warn\"\n",
                root.join("store").display(),
                root.join("raw_data").display(),
                root.join("archive").display(),
            ),
        )
        .unwrap();
        Self {
            _tmp: tmp,
            root,
            config,
        }
    }

    fn add_source(&self, name: &str) {
        let dir = self.root.join("raw_data");
        fs::create_dir_all(&dir).unwrap();
        let mut content =
            String::from("timestamp,turbine_id,wind_speed,wind_direction,power_output\n");
        for h in 0..12 {
            content.push_str(&format!("2022-03-01 {h:02}:00:00,1,10.0,180.0,{}\n", 1000 + h));
        }
        content.push_str("2022-03-01 13:00:00,2,10.0,180.0,50000\n");
        fs::write(dir.join(name), content).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = sc_core();
        cmd.arg("--config").arg(&self.config);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .args(args)
            .args(["--format", "json"])
            .output()
            .unwrap();
        serde_json::from_slice(&out.stdout).unwrap()
    }
}

fn archive_len(root: &Path) -> usize {
    fs::read_dir(root.join("archive")).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn run_processes_sources_end_to_end() {
    let ws = Workspace::new();
    ws.add_source("data_group_1.csv");

    ws.cmd()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("outlier_pivot"))
        .stdout(predicate::str::contains("FAILED").not());
    assert_eq!(archive_len(&ws.root), 1);

    let status = ws.json(&["status"]);
    assert_eq!(status["command"], "status");
    assert_eq!(status["result"]["tables"]["raw"], 13);
    assert_eq!(status["result"]["tables"]["outliers"], 1);
    assert_eq!(status["result"]["tables"]["clean"], 12);
    assert_eq!(status["result"]["sources"][0]["last_offset"], 13);

    let pivot = ws.json(&["pivot"]);
    assert_eq!(pivot["result"]["columns"][0], "device_2");
}

#[test]
fn summarize_without_outliers_exits_with_prerequisite_code() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("summarize")
        .assert()
        .code(13)
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn json_report_lists_stages_in_order() {
    let ws = Workspace::new();
    ws.add_source("data_group_1.csv");
    let out = ws.json(&["ingest"]);
    assert_eq!(out["schema_version"], "1.0.0");
    assert_eq!(out["result"]["success"], true);
    assert_eq!(out["result"]["stages"][0]["stage"], "ingest");

    let clean = ws.json(&["clean"]);
    let stages: Vec<&str> = clean["result"]["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages, ["detect_outliers", "reference_statistics", "build_clean"]);
}

#[test]
fn explicit_files_are_not_archived() {
    let ws = Workspace::new();
    ws.add_source("data_group_1.csv");
    let path = ws.root.join("raw_data").join("data_group_1.csv");
    ws.cmd().arg("ingest").arg(&path).assert().success();
    assert!(path.exists());
    assert_eq!(archive_len(&ws.root), 0);
}

#[test]
fn missing_config_file_is_a_config_error() {
    sc_core()
        .args(["--config", "/definitely/not/here.toml", "status"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn config_show_reports_source() {
    let ws = Workspace::new();
    let out = ws.json(&["config", "show"]);
    assert_eq!(out["result"]["source"]["kind"], "explicit");
    assert_eq!(out["result"]["config"]["source_prefix"], "data_group_");
}

#[test]
fn stats_rejects_unknown_window() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["stats", "--window", "fortnight"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown window"));
}
