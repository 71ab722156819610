//! End-to-end smoke tests: build a driver from a real profile, run it for a
//! handful of wall-clock milliseconds against the mock connection pool, and
//! check that every output artifact (timeline CSV, aggregate JSONL) exists
//! and is non-empty.

use qpsim_driver::cli::RunArgs;
use qpsim_driver::SimulationDriver;
use std::path::PathBuf;

fn minimal_profile(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("profile.yaml");
    std::fs::write(
        &path,
        r#"
name: smoke-test
mode: simulation
pattern:
  type: hourly
  baseline: 50
  hourly: {}
  min: 0.1
  max: 10.0
workload:
  read: 80
  write: 20
connection:
  min: 2
  max: 10
  scale_with_load: true
events:
  - name: always-on-spike
    cron: "* * * * *"
    duration: 1h
    multiplier_override: 2.0
    priority: 10
    enabled: true
"#,
    )
    .unwrap();
    path
}

fn base_args(output_dir: PathBuf, profile: PathBuf) -> RunArgs {
    RunArgs {
        profile,
        duration: "1500ms".to_string(),
        time_scale: 4,
        start_time: None,
        workers: Some(2),
        seed: 1,
        output_dir,
        timeline_output: PathBuf::from("timeline.csv"),
        max_storage: 10 * 1024 * 1024,
        raw_retention: "1h".to_string(),
        aggregate_interval: "1s".to_string(),
        write_raw: true,
        log_format: qpsim_driver::LogFormat::Text,
    }
}

#[tokio::test]
async fn runs_end_to_end_and_produces_output_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let profile = minimal_profile(dir.path());
    let args = base_args(dir.path().to_path_buf(), profile);

    let driver = SimulationDriver::build(&args).expect("driver builds from a valid profile");
    driver.run().await.expect("simulation runs to completion");

    let timeline_path = dir.path().join("timeline.csv");
    assert!(timeline_path.exists(), "timeline CSV should have been created");
    let timeline_contents = std::fs::read_to_string(&timeline_path).unwrap();
    assert!(timeline_contents.lines().count() >= 1, "timeline should at least contain a header");

    let has_aggregate_file = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("aggregate_"));
    assert!(has_aggregate_file, "at least one aggregate JSONL file should have been written");
}

#[tokio::test]
async fn rejects_profile_with_bad_workload_mix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(
        &path,
        r#"
name: bad
mode: simulation
pattern:
  type: hourly
  baseline: 10
  hourly: {}
  min: 0.1
  max: 10.0
workload:
  read: 50
  write: 60
connection:
  min: 1
  max: 5
  scale_with_load: false
events: []
"#,
    )
    .unwrap();
    let args = base_args(dir.path().to_path_buf(), path);
    assert!(SimulationDriver::build(&args).is_err());
}
