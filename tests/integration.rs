use std::fs;
use std::process::Command;

use serde_json::Value;

fn netlayout() -> Command {
    Command::new(env!("CARGO_BIN_EXE_netlayout"))
}

#[test]
fn stabilizes_fixture_graph() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("positions.json");

    let status = netlayout()
        .args([
            "stabilize",
            "--input",
            "tests/fixtures/small.json",
            "--output",
            output.to_str().unwrap(),
            "--iterations",
            "500",
        ])
        .status()
        .expect("Failed to execute netlayout");

    assert!(status.success(), "netlayout exited with error");
    assert!(output.exists(), "positions file was not written");

    let report: Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("Failed to read output"))
            .expect("Output is not JSON");

    assert!(report["iterations"].as_u64().unwrap() <= 500);
    assert!(report["converged"].is_boolean());

    let positions = report["positions"].as_object().unwrap();
    let ids: Vec<&str> = positions.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["alpha", "beta", "delta", "gamma", "ghost", "hub"]);
    for (id, point) in positions {
        assert!(point["x"].as_f64().unwrap().is_finite(), "{id} x");
        assert!(point["y"].as_f64().unwrap().is_finite(), "{id} y");
    }
    // delta is fixed on x
    assert_eq!(positions["delta"]["x"].as_f64(), Some(250.0));
}

#[test]
fn applies_options_file_and_solver_override() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("positions.yaml");

    let status = netlayout()
        .args([
            "stabilize",
            "-i",
            "tests/fixtures/small.json",
            "-o",
            output.to_str().unwrap(),
            "-c",
            "tests/fixtures/options.yaml",
            "-s",
            "force-atlas2-based",
        ])
        .status()
        .expect("Failed to execute netlayout");

    assert!(status.success(), "netlayout exited with error");

    let text = fs::read_to_string(&output).expect("Failed to read output");
    let report: serde_yaml::Value = serde_yaml::from_str(&text).expect("Output is not YAML");
    assert!(report["iterations"].as_u64().unwrap() <= 400);
    assert_eq!(
        report["positions"].as_mapping().map(|positions| positions.len()),
        Some(6)
    );
}

#[test]
fn live_frames_after_budget() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("positions.json");

    let status = netlayout()
        .args([
            "stabilize",
            "--input",
            "tests/fixtures/small.json",
            "--output",
            output.to_str().unwrap(),
            "--config",
            "tests/fixtures/restless.yaml",
            "--iterations",
            "5",
            "--frames",
            "20",
        ])
        .status()
        .expect("Failed to execute netlayout");

    assert!(status.success());
    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["iterations"].as_u64(), Some(5));
    assert_eq!(report["converged"].as_bool(), Some(false));
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = dir.path().join("positions.json");

    let result = netlayout()
        .args([
            "stabilize",
            "--input",
            "tests/fixtures/does-not-exist.json",
            "--output",
            output.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute netlayout");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("failed to load graph"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn prints_default_options() {
    let result = netlayout()
        .args(["options", "--format", "json"])
        .output()
        .expect("Failed to execute netlayout");

    assert!(result.status.success());
    let options: Value = serde_json::from_slice(&result.stdout).expect("Options are not JSON");
    assert_eq!(options["solver"], "barnesHut");
    assert_eq!(options["timestep"], 0.5);
    assert_eq!(options["stabilization"]["iterations"], 1000);
    assert_eq!(options["barnesHut"]["gravitationalConstant"], -2000.0);
}
