//! Integration tests for the plasma-rnn CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `content` as `config.yaml` under `dir`.
fn create_test_config(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("config.yaml");
    fs::write(&config_path, content).expect("Failed to write test config");
    config_path
}

fn run_cli(args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("plasma-rnn").expect("Failed to find plasma-rnn binary");
    cmd.env("PLASMA_FORCE_CPU", "1");
    cmd.args(args);
    cmd
}

/// One shot per line for every shot number in `100..130`, one profile on a
/// two-point grid, one parameter and one actuator.
fn write_dataset(path: &Path) {
    let mut out = String::new();
    for shot in 100u64..130 {
        let len = 2 + (shot as usize % 3);
        let input: Vec<Vec<f32>> = (0..len)
            .map(|t| (0..5).map(|f| ((t * 5 + f) as f32 * 0.07).cos()).collect())
            .collect();
        let output: Vec<Vec<f32>> = (0..len)
            .map(|t| (0..3).map(|f| ((t * 3 + f + 1) as f32 * 0.07).cos()).collect())
            .collect();
        let record = serde_json::json!({ "shot": shot, "input": input, "output": output });
        writeln!(out, "{record}").unwrap();
    }
    fs::write(path, out).expect("Failed to write dataset");
}

fn tiny_config_yaml(data: &Path, output_dir: &Path) -> String {
    format!(
        r#"
data:
  path: "{}"
signals:
  profiles: [te]
  actuators: [pinj]
  parameters: [li]
  profile_grid_points: 2
partition:
  min_shot: 100
  max_shot: 200
model:
  model_type: rnn
  rnn_type: lstm
  encoder_dim: 4
  encoder_extra_layers: 0
  rnn_dim: 4
  decoder_dim: 4
  decoder_extra_layers: 0
optimization:
  n_epochs: 2
  bucket_size: 8
  lr: 0.01
  autoregression_num_steps: 2
output_dir: "{}"
output_filename_base: tiny
"#,
        data.display(),
        output_dir.display()
    )
}

#[test]
fn test_validate_command_valid_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = create_test_config(
        temp_dir.path(),
        &tiny_config_yaml(&temp_dir.path().join("data.jsonl"), temp_dir.path()),
    );

    run_cli(&["validate", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Model: rnn"))
        .stdout(predicate::str::contains("State: 3"));
}

#[test]
fn test_validate_command_rejects_zero_epochs() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let yaml = tiny_config_yaml(Path::new("data.jsonl"), temp_dir.path())
        .replace("n_epochs: 2", "n_epochs: 0");
    let config_path = create_test_config(temp_dir.path(), &yaml);

    run_cli(&["validate", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("n_epochs"));
}

#[test]
fn test_validate_command_rejects_unknown_model_type() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let yaml = tiny_config_yaml(Path::new("data.jsonl"), temp_dir.path())
        .replace("model_type: rnn", "model_type: transformer");
    let config_path = create_test_config(temp_dir.path(), &yaml);

    run_cli(&["validate", config_path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_validate_command_missing_file() {
    run_cli(&["validate", "/nonexistent/path/config.yaml"])
        .assert()
        .failure();
}

#[test]
fn test_init_command_presets() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    for (preset, tag) in [
        ("rnn-lstm", "model_type: rnn"),
        ("rnn-linear", "rnn_type: linear"),
        ("linear-dynamics", "model_type: linear_dynamics"),
    ] {
        let output = temp_dir.path().join(format!("{preset}.yaml"));
        run_cli(&["init", output.to_str().unwrap(), "--preset", preset])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration written to"));

        let written = fs::read_to_string(&output).expect("Failed to read generated config");
        assert!(written.contains(tag), "{preset}: {written}");

        run_cli(&["validate", output.to_str().unwrap()])
            .assert()
            .success();
    }
}

#[test]
fn test_init_command_unknown_preset() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = temp_dir.path().join("config.yaml");

    run_cli(&["init", output.to_str().unwrap(), "--preset", "gpt-9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown preset"));
    assert!(!output.exists());
}

#[test]
fn test_train_then_inspect() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let data = temp_dir.path().join("data.jsonl");
    write_dataset(&data);
    let outputs = temp_dir.path().join("outputs");
    let config_path = create_test_config(temp_dir.path(), &tiny_config_yaml(&data, &outputs));

    run_cli(&["train", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trained 2 epochs"));

    let checkpoint = outputs.join("tiny");
    assert!(checkpoint.join("checkpoint.json").exists());
    assert!(checkpoint.join("model.safetensors").exists());

    run_cli(&["inspect", checkpoint.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model: rnn"))
        .stdout(predicate::str::contains("State dim: 3"))
        .stdout(predicate::str::contains("Best epoch"));
}

#[test]
fn test_train_missing_dataset() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = create_test_config(
        temp_dir.path(),
        &tiny_config_yaml(&temp_dir.path().join("absent.jsonl"), temp_dir.path()),
    );

    run_cli(&["train", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dataset not found"));
}

#[test]
fn test_inspect_missing_checkpoint() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    run_cli(&["inspect", temp_dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint.json"));
}

#[test]
fn test_help_lists_commands() {
    run_cli(&["--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("inspect"));
}
