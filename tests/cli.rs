use std::fs;
use std::process::{Command, Output};

fn spsa_tune(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spsa-tune"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to start binary")
}

#[test]
fn test_unknown_parameter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_str().unwrap();

    let output = spsa_tune(&["Futility_Margin", "Not_A_Param", "--state-dir", state_dir]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown parameter 'Not_A_Param'"));
    assert!(stderr.contains("Available parameters: LMR_FullDepthMoves"));
    assert!(stderr.contains("Razor_Margin"));
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn test_missing_engine_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_str().unwrap();

    let output = spsa_tune(&["--engine", "/definitely/not/an/engine", "--state-dir", state_dir]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Engine not found at /definitely/not/an/engine"));
    assert!(!dir.path().join("spsa_state.json").exists());
}

#[test]
fn test_invalid_parameter_table_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("params.toml");
    fs::write(
        &table,
        "[[parameter]]\nname = \"A\"\ndefault = 50\nmin = 0\nmax = 10\nc = 1\nr = 0.5\n",
    )
    .unwrap();

    let output = spsa_tune(&["--params", table.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load"));
}

#[test]
fn test_custom_table_changes_valid_names() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("params.toml");
    fs::write(
        &table,
        "[[parameter]]\nname = \"Only_One\"\ndefault = 5\nmin = 0\nmax = 10\nc = 1\nr = 0.5\n",
    )
    .unwrap();

    let output = spsa_tune(&["Futility_Margin", "--params", table.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Available parameters: Only_One"));
}

#[test]
fn test_version() {
    let output = spsa_tune(&["--version"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("spsa-tune "));
}
