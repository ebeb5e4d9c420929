//! CLI tests for commands that need no external toolchain.
//!
//! Spawns the genloop binary and checks exit codes and written files.

use std::fs;
use std::process::Command;

use genloop::exit_codes;
use genloop::io::config::{CONFIG_FILE_NAME, PipelineConfig, load_config};

#[test]
fn init_config_writes_defaults_then_refuses_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("genloop init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let cfg = load_config(&temp.path().join(CONFIG_FILE_NAME)).expect("load");
    assert_eq!(cfg, PipelineConfig::default());

    let status = Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("genloop init-config again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(temp.path())
        .args(["init-config", "--force"])
        .status()
        .expect("genloop init-config --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join(CONFIG_FILE_NAME), "max_iterations = 0\n").expect("write config");
    fs::write(temp.path().join("req.json"), "{}").expect("write requirements");

    let status = Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(temp.path())
        .args(["run", "req.json", "--project-id", "demo"])
        .status()
        .expect("genloop run");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("generated_projects").exists());
}

#[test]
fn organize_prints_destinations() {
    let temp = tempfile::tempdir().expect("tempdir");
    let src = temp.path().join("raw");
    fs::create_dir_all(src.join("tests")).expect("mkdir");
    fs::write(src.join("main.py"), "print(1)\n").expect("write");
    fs::write(src.join("tests").join("test_main.py"), "def test_x(): pass\n").expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_genloop"))
        .current_dir(temp.path())
        .args(["organize", "raw", "--project-name", "Shop"])
        .output()
        .expect("genloop organize");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["source_dir"], "project-shop");
    let destinations: Vec<&str> = report["files"]
        .as_array()
        .expect("files")
        .iter()
        .filter_map(|f| f["to"].as_str())
        .collect();
    assert!(destinations.iter().any(|d| d.starts_with("project-shop/") && d.ends_with("main.py")));
    assert!(destinations.contains(&".tests/unit/test_main.py"));
}
