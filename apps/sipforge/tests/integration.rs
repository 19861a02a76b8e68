//! Integration tests for the sipforge CLI

use std::process::Command;

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_sipforge"))
        .arg("--version")
        .output()
        .expect("Failed to execute sipforge");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sipforge"));
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_sipforge"))
        .arg("--help")
        .output()
        .expect("Failed to execute sipforge");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["download", "assemble", "confirm", "search"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_sipforge"))
        .arg("invalid-command")
        .output()
        .expect("Failed to execute sipforge");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn test_missing_package_is_a_general_failure() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[paths]\npackage_dir = {:?}\narchive_dir = {:?}\n",
            temp.path().join("packages"),
            temp.path().join("archive"),
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_sipforge"))
        .arg("--config")
        .arg(&config)
        .args(["confirm", "42", "--status", "accepted"])
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute sipforge");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_assemble_without_signing_key_fails() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(&config, "[mets]\norganization_name = \"Museum\"\ncontract_id = \"c\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_sipforge"))
        .arg("--config")
        .arg(&config)
        .args(["assemble", "42"])
        .output()
        .expect("Failed to execute sipforge");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sign.key_path"));
}
