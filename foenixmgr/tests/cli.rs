use std::{fs, process::Command};

use assert_cmd::prelude::*;

fn foenixmgr(dir: &tempfile::TempDir) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("foenixmgr")?;
    cmd.current_dir(dir.path())
        .env_remove("FOENIXMGR")
        .env_remove("FOENIXMGR_PORT");
    Ok(cmd)
}

#[test]
fn help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let output = foenixmgr(&dir)?.arg("--help").output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["flash-bulk", "run-pgz", "tcp-bridge", "dump"] {
        assert!(stdout.contains(command), "missing {command}");
    }

    Ok(())
}

#[test]
fn missing_bulk_list_fails_before_connecting() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let output = foenixmgr(&dir)?
        .args(["flash-bulk", "missing.csv", "--yes", "--port", "/dev/null-port"])
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.csv"));

    Ok(())
}

#[test]
fn empty_bulk_list_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("sectors.csv"), "\n")?;

    foenixmgr(&dir)?
        .args(["flash-bulk", "sectors.csv", "--yes"])
        .assert()
        .failure();

    Ok(())
}

#[test]
fn no_port_configured() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let output = foenixmgr(&dir)?.arg("revision").output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No serial port"));

    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("foenixmgr.toml"), "cpu = \"z80\"\n")?;

    foenixmgr(&dir)?.arg("revision").assert().failure();

    Ok(())
}

#[test]
fn dump_count_is_limited() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    foenixmgr(&dir)?
        .args(["dump", "--count", "10000"])
        .assert()
        .failure()
        .code(2);

    Ok(())
}
