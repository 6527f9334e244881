use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn binary() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_apexlogs"));
    command.env_remove("APEXLOGS_SF").env_remove("APEXLOGS_TARGET_ORG").env_remove("APEXLOGS_LOG_LIMIT");
    command
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    binary()
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run apexlogs binary")
}

#[cfg(unix)]
fn fake_sf(dir: &Path, stdout: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-sf");
    fs::write(&path, format!("#!/bin/sh\ncat <<'JSON'\n{stdout}\nJSON\nexit 1\n"))
        .expect("write fake sf");
    let mut permissions = fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod fake sf");
    path
}

#[test]
fn version_flag_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_in(temp.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("apexlogs"));
}

#[test]
fn missing_explicit_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_in(temp.path(), &["--config", "nope.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found"), "{stderr}");
}

#[test]
fn invalid_key_binding_in_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("apexlogs.json"), r#"{ "keys": { "refresh": ["hyper+r"] } }"#)
        .expect("write config");
    let log_file = temp.path().join("apexlogs.log");
    let output = run_in(temp.path(), &["--log-file", log_file.to_str().expect("utf8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid key binding"), "{stderr}");
}

#[cfg(unix)]
#[test]
fn sf_rejection_is_reported_before_the_terminal_opens() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sf = fake_sf(temp.path(), r#"{"status":1,"name":"NoDefaultEnvError","message":"No default org"}"#);
    let log_file = temp.path().join("state").join("apexlogs.log");

    let output = run_in(
        temp.path(),
        &[
            "--sf",
            sf.to_str().expect("utf8 path"),
            "--log-file",
            log_file.to_str().expect("utf8 path"),
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No default org"), "{stderr}");
    let log = fs::read_to_string(&log_file).expect("log file written");
    assert!(log.contains("resolved config"), "{log}");
}

#[test]
fn missing_sf_binary_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_file = temp.path().join("apexlogs.log");
    let output = run_in(
        temp.path(),
        &[
            "--sf",
            "apexlogs-no-such-sf-binary",
            "--log-file",
            log_file.to_str().expect("utf8 path"),
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to run `apexlogs-no-such-sf-binary`"), "{stderr}");
}
