//! The `diffdibb` binary end to end.

use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn missing_logging_file_is_reported_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("logging.conf");

    let output = Command::new(env!("CARGO_BIN_EXE_diffdibb"))
        .current_dir(dir.path())
        .env("DIFFDIBB_LOGGING_CONFIG_FILE", &missing)
        .env("DIFFDIBB_CONFIG_FILE", fixture("diffdibb.cfg"))
        .env_remove("DIFFDIBB_LOG_LEVEL")
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let reported = format!("{} configuration file does not exist!", missing.display());
    let line = stderr
        .lines()
        .find(|line| line.contains(&reported))
        .unwrap_or_else(|| panic!("no missing-file record in {stderr}"));
    assert!(line.contains("ERROR"), "got {line}");
    assert!(stderr.contains("no logging configuration, using stderr"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"diffdibb\""), "got {stdout}");
}
