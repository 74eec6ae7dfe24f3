use assert_cmd::Command;

#[test]
fn help_describes_the_check_modes() {
    let output = Command::cargo_bin("pytidy")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--summary"));
    assert!(stdout.contains("--force-retry"));
    assert!(stdout.contains("cache"));
}

#[test]
fn version_flag_reports_the_crate_version() {
    let output = Command::cargo_bin("pytidy")
        .unwrap()
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}
