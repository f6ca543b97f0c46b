use assert_cmd::Command;
use predicates::prelude::*;

// Only flag handling is exercised here; anything past argument parsing
// would launch a browser.

#[test]
fn help_describes_the_command_protocol() {
    Command::cargo_bin("pagepilot")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pagepilot"))
        .stdout(predicate::str::contains("JSON commands on stdin"))
        .stdout(predicate::str::contains("--visible"))
        .stdout(predicate::str::contains("--slow-mo"))
        .stdout(predicate::str::contains("--video"));
}

#[test]
fn version_prints_and_exits() {
    Command::cargo_bin("pagepilot")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pagepilot"));
}

#[test]
fn unknown_flags_are_rejected() {
    Command::cargo_bin("pagepilot")
        .unwrap()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn slow_mo_requires_a_numeric_value() {
    Command::cargo_bin("pagepilot")
        .unwrap()
        .args(["--slow-mo", "fast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
