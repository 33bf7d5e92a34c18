//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn sketchport() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("sketchport").expect("binary builds")
}

#[test]
fn help_lists_subcommands() {
    sketchport()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("list-ports"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("monitor"));
}

#[test]
fn version_prints() {
    sketchport()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sketchport"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    sketchport().assert().failure().code(2);
}

#[test]
fn unknown_flag_is_usage_error() {
    sketchport()
        .args(["list-ports", "--definitely-not-a-flag"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn list_ports_json_is_valid_json() {
    let output = sketchport()
        .args(["--non-interactive", "list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value =
        serde_json::from_slice(&output).expect("list-ports --json emits valid JSON");
    assert!(parsed.is_array());
}

#[test]
fn wrap_emits_envelope_for_bare_logic() {
    let dir = tempdir().unwrap();
    let sketch = dir.path().join("bare.ino");
    fs::write(&sketch, "digitalWrite(13, HIGH);\n").unwrap();

    sketchport()
        .args(["wrap"])
        .arg(&sketch)
        .assert()
        .success()
        .stdout(predicate::str::contains("void setup() {"))
        .stdout(predicate::str::contains("Serial.begin(9600);"))
        .stdout(predicate::str::contains("void loop() {"))
        .stdout(predicate::str::contains("  digitalWrite(13, HIGH);"));
}

#[test]
fn wrap_is_idempotent_through_the_binary() {
    let dir = tempdir().unwrap();
    let bare = dir.path().join("bare.ino");
    fs::write(&bare, "delay(100);\n").unwrap();

    let once = sketchport()
        .args(["wrap"])
        .arg(&bare)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let wrapped = dir.path().join("wrapped.ino");
    fs::write(&wrapped, &once).unwrap();

    let twice = sketchport()
        .args(["wrap"])
        .arg(&wrapped)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(once, twice);
}

#[test]
fn wrap_honors_custom_baud_and_includes() {
    let dir = tempdir().unwrap();
    let sketch = dir.path().join("servo.ino");
    fs::write(&sketch, "myservo.write(90);\n").unwrap();

    sketchport()
        .args(["wrap", "--sketch-baud", "115200", "--include", "Servo.h"])
        .arg(&sketch)
        .assert()
        .success()
        .stdout(predicate::str::contains("#include <Servo.h>"))
        .stdout(predicate::str::contains("Serial.begin(115200);"));
}

#[test]
fn wrap_writes_output_file() {
    let dir = tempdir().unwrap();
    let sketch = dir.path().join("bare.ino");
    let out = dir.path().join("out.ino");
    fs::write(&sketch, "delay(1);\n").unwrap();

    sketchport()
        .args(["wrap", "-o"])
        .arg(&out)
        .arg(&sketch)
        .assert()
        .success();

    let written = fs::read_to_string(&out).unwrap();
    assert!(written.contains("void loop() {"));
}

#[test]
fn wrap_missing_sketch_is_runtime_error() {
    sketchport()
        .args(["wrap", "/nonexistent/sketch.ino"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to read sketch"));
}

#[test]
fn upload_missing_sketch_is_runtime_error() {
    sketchport()
        .args(["--non-interactive", "upload", "/nonexistent/sketch.ino"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to read sketch"));
}

#[test]
fn completions_generate_for_bash() {
    sketchport()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sketchport"));
}
