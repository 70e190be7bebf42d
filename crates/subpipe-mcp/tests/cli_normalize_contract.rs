use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

#[test]
fn normalize_vtt_fixture_json() {
    let out = Command::new(assert_cmd::cargo::cargo_bin!("subpipe"))
        .args(["normalize", fixture("talk.en.vtt").to_str().unwrap()])
        .output()
        .expect("run subpipe normalize");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("normalize"));
    assert_eq!(v["format"].as_str(), Some("vtt"));
    assert_eq!(
        v["content"].as_str(),
        Some("Welcome to the talk Let's begin.")
    );
    assert_eq!(v["chars"].as_u64(), Some(32));
}

#[test]
fn normalize_srt_fixture_text() {
    Command::new(assert_cmd::cargo::cargo_bin!("subpipe"))
        .args([
            "normalize",
            fixture("scene.srt").to_str().unwrap(),
            "--output",
            "text",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("Hello there General Kenobi\n"));
}

#[test]
fn normalize_unknown_extension_fails_with_invalid_params() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("captions.txt");
    std::fs::write(&p, "1\n00:00:01,000 --> 00:00:02,000\nhi\n").unwrap();

    let out = Command::new(assert_cmd::cargo::cargo_bin!("subpipe"))
        .args(["normalize", p.to_str().unwrap()])
        .output()
        .expect("run subpipe normalize");
    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["error"]["code"].as_str(), Some("invalid_params"));

    // An explicit format makes the same file readable.
    Command::new(assert_cmd::cargo::cargo_bin!("subpipe"))
        .args(["normalize", p.to_str().unwrap(), "--format", "srt", "--output", "text"])
        .assert()
        .success()
        .stdout(predicate::str::diff("hi\n"));
}
