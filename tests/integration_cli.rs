use assert_cmd::Command;
use tempfile::tempdir;

// Drives the compiled binary in its non-interactive paths. HOME points at a
// temp dir so logs and history never touch the real state directory.

fn nback(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("nback").unwrap();
    cmd.env("HOME", home).env_remove("XDG_CONFIG_HOME");
    cmd
}

#[test]
fn show_sequence_prints_requested_round() {
    let dir = tempdir().unwrap();
    let output = nback(dir.path())
        .args(["--show-sequence", "--events", "12", "--n-back", "2", "--seed", "5"])
        .arg("--config")
        .arg(dir.path().join("prefs.json"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let visual = json["visual"].as_array().unwrap();
    assert_eq!(visual.len(), 12);
    assert!(visual.iter().all(|v| (1..=9).contains(&v.as_u64().unwrap())));
    assert!(json.get("audio").is_none());
}

#[test]
fn show_sequence_for_both_channels_is_seed_stable() {
    let dir = tempdir().unwrap();
    let run = || {
        nback(dir.path())
            .args(["--show-sequence", "-m", "audio-visual", "--alphabet", "5", "--seed", "11"])
            .arg("--config")
            .arg(dir.path().join("prefs.json"))
            .output()
            .unwrap()
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let json: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(json["visual"].as_array().unwrap().len(), 10);
    let audio = json["audio"].as_array().unwrap();
    assert!(audio.iter().all(|v| (1..=5).contains(&v.as_u64().unwrap())));
}

#[test]
fn invalid_settings_are_rejected() {
    let dir = tempdir().unwrap();
    nback(dir.path())
        .args(["--show-sequence", "--events", "2", "--n-back", "2"])
        .arg("--config")
        .arg(dir.path().join("prefs.json"))
        .assert()
        .failure();
}

#[test]
fn invalid_overrides_are_not_saved() {
    let dir = tempdir().unwrap();
    let prefs = dir.path().join("prefs.json");
    for (flag, value, field) in [
        ("--events", "1", "total_events"),
        ("--grid-size", "1000", "grid_size"),
    ] {
        let output = nback(dir.path())
            .args([flag, value])
            .arg("--config")
            .arg(&prefs)
            .write_stdin("")
            .output()
            .unwrap();
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains(field), "{flag}: {stderr}");
        assert!(!stderr.contains("tty"), "{flag}: {stderr}");
    }
    assert!(!prefs.exists());
}

#[test]
fn interactive_mode_requires_a_tty() {
    let dir = tempdir().unwrap();
    nback(dir.path())
        .arg("--config")
        .arg(dir.path().join("prefs.json"))
        .write_stdin("")
        .assert()
        .failure();
}
