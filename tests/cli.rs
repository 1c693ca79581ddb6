use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn run_writes_reports_and_summary() {
    let output_dir = tempdir().unwrap();
    let assert = Command::cargo_bin("contagion")
        .unwrap()
        .args(["--config", "tests/data/config.json", "--random-seed", "7"])
        .arg("--output-dir")
        .arg(output_dir.path())
        .args(["--prefix", "cli_"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("Simulation finished after"), "{stdout}");

    for name in ["daily", "final_states", "incidence"] {
        let path = output_dir.path().join(format!("cli_{name}.csv"));
        assert!(path.exists(), "{} is missing", path.display());
    }
    let final_states =
        csv::Reader::from_path(output_dir.path().join("cli_final_states.csv")).unwrap();
    assert_eq!(final_states.into_records().count(), 40);
}

#[test]
fn existing_reports_need_force_overwrite() {
    let output_dir = tempdir().unwrap();
    let run = |extra: &[&str]| {
        Command::cargo_bin("contagion")
            .unwrap()
            .args(["--config", "tests/data/config.json"])
            .arg("--output-dir")
            .arg(output_dir.path())
            .args(extra)
            .assert()
    };
    run(&[]).success();
    let failed = run(&[]).failure();
    let stderr = String::from_utf8(failed.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("already exists"), "{stderr}");
    run(&["--force-overwrite"]).success();
}

#[test]
fn missing_config_fails() {
    Command::cargo_bin("contagion")
        .unwrap()
        .args(["--config", "tests/data/does_not_exist.json"])
        .assert()
        .failure();
}
