//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn omr_tri() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("omr-tri").unwrap()
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Empty config so a user config on the test machine cannot interfere
fn empty_config(dir: &Path) -> PathBuf {
    write(dir, "config.toml", "")
}

#[test]
fn template_prints_official_sheet() {
    omr_tri()
        .arg("template")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_questions\": 90"))
        .stdout(predicate::str::contains("\"anchor_marks\""));
}

#[test]
fn template_writes_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("template.json");

    omr_tri().arg("template").arg("--output").arg(&out).assert().success();

    let json = std::fs::read_to_string(&out).unwrap();
    assert!(json.contains("\"bubbles\""));
}

#[test]
fn tct_whole_key() {
    let dir = TempDir::new().unwrap();
    let cohort = write(
        dir.path(),
        "cohort.json",
        r#"[{"id": "s1", "answers": ["A", "B", "C", ""]}, {"id": "s2", "answers": [null, "B"]}]"#,
    );
    let key = write(dir.path(), "key.json", r#"["A", "B", "C", "D"]"#);

    omr_tri()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("tct")
        .arg("--cohort")
        .arg(&cohort)
        .arg("--key")
        .arg(&key)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"average_score\": 7.5"))
        .stdout(predicate::str::contains("\"average_score\": 2.5"));
}

#[test]
fn score_single_area_with_earlier_year_table() {
    let dir = TempDir::new().unwrap();
    let cohort = write(
        dir.path(),
        "cohort.json",
        r#"[{"id": "s1", "answers": ["A", "B", "", ""]}, {"id": "s2", "answers": ["A", "", "", ""]}]"#,
    );
    let key = write(dir.path(), "key.json", r#"["A", "B", "C", "D"]"#);
    let table = write(
        dir.path(),
        "table.csv",
        "\u{feff}area;acertos;min;max;media;ano\n\
         MT;0;;;;2022\n\
         MT;1;400;600;500;2022\n\
         MT;2;410,0;620,0;510,0;2022\n\
         MT;3;bad;630;520;2022\n",
    );

    omr_tri()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("score")
        .arg("--cohort")
        .arg(&cohort)
        .arg("--key")
        .arg(&key)
        .arg("--table")
        .arg(&table)
        .arg("--year")
        .arg("2023")
        .arg("--layout")
        .arg("whole")
        .arg("--area")
        .arg("MT")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"final_score\": 620.0"))
        .stdout(predicate::str::contains("\"final_score\": 600.0"))
        .stdout(predicate::str::contains("\"overall_score\": 620.0"))
        .stdout(predicate::str::contains("\"records\": 3"));
}

#[test]
fn score_without_table_fails() {
    let dir = TempDir::new().unwrap();
    let cohort = write(dir.path(), "cohort.json", r#"[{"id": "s1", "answers": ["A"]}]"#);
    let key = write(dir.path(), "key.json", r#"["A"]"#);

    omr_tri()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("score")
        .arg("--cohort")
        .arg(&cohort)
        .arg("--key")
        .arg(&key)
        .arg("--year")
        .arg("2023")
        .arg("--layout")
        .arg("whole")
        .arg("--area")
        .arg("LC")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No historical table"));
}

#[test]
fn missing_config_file_fails() {
    omr_tri()
        .arg("--config")
        .arg("/nonexistent/omr-tri.toml")
        .arg("template")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn detect_blank_page_and_bad_page() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("blank.png");
    GrayImage::from_pixel(600, 800, Luma([255])).save(&page).unwrap();
    let overlays = dir.path().join("overlays");

    omr_tri()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("detect")
        .arg(&page)
        .arg(dir.path().join("missing.png"))
        .arg("--overlay")
        .arg(&overlays)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"overall_confidence\": 1.0"))
        .stdout(predicate::str::contains("\"error\""));

    assert!(overlays.join("blank_overlay.png").exists());
}

#[test]
fn detect_only_bad_pages_fails() {
    let dir = TempDir::new().unwrap();
    omr_tri()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("detect")
        .arg(dir.path().join("missing.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No page could be read"));
}
