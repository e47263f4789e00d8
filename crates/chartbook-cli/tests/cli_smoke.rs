use assert_cmd::prelude::*;
use std::fs;
use std::process::Command;

const CHARTS: &str = r#"[
  {
    "id": "eng",
    "name": "Engineering",
    "departmentTag": "Engineering",
    "nodes": [
      { "id": "cto", "members": [{ "role": "CTO", "people": [{ "name": "Ada Lovelace" }] }] },
      { "id": "platform", "parentId": "cto" },
      { "id": "apps", "parentId": "cto" }
    ]
  },
  {
    "id": "ops",
    "name": "Operations",
    "nodes": [{ "id": "coo" }, { "id": "facilities", "parentId": "coo" }]
  }
]"#;

#[test]
fn cli_exports_pdf_from_chart_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let charts = tmp.path().join("charts");
    fs::create_dir_all(&charts).expect("charts dir");
    fs::write(charts.join("charts.json"), CHARTS).expect("write charts");
    let out_dir = tmp.path().join("out");

    let exe = assert_cmd::cargo_bin!("chartbook-cli");
    Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "export",
            "--charts-dir",
            charts.to_string_lossy().as_ref(),
            "--out-dir",
            out_dir.to_string_lossy().as_ref(),
            "--raster-only",
        ])
        .assert()
        .success();

    let bytes = fs::read(out_dir.join("org-charts.pdf")).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF-"), "output is not a PDF");
}

#[test]
fn cli_reports_empty_chart_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");

    let exe = assert_cmd::cargo_bin!("chartbook-cli");
    Command::new(exe)
        .current_dir(tmp.path())
        .args(["export", "--charts-dir", "."])
        .assert()
        .code(3);
}

#[test]
fn cli_rejects_conflicting_sources() {
    let exe = assert_cmd::cargo_bin!("chartbook-cli");
    Command::new(exe)
        .args(["export", "--charts-dir", ".", "--api", "https://charts.example.com/api"])
        .assert()
        .code(2);
}

#[test]
fn cli_analyzes_chart_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = tmp.path().join("charts.json");
    fs::write(&file, CHARTS).expect("write charts");

    let exe = assert_cmd::cargo_bin!("chartbook-cli");
    let output = Command::new(exe)
        .args(["analyze", file.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value[0]["id"], "eng");
    assert_eq!(value[0]["analysis"]["totalNodes"], 3);
    assert_eq!(value[1]["analysis"]["depth"], 2);
}
