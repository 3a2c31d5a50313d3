use std::path::PathBuf;
use std::process::{Command, Output};

fn binary_path() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    std::env::var("CARGO_BIN_EXE_docsheet")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let target_base = std::env::var("CARGO_TARGET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    manifest_dir
                        .ancestors()
                        .nth(3)
                        .map(|p| p.join("target"))
                        .expect("failed to determine workspace target directory")
                });

            let mut path = target_base;
            path.push("debug");
            path.push(if cfg!(windows) { "docsheet.exe" } else { "docsheet" });
            path
        })
}

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn docsheet(args: &[&str]) -> Output {
    let binary = binary_path();
    assert!(
        binary.exists(),
        "expected docsheet binary at {}",
        binary.display()
    );

    // Keep a developer's own config out of the run
    let config_home = tempfile::TempDir::new().expect("failed to create temp dir");
    Command::new(binary)
        .args(args)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to invoke docsheet binary")
}

#[test]
fn replays_saved_response_as_csv() {
    let response = data_file("response.json");
    let output = docsheet(&["replay", response.to_str().unwrap(), "--format", "csv"]);

    assert!(
        output.status.success(),
        "binary failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "#,Key,Value,Comment",
            "1,First Name,Asha,Asha Rao",
            "2,First Designation,Analyst,Started as an Analyst",
            "3,Current Designation,Engineering Manager,\"Currently Engineering Manager, Platform\"",
            "4,Salary,45000,\"$45,000 annual salary\"",
            "5,Salary Currency,USD,\"$45,000 annual salary\"",
            "6,Certifications 1,AWS Solutions Architect (2022),AWS Solutions Architect (2022)",
            "7,Certifications 2,Google Cloud Professional (2023),Google Cloud Professional (2023)",
        ]
    );
}

#[test]
fn replay_writes_json_file_by_extension() {
    let out_dir = tempfile::TempDir::new().unwrap();
    let out_path = out_dir.path().join("table.json");
    let response = data_file("response.json");

    let output = docsheet(&[
        "replay",
        response.to_str().unwrap(),
        "--out",
        out_path.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "binary failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 7);
    assert_eq!(written[6]["#"], 7);
    assert_eq!(written[6]["Key"], "Certifications 2");
}

#[test]
fn replay_writes_xlsx_workbook() {
    let out_dir = tempfile::TempDir::new().unwrap();
    let out_path = out_dir.path().join("extracted_data.xlsx");
    let response = data_file("response.json");

    let output = docsheet(&[
        "replay",
        response.to_str().unwrap(),
        "--out",
        out_path.to_str().unwrap(),
        "--format",
        "xlsx",
    ]);
    assert!(
        output.status.success(),
        "binary failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // XLSX is a zip container
    let bytes = std::fs::read(&out_path).unwrap();
    assert!(bytes.starts_with(b"PK\x03\x04"));
    assert!(output.stdout.is_empty());
}

#[test]
fn json_errors_report_schema_violation() {
    let response = data_file("schema_violation.json");
    let output = docsheet(&["--json-errors", "replay", response.to_str().unwrap()]);

    assert!(!output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {:?}", e, output.stdout));
    let message = body["error"].as_str().unwrap();
    assert!(
        message.contains("\"entries\""),
        "unexpected error message: {}",
        message
    );
    assert_eq!(body.as_object().unwrap().len(), 1);
}

#[test]
fn extract_without_api_key_fails_before_any_request() {
    let pdf_dir = tempfile::TempDir::new().unwrap();
    let pdf_path = pdf_dir.path().join("resume.pdf");
    std::fs::write(&pdf_path, b"%PDF-1.7\n").unwrap();

    let output = Command::new(binary_path())
        .args(["--json-errors", "extract", pdf_path.to_str().unwrap()])
        .env_remove("GEMINI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env("XDG_CONFIG_HOME", pdf_dir.path())
        .output()
        .expect("failed to invoke docsheet binary");

    assert!(!output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
}
