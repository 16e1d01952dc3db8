//! Integration tests for the pdftext CLI
//!
//! Runs the built binary against PDFs written to a temporary directory.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pdftext"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run pdftext")
}

/// A document with one page per entry, each showing its text
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} /Resources << /Font << /F1 3 0 R >> >> >>",
            kids.join(" "),
            n
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

fn write_pdf(dir: &TempDir, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, build_pdf(pages)).expect("Failed to write PDF");
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("temp path is UTF-8")
}

#[test]
fn test_extract_text_to_stdout() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "two.pdf", &["First page", "Second page"]);

    let output = run_cli(&["extract-text", arg(&pdf)]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "=== Page 1 ===\nFirst page\n\n=== Page 2 ===\nSecond page\n"
    );
}

#[test]
fn test_extract_single_page_with_custom_marker_ignored() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "three.pdf", &["one", "two", "three"]);

    let output = run_cli(&["extract-text", arg(&pdf), "--page", "2", "--marker", "## {page}"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "two\n");
}

#[test]
fn test_extract_with_marker_and_parallel() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "three.pdf", &["one", "two", "three"]);

    let output = run_cli(&["extract-text", arg(&pdf), "--parallel", "--marker", "## {page}"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "## 1\none\n\n## 2\ntwo\n\n## 3\nthree\n");
}

#[test]
fn test_extract_to_file() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "doc.pdf", &["Saved text"]);
    let out = dir.path().join("out.txt");

    let output = run_cli(&["extract-text", arg(&pdf), "-o", arg(&out)]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), "=== Page 1 ===\nSaved text");
}

#[test]
fn test_extract_json() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "doc.pdf", &["Json text"]);

    let output = run_cli(&["extract-text", arg(&pdf), "--json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["success"], serde_json::json!(true));
    assert_eq!(value["page_count"], serde_json::json!(1));
    assert_eq!(value["processed_page_indices"], serde_json::json!([0]));
    assert_eq!(value["version"], serde_json::json!("1.4"));
}

#[test]
fn test_page_out_of_range() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "doc.pdf", &["only"]);

    let output = run_cli(&["extract-text", arg(&pdf), "--page", "3"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("out of range"));
}

#[test]
fn test_not_a_pdf_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.pdf");
    fs::write(&path, b"just some text, no header").unwrap();

    let output = run_cli(&["extract-text", arg(&path)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no %PDF- header"));
}

#[test]
fn test_missing_input_file() {
    let output = run_cli(&["extract-text", "/nonexistent/input.pdf"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read"));
}

#[test]
fn test_info_command() {
    let dir = tempdir().unwrap();
    let pdf = write_pdf(&dir, "info.pdf", &["a", "b"]);

    let output = run_cli(&["info", arg(&pdf)]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("PDF Version: 1.4"));
    assert!(text.contains("Pages: 2"));
    assert!(text.contains("Page 2: 612x792 pts, MediaBox [0 0 612 792], rotation 0"));
    assert!(text.contains("Recovered: no"));
}

#[test]
fn test_help_lists_commands() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("extract-text"));
    assert!(text.contains("info"));
}
