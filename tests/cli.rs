mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use common::Fixture;

fn setup_test_env() -> (Fixture, PathBuf) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fx = rt.block_on(common::fixture());

    let config_dir = fx.tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[normalized]
path = "{}"

[documents]
path = "{}"

[benchmark]
sample_size = 3
"#,
        fx.normalized.display(),
        fx.documents.display()
    );
    let config_path = config_dir.join("cine.toml");
    fs::write(&config_path, config_content).unwrap();
    (fx, config_path)
}

fn run_cine(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_cine"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cine: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn prepare(config_path: &Path) {
    for cmd in ["repair", "mirror", "rebuild"] {
        let (stdout, stderr, success) = run_cine(config_path, &[cmd]);
        assert!(success, "{} failed: stdout={}, stderr={}", cmd, stdout, stderr);
    }
}

#[test]
fn test_repair_check_fails_until_repaired() {
    let (_fx, config_path) = setup_test_env();

    let (_, stderr, success) = run_cine(&config_path, &["repair", "--check"]);
    assert!(!success);
    assert!(stderr.contains("integrity error"), "stderr: {}", stderr);

    let (stdout, _, success) = run_cine(&config_path, &["repair"]);
    assert!(success);
    assert!(stdout.contains("Total deleted: 5"), "stdout: {}", stdout);

    let (stdout, _, success) = run_cine(&config_path, &["repair", "--check"]);
    assert!(success);
    assert!(stdout.contains("No orphans found."));
}

#[test]
fn test_query_json_output() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (stdout, stderr, success) = run_cine(
        &config_path,
        &[
            "query",
            "top-by-genre",
            "--repr",
            "embedded",
            "--param",
            "genre=Action",
            "--param",
            "year_from=2000",
            "--param",
            "year_to=2010",
            "--param",
            "n=2",
            "--json",
        ],
    );
    assert!(success, "query failed: {}", stderr);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["movie_id"], "tt4003");
    assert_eq!(rows[1]["movie_id"], "tt4001");
}

#[test]
fn test_query_text_output() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (stdout, _, success) = run_cine(&config_path, &["query", "q9", "--repr", "flat"]);
    assert!(success);
    assert!(stdout.contains("Veteran Actor: 11 years over 12 movies"), "stdout: {}", stdout);
}

#[test]
fn test_unknown_query_fails() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (_, stderr, success) = run_cine(&config_path, &["query", "q10"]);
    assert!(!success);
    assert!(stderr.contains("query error"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_representation_rejected() {
    let (_fx, config_path) = setup_test_env();

    let (_, _, success) = run_cine(&config_path, &["query", "q5", "--repr", "graph"]);
    assert!(!success);
}

#[test]
fn test_missing_config_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, _, success) = run_cine(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
}

#[test]
fn test_index_create_and_drop() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (stdout, _, success) = run_cine(&config_path, &["index", "create", "--repr", "embedded"]);
    assert!(success);
    assert!(stdout.contains("created (3)"), "stdout: {}", stdout);

    let (stdout, _, success) = run_cine(&config_path, &["index", "create", "--repr", "embedded"]);
    assert!(success);
    assert!(stdout.contains("already present (3)"), "stdout: {}", stdout);

    let (stdout, _, success) = run_cine(&config_path, &["index", "drop", "--repr", "embedded"]);
    assert!(success);
    assert!(stdout.contains("dropped (3)"), "stdout: {}", stdout);
}

#[test]
fn test_verify_and_bench() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (stdout, stderr, success) = run_cine(&config_path, &["verify"]);
    assert!(success, "verify failed: {}", stderr);
    assert!(!stdout.contains("DIFFERS"));

    let (stdout, stderr, success) =
        run_cine(&config_path, &["bench", "indexes", "--repr", "flat", "--json"]);
    assert!(success, "bench failed: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["tasks"].as_array().unwrap().len(), 9);

    let (stdout, _, success) = run_cine(&config_path, &["bench", "compare"]);
    assert!(success);
    assert!(stdout.contains("Sampled movies (year > 2000): 3"), "stdout: {}", stdout);
}

#[test]
fn test_stats_lists_entities() {
    let (_fx, config_path) = setup_test_env();
    prepare(&config_path);

    let (stdout, _, success) = run_cine(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("principals"));
    assert!(stdout.contains("Embedded (movies_complete): 83"), "stdout: {}", stdout);
}
