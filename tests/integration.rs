use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn scribe_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("scribe");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("profile");
    fs::create_dir_all(files_dir.join("projects")).unwrap();
    fs::write(
        files_dir.join("resume_jane.txt"),
        "JANE DOE\n\nEXPERIENCE\nSenior engineer building Rust services and Kubernetes tooling.\n\n\
         SKILLS\nRust, Python, PostgreSQL, Terraform",
    )
    .unwrap();
    fs::write(
        files_dir.join("cover_letter_acme.md"),
        "Dear hiring team,\n\nI am excited to apply for the platform role at Acme.\n\nBest regards,\nJane",
    )
    .unwrap();
    fs::write(
        files_dir.join("notes.txt"),
        "Gardening notes about tomatoes and basil.",
    )
    .unwrap();
    fs::write(
        files_dir.join("projects").join("project_ledger.md"),
        "# Ledger\n\nA double-entry ledger written in Rust with SQLite storage.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/scribe.sqlite"
collection = "test_profile"

[chunking]
strategy = "default"
chunk_size = 500
overlap = 50

[retrieval]
n_results = 5

[output]
dir = "{root}/outputs"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("scribe.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_scribe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = scribe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run scribe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn profile_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("profile")
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_scribe(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_scribe(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_ingest_then_reingest_is_unchanged() {
    let (_tmp, config_path) = setup_test_env();
    let file = profile_dir(&config_path).join("resume_jane.txt");
    let file = file.to_str().unwrap();

    let (stdout, stderr, success) = run_scribe(&config_path, &["ingest", file]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("stored 1 chunks"));
    assert!(stdout.contains("1 documents with 1 chunks"));

    let (stdout, _, success) = run_scribe(&config_path, &["ingest", file]);
    assert!(success);
    assert!(stdout.contains("unchanged"));
}

#[test]
fn test_ingest_missing_file_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_scribe(&config_path, &["ingest", "/no/such/file.txt"]);
    assert!(!success);
}

#[test]
fn test_ingest_with_metadata() {
    let (_tmp, config_path) = setup_test_env();
    let file = profile_dir(&config_path).join("notes.txt");

    let (stdout, stderr, success) = run_scribe(
        &config_path,
        &[
            "ingest",
            file.to_str().unwrap(),
            "--metadata",
            "topic=garden",
        ],
    );
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("\"topic\":\"garden\""));

    let (stdout, _, _) = run_scribe(
        &config_path,
        &["search", "tomatoes", "--show-metadata"],
    );
    assert!(stdout.contains("\"topic\":\"garden\""));
}

#[test]
fn test_ingest_folder_flat_and_recursive() {
    let (_tmp, config_path) = setup_test_env();
    let folder = profile_dir(&config_path);
    let folder = folder.to_str().unwrap();

    let (stdout, stderr, success) = run_scribe(&config_path, &["ingest-folder", folder]);
    assert!(success, "ingest-folder failed: {}", stderr);
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("stored: 3"));

    let (stdout, _, success) =
        run_scribe(&config_path, &["ingest-folder", folder, "--recursive"]);
    assert!(success);
    assert!(stdout.contains("files found: 4"));
    assert!(stdout.contains("stored: 1"));
    assert!(stdout.contains("unchanged: 3"));
    assert!(stdout.contains("success rate: 100.0%"));
}

#[test]
fn test_list_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    let folder = profile_dir(&config_path);
    run_scribe(&config_path, &["ingest-folder", folder.to_str().unwrap()]);

    let (stdout, _, success) = run_scribe(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("resume_jane.txt  [resume]"));
    assert!(stdout.contains("cover_letter_acme.md  [cover_letter]"));

    let (stdout, _, success) = run_scribe(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Collection:  test_profile"));
}

#[test]
fn test_search_modes() {
    let (_tmp, config_path) = setup_test_env();
    let folder = profile_dir(&config_path);
    run_scribe(
        &config_path,
        &["ingest-folder", folder.to_str().unwrap(), "--recursive"],
    );

    let (stdout, stderr, success) =
        run_scribe(&config_path, &["search", "tomatoes basil", "--limit", "1"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. notes.txt"));

    let (stdout, _, success) = run_scribe(
        &config_path,
        &["search", "Rust experience", "--multi-stage", "--limit", "2"],
    );
    assert!(success);
    assert!(stdout.contains("resume_jane.txt"));
    assert!(stdout.contains("[1."));

    let (stdout, _, success) =
        run_scribe(&config_path, &["search", "Rust", "--cluster", "--limit", "4"]);
    assert!(success);
    assert!(stdout.starts_with("clusters: "));

    let (stdout, _, success) = run_scribe(
        &config_path,
        &["search", "Rust", "--category", "resume"],
    );
    assert!(success);
    assert!(stdout.contains("resume_jane.txt"));
    assert!(!stdout.contains("notes.txt"));
}

#[test]
fn test_search_empty_collection() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_scribe(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_verify_states() {
    let (_tmp, config_path) = setup_test_env();
    let file = profile_dir(&config_path).join("notes.txt");
    run_scribe(&config_path, &["ingest", file.to_str().unwrap()]);

    let (stdout, _, success) = run_scribe(&config_path, &["verify", "notes.txt"]);
    assert!(success);
    assert!(stdout.contains("status: verified"));
    assert!(stdout.contains("chunks: 1"));

    let (stdout, _, success) = run_scribe(&config_path, &["verify", "missing.txt"]);
    assert!(success);
    assert!(stdout.contains("status: not found"));
}

#[test]
fn test_remove() {
    let (_tmp, config_path) = setup_test_env();
    let file = profile_dir(&config_path).join("notes.txt");
    run_scribe(&config_path, &["ingest", file.to_str().unwrap()]);

    let (stdout, _, success) = run_scribe(&config_path, &["remove", "missing.txt", "--confirm"]);
    assert!(!success);
    assert!(stdout.contains("not found"));
    assert!(stdout.contains("notes.txt"));

    let (stdout, _, success) = run_scribe(&config_path, &["remove", "notes.txt", "--confirm"]);
    assert!(success);
    assert!(stdout.contains("0 documents with 0 chunks"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();

    let (_, stderr, success) = run_scribe(&bad, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

#[test]
fn test_webfetch_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    let output = Command::new(scribe_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["webfetch", "https://example.com"])
        .env_remove("OLLAMA_API_KEY")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OLLAMA_API_KEY"));
}
