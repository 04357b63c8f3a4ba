use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn review_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("review");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let outputs = root.join("outputs");
    for (rel, body) in [
        (
            "SIB-200/gpt4/en.jsonl",
            "{\"prompt\": \"a\", \"predicted_category\": \"sports\"}\n{\"prompt\": \"b\", \"predicted_category\": \"science\"}\n",
        ),
        ("SIB-200/gpt4/fr.jsonl", "{\"prompt\": \"c\"}\n"),
        ("SIB-200/llama/en.jsonl", "{\"prompt\": \"d\"}\n"),
        ("Flores/en-xx/gpt4/fra.jsonl", "{\"hyp_text\": \"bonjour\"}\n"),
    ] {
        let path = outputs.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    let config_content = format!(
        r#"[db]
path = "{root}/data/review.sqlite"

[data]
root = "{root}/outputs"
task_config = "{root}/data/tasks.json"

[server]
bind = "127.0.0.1:0"

[tasks.Classification]
benchmarks = ["SIB-200", "Taxi1500"]

[tasks.Translation]
benchmarks = ["Flores"]
layout = "lang_type"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("review.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_review(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = review_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run review binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_review(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/review.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_review(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_review(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_writes_task_config() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_review(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 4 files"), "got: {}", stdout);

    let written = fs::read_to_string(tmp.path().join("data/tasks.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(
        json["Classification"]["SIB-200"]["gpt4"]["en"],
        "SIB-200/gpt4/en.jsonl"
    );
    assert_eq!(
        json["Translation"]["Flores"]["gpt4"]["en-xx_fra"],
        "Flores/en-xx/gpt4/fra.jsonl"
    );
    assert_eq!(json["Classification"]["Taxi1500"], serde_json::json!({}));
}

#[test]
fn test_index_idempotent_byte_identical() {
    let (tmp, config_path) = setup_test_env();
    let index_path = tmp.path().join("data/tasks.json");

    run_review(&config_path, &["index"]);
    let first = fs::read(&index_path).unwrap();

    run_review(&config_path, &["index"]);
    let second = fs::read(&index_path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_index_overwrites_stale_entries() {
    let (tmp, config_path) = setup_test_env();

    run_review(&config_path, &["index"]);
    fs::remove_dir_all(tmp.path().join("outputs/SIB-200/llama")).unwrap();
    run_review(&config_path, &["index"]);

    let (stdout, _, success) = run_review(&config_path, &["tasks"]);
    assert!(success);
    assert!(stdout.contains("gpt4"));
    assert!(!stdout.contains("llama"), "stale model kept: {}", stdout);
}

#[test]
fn test_export_empty_database() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("export/review.json");

    run_review(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_review(&config_path, &["export", "--output", out.to_str().unwrap()]);
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("Exported 0 annotations, 0 comments"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
    assert!(json["annotations"].as_array().unwrap().is_empty());
    assert!(json["comments"].as_array().unwrap().is_empty());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_review(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
