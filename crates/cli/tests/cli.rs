use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn write_definition(dir: &TempDir, name: &str, id: &str) {
    let content = format!(
        r#"id: {id}
name: {id}
homepage: https://{id}.test
capabilities: [article, draft]
draft_url: "https://{id}.test/editor/{{{{draft_id}}}}"
auth:
  url: https://{id}.test/api/me
endpoints:
  create_draft:
    url: https://{id}.test/api/drafts
    method: POST
    content_type: json
    body:
      title: "{{{{article.title}}}}"
      content: "{{{{article.content}}}}"
    response:
      extract:
        draft_id: "$.id"
  publish:
    url: https://{id}.test/api/publish
    method: POST
"#
    );
    fs::write(dir.path().join(name), content).expect("write definition");
}

fn write_article(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("post.md");
    fs::write(
        &path,
        "---\ntitle: Hello\ntags: [rust]\n---\n\nSome **markdown** body.\n",
    )
    .expect("write article");
    path
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");

    let mut cmd = cargo_bin_cmd!("crosspost");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("definitions_dir"));
    assert!(content.contains("concurrency = 3"));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "# mine").expect("write config");

    let mut cmd = cargo_bin_cmd!("crosspost");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&config_path).expect("read config"), "# mine");
}

#[test]
fn platforms_validate_fails_on_bad_expression() {
    let dir = TempDir::new().expect("temp dir");
    write_definition(&dir, "a.yaml", "alpha");
    fs::write(
        dir.path().join("b.yaml"),
        "id: beta\nname: Beta\nhomepage: https://beta.test\nauth:\n  url: https://beta.test/me\n  response:\n    success: \"$.count > 3\"\n",
    )
    .expect("write definition");

    let mut cmd = cargo_bin_cmd!("crosspost");
    cmd.current_dir(dir.path())
        .args(["platforms", "validate", "--definitions-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation failed"))
        .stderr(predicate::str::contains("beta"));
}

#[test]
fn platforms_validate_passes_on_good_definitions() {
    let dir = TempDir::new().expect("temp dir");
    write_definition(&dir, "a.yaml", "alpha");
    write_definition(&dir, "b.yaml", "beta");

    let mut cmd = cargo_bin_cmd!("crosspost");
    cmd.current_dir(dir.path())
        .args(["platforms", "validate", "--definitions-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed (2 platforms)"));
}

#[test]
fn platforms_list_outputs_valid_json() {
    let dir = TempDir::new().expect("temp dir");
    write_definition(&dir, "b.yaml", "beta");
    write_definition(&dir, "a.yaml", "alpha");

    let mut cmd = cargo_bin_cmd!("crosspost");
    let output = cmd
        .current_dir(dir.path())
        .args(["platforms", "list", "--json", "--definitions-dir"])
        .arg(dir.path())
        .output()
        .expect("run list");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["count"], 2);
    assert_eq!(value["platforms"][0]["id"], "alpha");
    assert_eq!(value["platforms"][1]["id"], "beta");
}

#[test]
fn sync_draft_only_with_stub_transport() {
    let dir = TempDir::new().expect("temp dir");
    write_definition(&dir, "a.yaml", "alpha");
    write_definition(&dir, "b.yaml", "beta");
    let article = write_article(&dir);

    let mut cmd = cargo_bin_cmd!("crosspost");
    let output = cmd
        .current_dir(dir.path())
        .env("CROSSPOST__GENERAL__TRANSPORT", "stub")
        .args(["sync", "--all", "--draft-only", "--json", "--article"])
        .arg(&article)
        .arg("--definitions-dir")
        .arg(dir.path())
        .output()
        .expect("run sync");

    assert!(output.status.success());

    let task: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(task["status"], "completed");
    assert_eq!(task["article"]["title"], "Hello");
    let results = task["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["success"] == true && r["draft_only"] == true));
}

#[test]
fn sync_reports_unknown_platform() {
    let dir = TempDir::new().expect("temp dir");
    write_definition(&dir, "a.yaml", "alpha");
    let article = write_article(&dir);

    let mut cmd = cargo_bin_cmd!("crosspost");
    cmd.current_dir(dir.path())
        .env("CROSSPOST__GENERAL__TRANSPORT", "stub")
        .args(["sync", "-p", "alpha", "-p", "ghost", "--article"])
        .arg(&article)
        .arg("--definitions-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("✓ alpha: published"))
        .stdout(predicate::str::contains("Platform not registered: ghost"));
}
