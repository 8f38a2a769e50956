//! E2E tests for `drw open`, `drw watch`, and `drw status` against a host
//! directory.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn drw(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("drw"));
    cmd.current_dir(dir);
    cmd.arg("--data-dir").arg(dir.join("data"));
    cmd.env("XDG_CONFIG_HOME", dir.join("config"));
    cmd.env_remove("DRAWER_CONFIG");
    cmd.env("DRAWER_LOG", "error");
    cmd
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = drw(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("drw should not crash");
    assert!(
        output.status.success(),
        "drw {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn import(dir: &Path, name: &str, elements: &str) -> String {
    let file = dir.join(format!("{name}.json"));
    std::fs::write(&file, elements).expect("write import");
    let canvas = json_of(
        dir,
        &["import", file.to_str().expect("utf8 path"), "--name", name],
    );
    canvas["id"].as_str().expect("id").to_owned()
}

#[test]
fn open_projects_the_canvas_and_requests_a_reload() {
    let dir = TempDir::new().expect("tempdir");
    let host = dir.path().join("host");
    let id = import(dir.path(), "Diagram", r#"[{"id":"a"},{"id":"b"}]"#);

    let report = json_of(
        dir.path(),
        &["open", "Diagram", "--host-dir", host.to_str().expect("utf8 path")],
    );
    assert_eq!(report["canvas"]["id"].as_str(), Some(id.as_str()));
    assert_eq!(report["reloadRequested"], true);

    let elements: Value = serde_json::from_str(
        &std::fs::read_to_string(host.join("excalidraw.json")).expect("host elements"),
    )
    .expect("host elements are JSON");
    let ids: Vec<&str> = elements
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(host.join("excalidraw-state.json").exists());
    assert!(host.join(".reload").exists());

    let status = json_of(dir.path(), &["status"]);
    assert_eq!(status["openCanvas"]["id"].as_str(), Some(id.as_str()));
}

#[test]
fn watch_saves_host_edits_on_exit() {
    let dir = TempDir::new().expect("tempdir");
    let host = dir.path().join("host");
    let host_arg = host.to_str().expect("utf8 path");
    import(dir.path(), "Diagram", "[]");
    json_of(dir.path(), &["open", "Diagram", "--host-dir", host_arg]);

    std::fs::write(
        host.join("excalidraw.json"),
        r#"[{"id":"e1","type":"rectangle"},{"id":"e2","type":"ellipse"}]"#,
    )
    .expect("host edit");

    drw(dir.path())
        .args(["watch", "--host-dir", host_arg, "--exit-after-ms", "300"])
        .assert()
        .success();

    let shown = json_of(dir.path(), &["show", "Diagram"]);
    assert_eq!(shown["elements"], 2);
}

#[test]
fn watch_without_open_canvas_changes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let host = dir.path().join("host");
    std::fs::create_dir_all(&host).expect("host dir");
    std::fs::write(host.join("excalidraw.json"), r#"[{"id":"stray"}]"#).expect("host edit");
    import(dir.path(), "Untouched", "[]");

    drw(dir.path())
        .args([
            "watch",
            "--host-dir",
            host.to_str().expect("utf8 path"),
            "--exit-after-ms",
            "200",
        ])
        .assert()
        .success();

    let shown = json_of(dir.path(), &["show", "Untouched"]);
    assert_eq!(shown["elements"], 0);
}

#[test]
fn status_reports_capabilities() {
    let dir = TempDir::new().expect("tempdir");
    let host = dir.path().join("host");
    std::fs::create_dir_all(&host).expect("host dir");

    let status = json_of(
        dir.path(),
        &["status", "--host-dir", host.to_str().expect("utf8 path")],
    );
    assert!(status.get("degraded").is_none());
    let names: Vec<&str> = status["capabilities"]
        .as_array()
        .expect("capabilities")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec!["durable_store", "store_writable", "host_writable", "host_watch"]
    );
    assert_eq!(status["capabilities"][0]["available"], true);
}

#[test]
fn unusable_data_dir_degrades_to_memory() {
    let dir = TempDir::new().expect("tempdir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a directory").expect("write blocker");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("drw"))
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env_remove("DRAWER_CONFIG")
        .env("DRAWER_LOG", "error")
        .args(["--data-dir", blocker.to_str().expect("utf8 path"), "status", "--json"])
        .output()
        .expect("drw should not crash");
    assert!(output.status.success());
    let status: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert!(status["degraded"].is_string());
    assert_eq!(status["capabilities"][0]["available"], false);
}
