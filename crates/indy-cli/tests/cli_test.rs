//! End-to-end tests that drive the `indy` binary against a temporary
//! database.

use std::path::Path;
use std::process::{Command, Output};

use indy_core::snapshot::get_project_snapshot;
use indy_test_utils::{TEST_USER, TestDb, pg_url};

async fn db_url(db: &TestDb) -> String {
    format!("{}/{}", pg_url().await, db.name)
}

fn indy(config_home: &Path, url: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_indy"))
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("INDY_DATABASE_URL")
        .env_remove("INDY_USER")
        .arg("--database-url")
        .arg(url)
        .args(args)
        .output()
        .expect("failed to run indy binary")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[tokio::test]
async fn project_plan_and_ledger_round() {
    let db = TestDb::new().await;
    let url = db_url(&db).await;
    let home = tempfile::TempDir::new().unwrap();

    let out = indy(
        home.path(),
        &url,
        &[
            "--user",
            TEST_USER,
            "--json",
            "project",
            "create",
            "Rifters",
            "--strategy",
            "aggressive",
        ],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let project: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(project["strategy"], "aggressive");
    assert_eq!(project["status"], "draft");
    let project_id = project["id"].as_i64().unwrap();

    let patch = home.path().join("patch.toml");
    std::fs::write(
        &patch,
        r#"
[[tasks]]
name = "Rifter hulls"
target_runs = 3

[[jobs]]
task_id = -1
runs = 3
duration_seconds = 600
cost_isk = 1500.0
"#,
    )
    .unwrap();
    let pid = project_id.to_string();
    let patch_path = patch.to_str().unwrap();

    let out = indy(home.path(), &url, &["--user", TEST_USER, "plan", "preview", &pid, patch_path]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("nothing written"));
    let snap = get_project_snapshot(&db.pool, TEST_USER, project_id).await.unwrap();
    assert!(snap.tasks.is_empty());

    let out = indy(
        home.path(),
        &url,
        &["--user", TEST_USER, "--json", "plan", "apply", &pid, patch_path],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(summary["tasks_inserted"], 1);
    assert_eq!(summary["jobs_inserted"], 1);

    let out = indy(home.path(), &url, &["--user", TEST_USER, "--json", "ledger"]);
    assert!(out.status.success());
    let ledger: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(ledger["total_jobs"], 1);
    assert_eq!(ledger["entries"][0]["task_name"], "Rifter hulls");

    db.teardown().await;
}

#[tokio::test]
async fn data_commands_require_a_user() {
    let db = TestDb::new().await;
    let url = db_url(&db).await;
    let home = tempfile::TempDir::new().unwrap();

    let out = indy(home.path(), &url, &["project", "list"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no user key"));

    db.teardown().await;
}

#[tokio::test]
async fn failed_bulk_status_exits_nonzero() {
    let db = TestDb::new().await;
    let url = db_url(&db).await;
    let home = tempfile::TempDir::new().unwrap();

    let out = indy(
        home.path(),
        &url,
        &["--user", TEST_USER, "job", "status", "9999", "--status", "completed"],
    );
    assert!(!out.status.success());
    assert!(!String::from_utf8_lossy(&out.stderr).is_empty());

    db.teardown().await;
}
