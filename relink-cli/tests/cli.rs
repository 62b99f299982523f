use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const LIBRARY: &str = r"package com.example.lib;

public class LibraryClass {
    public static String greet() {
        return null;
    }
}
";

const CONSUMER: &str = r"package com.example.app;

import com.example.lib.LibraryClass;

public class App {
    public void run() {
        LibraryClass.greet();
    }
}
";

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn relink(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("relink").unwrap();
    cmd.current_dir(dir)
        .env_remove("RELINK_DB")
        .env_remove("RELINK_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    write(
        &tmp.path().join("library"),
        "com/example/lib/LibraryClass.java",
        LIBRARY,
    );
    write(
        &tmp.path().join("consumer"),
        "com/example/app/App.java",
        CONSUMER,
    );
    tmp
}

#[test]
fn help_lists_commands() {
    let tmp = tempfile::tempdir().unwrap();
    relink(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("stats"));
}

#[test]
fn consumer_then_library_reconciles() {
    let tmp = workspace();

    relink(tmp.path())
        .args(["ingest", "consumer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingested consumer"))
        .stdout(predicate::str::contains("1 recorded"));

    relink(tmp.path())
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 pending call(s)"))
        .stdout(predicate::str::contains(
            "com.example.lib.LibraryClass.LibraryClass.greet",
        ));

    relink(tmp.path())
        .args(["ingest", "library"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 reconciled"));

    relink(tmp.path())
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending calls"));

    let output = relink(tmp.path())
        .args(["stats", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(stats["relationships_by_type"]["CALLS"], 1);
    assert_eq!(stats["projects"], 2);
    assert_eq!(stats["pending_calls"], 0);
}

#[test]
fn ingest_json_reports_cross_project_edges() {
    let tmp = workspace();
    let output = relink(tmp.path())
        .args(["ingest", "--json", "library", "consumer"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summaries: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summaries[0]["project"], "library");
    assert_eq!(summaries[1]["project"], "consumer");
    assert_eq!(summaries[1]["cross_project_edges"], 1);
    assert_eq!(summaries[1]["pending_recorded"], 0);
}

#[test]
fn reconcile_reports_retained_calls() {
    let tmp = workspace();
    relink(tmp.path())
        .args(["ingest", "consumer"])
        .assert()
        .success();
    relink(tmp.path())
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciled 0 of 1 pending calls"));
}

#[test]
fn pending_unparsed_lists_the_failed_callers() {
    use relink_core::pending::PendingCallStore;
    use relink_core::store::SqliteBackend;
    use relink_core::types::{NodeLabel, PendingCall};

    let tmp = workspace();
    relink(tmp.path())
        .args(["ingest", "consumer"])
        .assert()
        .success();

    let broken = PendingCall {
        caller_type: NodeLabel::Method,
        caller_qn: "consumer.com.example.app.Broken.Broken.run".into(),
        module_qn: "consumer.com.example.app.Broken".into(),
        project_name: "consumer".into(),
        call_name: "LibraryClass.greet".into(),
        candidates: vec!["com.example.lib.LibraryClass.LibraryClass.greet".into()],
        language: "java".into(),
        caller_was_parsed: false,
    };
    let backend = SqliteBackend::open(&tmp.path().join(".relink/relink.db")).unwrap();
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(PendingCallStore::new(&backend).record(&broken))
        .unwrap();
    drop(backend);

    relink(tmp.path())
        .args(["pending", "--unparsed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 caller(s) failed to parse:"))
        .stdout(predicate::str::contains(
            "consumer.com.example.app.Broken.Broken.run",
        ))
        .stdout(predicate::str::contains("1 pending call(s)"));
}

#[test]
fn explicit_db_path_is_used() {
    let tmp = workspace();
    relink(tmp.path())
        .args(["ingest", "library", "--db", "graph.db"])
        .assert()
        .success();
    assert!(tmp.path().join("graph.db").exists());
    assert!(!tmp.path().join(".relink/relink.db").exists());
}

#[test]
fn stats_without_database_exits_3() {
    let tmp = tempfile::tempdir().unwrap();
    relink(tmp.path())
        .arg("stats")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn missing_project_exits_3() {
    let tmp = tempfile::tempdir().unwrap();
    relink(tmp.path())
        .args(["ingest", "does-not-exist"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cannot resolve path"));
}

#[test]
fn invalid_config_exits_2() {
    let tmp = workspace();
    write(
        tmp.path(),
        ".relink/config.toml",
        "[resolution]\nroot_segments = 0\n",
    );
    relink(tmp.path())
        .args(["ingest", "library"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config"));
}
