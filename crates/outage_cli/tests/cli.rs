use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn outagectl(config: &Path, db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_outagectl"))
        .arg("--config")
        .arg(config)
        .arg("--db")
        .arg(db)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run outagectl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn create_requires_a_default_duration() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    std::fs::write(&config, "default_title = \"Upgrade\"\n").unwrap();

    let output = outagectl(&config, &tmp.path().join("db.sqlite"), &["create", "--start", "600"]);
    assert_eq!(output.status.code(), Some(9));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[PLUGIN_CONFIGURATION]"));
}

#[test]
fn unknown_config_keys_are_rejected() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    std::fs::write(&config, "default_duraton = 600\n").unwrap();

    let output = outagectl(&config, &tmp.path().join("db.sqlite"), &["list"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn create_list_and_finish() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    let page = tmp.path().join("www").join("maintenance.html");
    std::fs::write(
        &config,
        format!(
            "default_duration = 3600\nstatic_page_path = {:?}\n",
            page.display().to_string()
        ),
    )
    .unwrap();
    let db = tmp.path().join("db.sqlite");

    let created = outagectl(
        &config,
        &db,
        &["create", "--start", "600", "--warn", "60", "--title", "Nightly", "--only-id"],
    );
    assert!(created.status.success(), "{created:?}");
    let id = stdout(&created);
    assert_eq!(id, "1");
    assert!(page.exists());

    let listed = outagectl(&config, &db, &["list", "--filter", "unended"]);
    assert!(listed.status.success());
    let text = stdout(&listed);
    assert!(text.contains("#1"));
    assert!(text.contains("WAITING"));
    assert!(text.contains("Nightly"));

    let finished = outagectl(&config, &db, &["finish", "--id", "1"]);
    assert!(finished.status.success());
    assert_eq!(stdout(&finished), "Outage #1 has not started.");

    let nothing = outagectl(&config, &db, &["finish"]);
    assert_eq!(nothing.status.code(), Some(6));
}

#[test]
fn wait_on_missing_outage_exits_with_not_found() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    std::fs::write(&config, "default_duration = 60\n").unwrap();

    let output = outagectl(&config, &tmp.path().join("db.sqlite"), &["wait", "--id", "5"]);
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn create_accepts_key_value_options() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    std::fs::write(&config, "default_duration = 600\n").unwrap();
    let db = tmp.path().join("db.sqlite");

    let created = outagectl(
        &config,
        &db,
        &[
            "create",
            "--set",
            "start=600",
            "--set",
            "warn=60",
            "--set",
            "title=Nightly",
            "--set",
            "only_id",
        ],
    );
    assert!(created.status.success(), "{created:?}");
    assert_eq!(stdout(&created), "1");

    let unknown = outagectl(&config, &db, &["create", "--start", "60", "--set", "colour=red"]);
    assert_eq!(unknown.status.code(), Some(3));
}

#[test]
fn create_rejects_a_start_beyond_the_clock_range() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("outage.toml");
    std::fs::write(&config, "default_duration = 600\n").unwrap();

    let output = outagectl(
        &config,
        &tmp.path().join("db.sqlite"),
        &["create", "--start", "9223372036854775807"],
    );
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[INVALID_ARGUMENT]"));
}
