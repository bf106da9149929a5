use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

#[test]
fn check_lists_bundled_syncs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync table OK: 12 syncs"))
        .stdout(predicate::str::contains("WhoAmIResponse"));

    Ok(())
}

#[test]
fn check_json_reports_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("bodymap.yml"),
        "engine:\n  max_iterations: 8\n  dispatch: sequential\n",
    )?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args(["check", "--json"])
        .assert()
        .success();

    let summary: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(summary["syncs"], 12);
    assert_eq!(summary["max_iterations"], 8);
    assert_eq!(summary["dispatch"], "sequential");

    Ok(())
}

#[test]
fn request_register_returns_user() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args([
            "request",
            "/auth/register",
            "-f",
            "username=alice",
            "-f",
            "password=pw",
            "--json",
        ])
        .assert()
        .success();

    let served: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(served["request"], "r1");
    assert_eq!(served["response"]["user"], "u1");
    assert_eq!(served["occurrences"], 3);

    Ok(())
}

#[test]
fn request_without_route_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args(["request", "/maps/new"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("(no response)"))
        .stderr(predicate::str::contains("no sync responded"));

    Ok(())
}

#[test]
fn script_runs_full_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("session.yml");
    fs::write(
        &script,
        r#"
- { path: /auth/register, username: alice, password: pw }
- { path: /auth/login, username: alice, password: pw }
- { path: /auth/whoami, session: $session }
- { path: /auth/logout, session: $session }
- { path: /auth/whoami, session: $session }
"#,
    )?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args(["script", "session.yml", "--json", "--trace"])
        .assert()
        .success();

    let served: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let steps = served.as_array().ok_or("expected a list")?;
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[1]["response"]["session"], "s1");
    assert_eq!(steps[2]["response"]["username"], "alice");
    assert_eq!(steps[3]["response"]["status"], "logged out");
    assert_eq!(steps[4]["response"]["error"], "not logged in");
    assert!(steps[1]["trace"]
        .as_str()
        .is_some_and(|t| t.contains("Sessioning.start")));

    Ok(())
}

#[test]
fn missing_sync_table_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("bodymap.yml"), "syncs: nowhere.yml\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load sync table"));

    Ok(())
}

#[test]
fn invalid_sync_table_fails_check() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("bodymap.yml"), "syncs: broken.yml\n")?;
    fs::write(
        dir.path().join("broken.yml"),
        r#"
syncs:
  - id: Dangling
    when:
      - action: Requesting.request
        output: { request: "?request" }
    then:
      - action: Requesting.respond
        input: { request: "?request", user: "?user" }
"#,
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sync table failed validation"));

    Ok(())
}

#[test]
fn iteration_override_aborts_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("bodymap.yml"), "syncs: loop.yml\n")?;
    fs::write(
        dir.path().join("loop.yml"),
        r#"
syncs:
  - id: Echo
    when:
      - action: Requesting.request
        input: { path: /loop }
        output: { request: "?request" }
    then:
      - action: Requesting.request
        input: { path: /loop }
"#,
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args(["--max-iterations", "3", "request", "/loop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Request to /loop failed"));

    Ok(())
}

#[test]
fn zero_iterations_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("bodymap")?
        .current_dir(dir.path())
        .args(["--max-iterations", "0", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_iterations"));

    Ok(())
}
