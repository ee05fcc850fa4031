use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli(data_dir: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("cipherstudio-cli")?;
    cmd.arg("--data-dir").arg(data_dir).env_remove("CIPHERSTUDIO_LOG");
    Ok(cmd)
}

#[test]
fn first_run_creates_the_default_project() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* ").and(predicate::str::contains("Untitled Project")));

    let stored = fs::read_to_string(data.join("cipher-studio-projects.json"))?;
    let projects: serde_json::Value = serde_json::from_str(&stored)?;
    assert_eq!(projects.as_array().map(Vec::len), Some(1));
    assert_eq!(projects[0]["entryPoint"], "App.tsx");
    Ok(())
}

#[test]
fn file_edits_persist_between_invocations() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?
        .args(["file", "mkdir", "styles"])
        .assert()
        .success()
        .stdout("styles\n");
    cli(&data)?
        .args(["file", "add", "main.css", "--parent", "styles", "--content", "body { margin: 0; }"])
        .assert()
        .success()
        .stdout("styles/main.css\n");
    cli(&data)?
        .args(["file", "rename", "styles/main.css", "site.css"])
        .assert()
        .success()
        .stdout("styles/site.css\n");

    cli(&data)?
        .args(["file", "tree"])
        .assert()
        .success()
        .stdout("Untitled Project\n  App.tsx\n  styles/\n    site.css\n");
    cli(&data)?
        .args(["file", "cat", "styles/site.css"])
        .assert()
        .success()
        .stdout("body { margin: 0; }");

    cli(&data)?
        .args(["file", "rm", "styles"])
        .assert()
        .success()
        .stdout("Removed 2 node(s)\n");
    cli(&data)?
        .args(["file", "cat", "styles/site.css"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no file or folder at 'styles/site.css'"));
    Ok(())
}

#[test]
fn write_reads_content_from_stdin() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?
        .args(["file", "write", "App.tsx"])
        .write_stdin("export default () => <p>hi</p>;")
        .assert()
        .success();
    cli(&data)?
        .args(["file", "cat", "App.tsx"])
        .assert()
        .success()
        .stdout("export default () => <p>hi</p>;");
    Ok(())
}

#[test]
fn theme_toggle_is_remembered() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?.args(["theme", "get"]).assert().success().stdout("light\n");
    cli(&data)?.args(["theme", "toggle"]).assert().success().stdout("dark\n");
    cli(&data)?.args(["theme", "get"]).assert().success().stdout("dark\n");
    cli(&data)?
        .args(["theme", "set", "light"])
        .assert()
        .success()
        .stdout("light\n");
    Ok(())
}

#[test]
fn preview_uses_the_stored_theme() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");
    let output = dir.path().join("out").join("preview.html");

    cli(&data)?.args(["theme", "set", "dark"]).assert().success();
    cli(&data)?
        .args(["preview", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("preview.html"));

    let html = fs::read_to_string(&output)?;
    assert!(html.contains(r#"<html class="dark">"#));
    assert!(html.contains("window.App = "));

    cli(&data)?
        .args(["preview", "--data-url"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("data:text/html;base64,"));
    Ok(())
}

#[test]
fn preview_without_files_reports_missing_entry() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?.args(["file", "rm", "App.tsx"]).assert().success();
    cli(&data)?
        .arg("preview")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No file to preview"));
    Ok(())
}

#[test]
fn saved_snapshot_can_be_imported_elsewhere() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let snapshots = dir.path().join("snapshots");
    fs::create_dir_all(&snapshots)?;

    cli(&first)?
        .args(["file", "add", "notes.md", "--content", "hello"])
        .assert()
        .success();
    cli(&first)?
        .args(["save", "--dir"])
        .arg(&snapshots)
        .assert()
        .success()
        .stdout(predicate::str::contains("Untitled-Project-saved-"));

    let snapshot = fs::read_dir(&snapshots)?
        .next()
        .ok_or("snapshot missing")??
        .path();
    cli(&second)?
        .arg("import")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 'Untitled Project'"));
    cli(&second)?
        .args(["file", "cat", "notes.md"])
        .assert()
        .success()
        .stdout("hello");
    Ok(())
}

#[test]
fn projects_can_be_switched_and_deleted() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    let listing = cli(&data)?.args(["project", "list"]).output()?;
    let first_id = String::from_utf8(listing.stdout)?
        .trim_start_matches(['*', ' '])
        .split('\t')
        .next()
        .ok_or("missing id")?
        .to_string();

    cli(&data)?.args(["project", "new"]).assert().success();
    let listing = cli(&data)?.args(["project", "list"]).output()?;
    let text = String::from_utf8(listing.stdout)?;
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().nth(1).is_some_and(|line| line.starts_with('*')));

    cli(&data)?
        .args(["project", "open", &first_id])
        .assert()
        .success();
    cli(&data)?
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("* {first_id}")));

    cli(&data)?
        .args(["project", "delete", &first_id])
        .assert()
        .success();
    cli(&data)?
        .args(["project", "open", &first_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn auth_url_requires_a_configured_client() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");

    cli(&data)?
        .env_remove("CIPHERSTUDIO_GOOGLE_CLIENT_ID")
        .args(["auth", "url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Google OAuth is not configured"));
    cli(&data)?
        .env("CIPHERSTUDIO_GOOGLE_CLIENT_ID", "123-abc.apps.googleusercontent.com")
        .args(["auth", "url"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    cli(&data)?
        .args(["auth", "whoami"])
        .assert()
        .success()
        .stdout("Not signed in\n");
    Ok(())
}
