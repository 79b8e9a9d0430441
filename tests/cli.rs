//! Tests that drive the compiled `udaplay` binary. None of them needs an
//! embedding model or network access.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn udaplay_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("udaplay");
    path
}

fn command(root: &Path) -> Command {
    let mut cmd = Command::new(udaplay_binary());
    cmd.current_dir(root)
        .env_remove("OPENAI_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn run(root: &Path, args: &[&str]) -> (String, String, bool) {
    let output = command(root)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run udaplay binary: {}", e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_help_lists_flags() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run(tmp.path(), &["--help"]);
    assert!(success);
    for flag in [
        "--config",
        "--data",
        "--persist-path",
        "--top-k",
        "--rebuild",
        "--session-log-dir",
        "--interactive",
    ] {
        assert!(stdout.contains(flag), "missing {} in help:\n{}", flag, stdout);
    }
}

#[test]
fn test_question_required_without_interactive() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &[]);
    assert!(!success);
    assert!(stderr.contains("question"), "stderr: {}", stderr);
}

#[test]
fn test_top_k_must_be_positive() {
    let tmp = TempDir::new().unwrap();
    let (_, _, success) = run(tmp.path(), &["--top-k", "0", "q"]);
    assert!(!success);
}

#[test]
fn test_question_conflicts_with_interactive() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &["--interactive", "Who made Tetris?"]);
    assert!(!success);
    assert!(stderr.contains("cannot be used with"), "stderr: {}", stderr);
}

#[test]
fn test_explicit_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run(tmp.path(), &["--config", "nope.toml", "q"]);
    assert!(!success);
    assert!(stderr.contains("nope.toml"), "stderr: {}", stderr);
}

#[test]
fn test_rebuild_rejects_malformed_data() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("games.json"),
        r#"[{"id": "001", "title": "No description"}]"#,
    )
    .unwrap();

    let (_, stderr, success) = run(
        tmp.path(),
        &[
            "--rebuild",
            "--data",
            "games.json",
            "--persist-path",
            "index/games.sqlite",
            "--session-log-dir",
            "logs",
            "Who made it?",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("game record #0"), "stderr: {}", stderr);

    // the session is still recorded
    let history = fs::read_to_string(tmp.path().join("logs").join("sessions.jsonl")).unwrap();
    assert_eq!(history.lines().count(), 1);
}

#[test]
fn test_interactive_quit_writes_session_log() {
    let tmp = TempDir::new().unwrap();
    let mut child = command(tmp.path())
        .args([
            "--interactive",
            "--persist-path",
            "index/games.sqlite",
            "--session-log-dir",
            "logs",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"\nQUIT\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("udaplay> "));
    assert!(stdout.contains("Ending session after 0 turns."));

    let logs = tmp.path().join("logs");
    let history = fs::read_to_string(logs.join("sessions.jsonl")).unwrap();
    let line: serde_json::Value = serde_json::from_str(history.trim()).unwrap();
    assert_eq!(line["turn_count"], 0);

    let session_file = logs.join(line["file"].as_str().unwrap());
    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(session_file).unwrap()).unwrap();
    assert_eq!(record["session_id"], line["session_id"]);
    assert_eq!(record["events"].as_array().unwrap().len(), 0);
}

#[test]
fn test_interactive_eof_ends_session() {
    let tmp = TempDir::new().unwrap();
    let output = command(tmp.path())
        .args([
            "--interactive",
            "--persist-path",
            "index/games.sqlite",
            "--session-log-dir",
            "logs",
        ])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(tmp.path().join("logs").join("sessions.jsonl").exists());
}

#[cfg(unix)]
#[test]
fn test_interrupt_ends_interactive_session_while_stdin_is_open() {
    let tmp = TempDir::new().unwrap();
    let mut child = command(tmp.path())
        .args([
            "--interactive",
            "--persist-path",
            "index/games.sqlite",
            "--session-log-dir",
            "logs",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Held open until the child has exited.
    let stdin = child.stdin.take().unwrap();
    let mut stdout = child.stdout.take().unwrap();

    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !String::from_utf8_lossy(&seen).contains("udaplay> ") {
        let n = stdout.read(&mut buf).unwrap();
        assert!(n > 0, "udaplay exited before prompting");
        seen.extend_from_slice(&buf[..n]);
    }
    // let the Ctrl-C listener register
    std::thread::sleep(Duration::from_millis(500));

    let kill = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("udaplay still running 10s after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    drop(stdin);

    assert!(status.success(), "exit status: {:?}", status);
    stdout.read_to_end(&mut seen).unwrap();
    assert!(String::from_utf8_lossy(&seen).contains("Ending session after 0 turns."));

    let history = fs::read_to_string(tmp.path().join("logs").join("sessions.jsonl")).unwrap();
    assert_eq!(history.lines().count(), 1);
}
