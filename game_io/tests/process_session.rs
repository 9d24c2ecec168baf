//! Drives a real child process standing in for the interpreter.

#![cfg(unix)]

use game_io::{GameSession, SessionConfig, SessionError};
use std::time::Duration;

/// A shell "interpreter" that prints the game file as its banner and then
/// echoes each command back followed by a prompt.
fn echo_interpreter() -> SessionConfig {
    SessionConfig {
        interpreter: "sh".to_string(),
        interpreter_args: vec![
            "-c".to_string(),
            r#"cat "$1"; while read line; do echo "You said $line."; echo ">"; done"#.to_string(),
            "sh".to_string(),
        ],
        quiescence: Duration::from_millis(200),
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn test_spawned_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let game = dir.path().join("tiny.z5");
    std::fs::write(&game, "West of House    Score: 0    Moves: 0\nWelcome.\n>\n").unwrap();

    let (mut session, opening) = GameSession::start(&game, None, echo_interpreter())
        .await
        .unwrap();
    assert!(!opening.restored);
    assert!(opening.text.contains("Welcome."));
    assert_eq!(session.last_status().location, "West of House");

    let out = session.send_command("xyzzy").await.unwrap();
    assert_eq!(out.narrative, "You said xyzzy.");
    assert_eq!(out.status.location, "West of House");

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_save_file_starts_from_banner() {
    let dir = tempfile::tempdir().unwrap();
    let game = dir.path().join("tiny.z5");
    std::fs::write(&game, "Welcome.\n>\n").unwrap();
    let save = dir.path().join("saves").join("tiny_autosave.qzl");

    let (session, opening) = GameSession::start(&game, Some(&save), echo_interpreter())
        .await
        .unwrap();
    assert!(!opening.restored);
    assert_eq!(session.save_path(), Some(save.as_path()));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_interpreter_exiting_immediately_is_start_error() {
    let dir = tempfile::tempdir().unwrap();
    let game = dir.path().join("tiny.z5");
    std::fs::write(&game, "").unwrap();

    let config = SessionConfig {
        interpreter: "sh".to_string(),
        interpreter_args: vec!["-c".to_string(), "exit 3".to_string(), "sh".to_string()],
        ..SessionConfig::default()
    };

    let err = GameSession::start(&game, None, config).await.unwrap_err();
    assert!(matches!(err, SessionError::Start { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_missing_interpreter_is_start_error() {
    let dir = tempfile::tempdir().unwrap();
    let game = dir.path().join("tiny.z5");
    std::fs::write(&game, "").unwrap();

    let config = SessionConfig {
        interpreter: "definitely-not-an-interpreter-7f3a".to_string(),
        ..SessionConfig::default()
    };

    let err = GameSession::start(&game, None, config).await.unwrap_err();
    assert!(matches!(err, SessionError::Start { .. }));
}

#[tokio::test]
async fn test_missing_game_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = GameSession::start(&dir.path().join("absent.z5"), None, SessionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MissingGameFile(_)));
}

const INTERRUPTED_PLAYER: &str = "GAME_IO_INTERRUPTED_PLAYER";

/// Runs only inside the process group created by
/// `test_terminal_interrupt_spares_interpreter`: waits for SIGINT, then
/// checks the interpreter still answers.
#[tokio::test]
async fn test_interrupted_player() {
    let Ok(dir) = std::env::var(INTERRUPTED_PLAYER) else {
        return;
    };
    let game = std::path::Path::new(&dir).join("tiny.z5");
    std::fs::write(&game, "West of House    Score: 0    Moves: 0\nWelcome.\n>\n").unwrap();

    let mut interrupts =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).unwrap();
    let (mut session, _opening) = GameSession::start(&game, None, echo_interpreter())
        .await
        .unwrap();
    println!("player-ready");

    interrupts.recv().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let out = session.send_command("inventory").await.unwrap();
    assert_eq!(out.narrative, "You said inventory.");
    assert!(session.is_alive());
    session.close().await.unwrap();
    println!("player-survived");
}

#[test]
fn test_terminal_interrupt_spares_interpreter() {
    use std::io::{BufRead, BufReader, Read};
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let dir = tempfile::tempdir().unwrap();
    let mut player = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "test_interrupted_player", "--nocapture", "--test-threads=1"])
        .env(INTERRUPTED_PLAYER, dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .unwrap();

    let mut stdout = BufReader::new(player.stdout.take().unwrap());
    let mut line = String::new();
    loop {
        line.clear();
        let read = stdout.read_line(&mut line).unwrap();
        assert!(read > 0, "player exited before it was ready");
        if line.contains("player-ready") {
            break;
        }
    }

    // What a terminal does on Ctrl-C: signal the whole foreground group.
    let status = Command::new("sh")
        .args(["-c", &format!("kill -s INT -- -{}", player.id())])
        .status()
        .unwrap();
    assert!(status.success());

    let mut rest = String::new();
    stdout.read_to_string(&mut rest).unwrap();
    let exit = player.wait().unwrap();
    assert!(exit.success(), "player failed: {rest}");
    assert!(rest.contains("player-survived"), "output: {rest}");
}
