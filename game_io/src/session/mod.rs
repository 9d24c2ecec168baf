//! Session I/O manager - request/response cycling against an interpreter
//! that prints unframed, variable-latency text.
//!
//! A response is considered complete when either:
//! 1. the output ends with the configured prompt marker, or
//! 2. no new bytes arrive for the quiescence window.
//!
//! Independently, every read is bounded by a hard ceiling. Hitting the
//! ceiling with zero bytes is a [`SessionError::ReadTimeout`]; a second
//! consecutive one marks the session dead.

mod handshake;
mod paths;

pub use handshake::*;
pub use paths::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transcript::{self, StatusSnapshot};
use crate::{SessionConfig, SessionError};

const READ_CHUNK: usize = 4096;
const MAX_HANDSHAKE_STEPS: usize = 4;
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 2;

/// Unique identifier for one interpreter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one command/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutput {
    /// Latest known status. Carried over when the response had no status line.
    pub status: StatusSnapshot,

    /// Whether this response contained a status line.
    pub status_seen: bool,

    /// Narrative body with status line, echo and prompt removed.
    pub narrative: String,

    /// Raw response text.
    pub raw: String,
}

/// What the player sees first after launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opening {
    /// Banner text, or the post-restore room description.
    pub text: String,

    /// Whether a saved game was restored.
    pub restored: bool,
}

/// A running interpreter session.
///
/// Generic over the byte streams so the same logic drives a child process
/// or any in-memory transport.
pub struct GameSession<R = ChildStdout, W = ChildStdin> {
    id: SessionId,
    reader: R,
    writer: W,
    child: Option<Child>,
    config: SessionConfig,
    last_status: StatusSnapshot,
    save_path: Option<PathBuf>,
    consecutive_timeouts: u32,
    alive: bool,
}

impl<R, W> std::fmt::Debug for GameSession<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("alive", &self.alive)
            .field("last_status", &self.last_status)
            .field("save_path", &self.save_path)
            .finish_non_exhaustive()
    }
}

impl GameSession<ChildStdout, ChildStdin> {
    /// Launch the interpreter on `game_file` without reading anything yet.
    pub fn spawn(game_file: &Path, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        if !game_file.is_file() {
            return Err(SessionError::MissingGameFile(game_file.to_path_buf()));
        }

        let start_error = |reason: String| SessionError::Start {
            executable: config.interpreter.clone(),
            reason,
        };

        let mut command = Command::new(&config.interpreter);
        command
            .args(&config.interpreter_args)
            .arg(game_file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches the player, which
        // still needs a live interpreter to save before quitting.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(|e| start_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| start_error("stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| start_error("stdout was not captured".into()))?;

        let mut session = Self::from_streams(stdout, stdin, config);
        session.child = Some(child);
        info!(session = %session.id, game = %game_file.display(), "interpreter launched");
        Ok(session)
    }

    /// Launch, wait for the banner, and restore `save_file` if it exists.
    ///
    /// A failed restore is logged and the session continues from the banner.
    pub async fn start(
        game_file: &Path,
        save_file: Option<&Path>,
        config: SessionConfig,
    ) -> Result<(Self, Opening), SessionError> {
        let executable = config.interpreter.clone();
        let mut session = Self::spawn(game_file, config)?;

        let banner = match session.read_initial_output().await {
            Ok(text) => text,
            Err(e @ (SessionError::Dead(_) | SessionError::Io(_))) => {
                return Err(SessionError::Start {
                    executable,
                    reason: format!("exited immediately ({})", session.exit_reason(e.to_string())),
                });
            }
            Err(SessionError::ReadTimeout { waited }) => {
                warn!(session = %session.id, ?waited, "no banner from interpreter, continuing");
                String::new()
            }
            Err(e) => return Err(e),
        };

        let Some(save_file) = save_file else {
            return Ok((session, Opening { text: banner, restored: false }));
        };
        session.set_save_path(save_file);

        if resolve_save_file(save_file).is_none() {
            debug!(session = %session.id, path = %save_file.display(), "no save file to restore");
            return Ok((session, Opening { text: banner, restored: false }));
        }

        match session.restore(save_file).await {
            Ok(text) => Ok((session, Opening { text, restored: true })),
            Err(e) if e.is_save_state_error() => {
                warn!(session = %session.id, error = %e, "restore failed, starting from the beginning");
                Ok((session, Opening { text: banner, restored: false }))
            }
            Err(e) => Err(e),
        }
    }
}

impl<R, W> GameSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap existing streams. `reader` carries interpreter output.
    pub fn from_streams(reader: R, writer: W, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            reader,
            writer,
            child: None,
            config,
            last_status: StatusSnapshot::default(),
            save_path: None,
            consecutive_timeouts: 0,
            alive: true,
        }
    }

    /// Identifier used in this session's log fields.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Timeouts and interpreter settings in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Latest status snapshot seen in any response.
    pub fn last_status(&self) -> &StatusSnapshot {
        &self.last_status
    }

    /// False once the interpreter closed its output or stopped answering.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Path answered when a save or restore prompt appears mid-command.
    pub fn set_save_path(&mut self, path: impl Into<PathBuf>) {
        self.save_path = Some(path.into());
    }

    /// Path used to answer filename prompts, if set.
    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Drain output until the first stable pause after launch.
    pub async fn read_initial_output(&mut self) -> Result<String, SessionError> {
        let text = self.read_until_quiet(self.config.startup_timeout).await?;
        if let Some(status) = transcript::classify(&text, None).status {
            self.last_status = status;
        }
        debug!(session = %self.id, bytes = text.len(), "initial output read");
        Ok(text)
    }

    /// Send one command and read its response.
    pub async fn send_command(&mut self, command: &str) -> Result<TurnOutput, SessionError> {
        self.ensure_alive()?;
        debug!(session = %self.id, command, "sending command");
        self.write_line(command).await?;
        self.await_response(command).await
    }

    /// Read the response to an already-sent command.
    ///
    /// Used directly to retry after a [`SessionError::ReadTimeout`] without
    /// sending the command twice.
    pub async fn await_response(&mut self, command: &str) -> Result<TurnOutput, SessionError> {
        self.ensure_alive()?;
        let raw = match self.read_until_quiet(self.config.hard_timeout).await {
            Ok(raw) => {
                self.consecutive_timeouts = 0;
                raw
            }
            Err(SessionError::ReadTimeout { waited }) => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    self.alive = false;
                    return Err(SessionError::Dead(format!(
                        "{} consecutive reads timed out after {waited:?}",
                        self.consecutive_timeouts
                    )));
                }
                return Err(SessionError::ReadTimeout { waited });
            }
            Err(e) => return Err(e),
        };

        let raw = self.finish_embedded_handshake(command, raw).await?;
        Ok(self.absorb(command, raw))
    }

    /// Save the game to `path`. Best-effort: every failure is a
    /// [`SessionError::Save`].
    ///
    /// Returns the file actually written, which may carry an extra `.qzl`.
    pub async fn save(&mut self, path: &Path) -> Result<PathBuf, SessionError> {
        self.ensure_alive()
            .map_err(|e| SessionError::Save(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Save(format!("cannot create {}: {e}", parent.display())))?;
        }

        let mut handshake = Handshake::new(HandshakeKind::Save);
        let transcript = self
            .drive_handshake(&mut handshake, path, None)
            .await
            .map_err(|e| SessionError::Save(e.to_string()))?;

        match (handshake.state(), resolve_save_file(path)) {
            (HandshakeState::Done | HandshakeState::Unconfirmed, Some(file)) => {
                info!(session = %self.id, path = %file.display(), "game saved");
                Ok(file)
            }
            (HandshakeState::Done, None) => Err(SessionError::Save(format!(
                "interpreter confirmed but nothing was written to {}",
                path.display()
            ))),
            (HandshakeState::Failed, _) => Err(SessionError::Save(format!(
                "interpreter refused: {}",
                last_line(&transcript)
            ))),
            (state, None) => Err(SessionError::Save(format!(
                "no confirmation ({state:?}) and no file at {}",
                path.display()
            ))),
            (state, Some(_)) => Err(SessionError::Save(format!("handshake stopped in {state:?}"))),
        }
    }

    /// Restore the game from `path`, then `look` to describe the restored room.
    ///
    /// Returns the raw `look` response.
    pub async fn restore(&mut self, path: &Path) -> Result<String, SessionError> {
        self.ensure_alive()
            .map_err(|e| SessionError::Restore(e.to_string()))?;

        let file = resolve_save_file(path)
            .ok_or_else(|| SessionError::Restore(format!("no save file at {}", path.display())))?;

        let mut handshake = Handshake::new(HandshakeKind::Restore);
        let transcript = self
            .drive_handshake(&mut handshake, &file, None)
            .await
            .map_err(|e| SessionError::Restore(e.to_string()))?;

        match handshake.state() {
            HandshakeState::Done | HandshakeState::Unconfirmed => {
                if handshake.state() == HandshakeState::Unconfirmed {
                    warn!(session = %self.id, "restore not explicitly confirmed, assuming success");
                }
                let look = self
                    .send_command("look")
                    .await
                    .map_err(|e| SessionError::Restore(format!("look after restore: {e}")))?;
                info!(session = %self.id, path = %file.display(), location = %look.status.location, "game restored");
                Ok(look.raw)
            }
            _ => Err(SessionError::Restore(format!(
                "interpreter refused {}: {}",
                file.display(),
                last_line(&transcript)
            ))),
        }
    }

    /// Quit the game and release the interpreter.
    ///
    /// The quit sequence is bounded by the close timeout; a process that
    /// does not exit in time is killed.
    pub async fn close(mut self) -> Result<(), SessionError> {
        if self.alive {
            let limit = self.config.close_timeout * 2;
            let quit = async {
                self.write_line("quit").await?;
                let text = self
                    .read_until_quiet(self.config.close_timeout)
                    .await
                    .unwrap_or_default();
                if asks_confirmation(&text) {
                    self.write_line("y").await?;
                    let _ = self.read_until_quiet(self.config.close_timeout).await;
                }
                Ok::<_, SessionError>(())
            };
            match timeout(limit, quit).await {
                Ok(Ok(())) => debug!(session = %self.id, "quit sequence sent"),
                Ok(Err(e)) => debug!(session = %self.id, error = %e, "quit sequence failed"),
                Err(_) => warn!(session = %self.id, "quit sequence hung"),
            }
        }

        let _ = self.writer.shutdown().await;
        let GameSession {
            id,
            writer,
            child,
            config,
            ..
        } = self;
        // Closing stdin lets a well-behaved interpreter exit on EOF.
        drop(writer);

        if let Some(mut child) = child {
            match timeout(config.close_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!(session = %id, %status, "interpreter exited"),
                Ok(Err(e)) => warn!(session = %id, error = %e, "waiting for interpreter failed"),
                Err(_) => {
                    warn!(session = %id, "interpreter did not exit, killing it");
                    child.kill().await?;
                }
            }
        }

        info!(session = %id, "session closed");
        Ok(())
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.alive {
            Ok(())
        } else {
            Err(SessionError::Dead("interpreter is no longer running".into()))
        }
    }

    fn absorb(&mut self, command: &str, raw: String) -> TurnOutput {
        let transcript = transcript::classify(&raw, Some(command));
        let status_seen = transcript.status.is_some();
        if let Some(status) = transcript.status.clone() {
            self.last_status = status;
        }

        TurnOutput {
            status: self.last_status.clone(),
            status_seen,
            narrative: transcript.narrative(),
            raw,
        }
    }

    /// Answer a filename prompt raised by the player's own `save`/`restore`.
    async fn finish_embedded_handshake(
        &mut self,
        command: &str,
        raw: String,
    ) -> Result<String, SessionError> {
        let Some(kind) = HandshakeKind::from_command(command) else {
            return Ok(raw);
        };
        if classify_prompt(&raw) != PromptKind::FilenamePrompt {
            return Ok(raw);
        }
        let Some(path) = self.save_path.clone() else {
            warn!(session = %self.id, ?kind, "filename prompt but no save path configured");
            return Ok(raw);
        };

        let mut handshake = Handshake::opened_by_command(kind);
        let rest = self.drive_handshake(&mut handshake, &path, Some(&raw)).await?;
        debug!(session = %self.id, ?kind, state = ?handshake.state(), "embedded handshake finished");
        Ok(format!("{raw}\n{rest}"))
    }

    /// Run `handshake` to a terminal state, returning all text read.
    ///
    /// `already_read` is a response the caller consumed before the
    /// handshake took over.
    async fn drive_handshake(
        &mut self,
        handshake: &mut Handshake,
        path: &Path,
        already_read: Option<&str>,
    ) -> Result<String, SessionError> {
        let mut transcript = String::new();
        let mut reply = match already_read {
            Some(text) => handshake.step(classify_prompt(text)),
            None => handshake.begin(),
        };

        for _ in 0..MAX_HANDSHAKE_STEPS {
            let line = match reply {
                Reply::Command => handshake.kind().command().to_string(),
                Reply::Filename => path.display().to_string(),
                Reply::Yes => "yes".to_string(),
                Reply::Finish => break,
            };
            self.write_line(&line).await?;

            let text = match self.read_until_quiet(self.config.handshake_timeout).await {
                Ok(text) => text,
                Err(SessionError::ReadTimeout { .. }) => String::new(),
                Err(e) => return Err(e),
            };
            let prompt = classify_prompt(&text);
            debug!(session = %self.id, state = ?handshake.state(), ?prompt, "handshake step");
            transcript.push_str(&text);
            reply = handshake.step(prompt);
        }

        Ok(transcript)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        let mut bytes = line.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
        bytes.push(b'\n');

        let written = async {
            self.writer.write_all(&bytes).await?;
            self.writer.flush().await
        }
        .await;

        written.map_err(|e| {
            self.alive = false;
            SessionError::Dead(format!("write failed: {e}"))
        })
    }

    /// Read until the prompt marker, a quiet window, EOF, or `ceiling`.
    async fn read_until_quiet(&mut self, ceiling: Duration) -> Result<String, SessionError> {
        let deadline = Instant::now() + ceiling;
        let mut collected: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let now = Instant::now();
            if now >= deadline {
                if !collected.is_empty() {
                    warn!(session = %self.id, bytes = collected.len(), "output still arriving at read ceiling");
                }
                break;
            }

            let remaining = deadline - now;
            let window = if collected.is_empty() {
                remaining
            } else {
                self.config.quiescence.min(remaining)
            };

            match timeout(window, self.reader.read(&mut chunk)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    self.alive = false;
                    break;
                }
                Ok(Ok(n)) => {
                    collected.extend_from_slice(&chunk[..n]);
                    if self.at_prompt(&collected) {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.alive = false;
                    return Err(SessionError::Io(e));
                }
            }
        }

        if collected.is_empty() {
            if !self.alive {
                return Err(SessionError::Dead(self.exit_reason("output closed".into())));
            }
            return Err(SessionError::ReadTimeout { waited: ceiling });
        }

        Ok(String::from_utf8_lossy(&collected)
            .replace("\r\n", "\n")
            .replace('\r', ""))
    }

    fn at_prompt(&self, bytes: &[u8]) -> bool {
        let Some(marker) = self.config.prompt_marker.as_deref() else {
            return false;
        };
        let end = bytes
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        !marker.is_empty() && bytes[..end].ends_with(marker.as_bytes())
    }

    fn exit_reason(&mut self, fallback: String) -> String {
        self.child
            .as_mut()
            .and_then(|c| c.try_wait().ok().flatten())
            .map(|status| format!("interpreter exited with {status}"))
            .unwrap_or(fallback)
    }
}

fn asks_confirmation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["are you sure", "leave the game", "y is affirmative", "(y/n)", "really quit"]
        .iter()
        .any(|p| lower.contains(p))
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != ">")
        .last()
        .unwrap_or("no response")
        .to_string()
}
