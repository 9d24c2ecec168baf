//! Turn Orchestrator - the loop tying session, knowledge and decisions
//! together.
//!
//! Each turn:
//! 1. **Check**: stop on interrupt or when the turn budget is spent
//! 2. **Decide**: build context, ask the decision maker, sanitize its answer
//! 3. **Act**: send the command, retrying the read once on timeout
//! 4. **Learn**: update the knowledge store from the response
//! 5. **Keep**: autosave and persist knowledge on their cadences
//!
//! However the loop ends, shutdown persists knowledge, saves the game and
//! closes the session, each step independent of the others.

use game_io::{
    classify, resolve_save_file, GameSession, Opening, SessionError, SessionId, StatusSnapshot,
    TurnOutput,
};
use knowledge_core::{ContextBuilder, KnowledgeStore, PersistenceSchedule};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{ConfigError, PlayerConfig};
use crate::decision::{
    decide_with_retry, is_quit, sanitize_command, DecisionError, DecisionMaker, DecisionRequest,
    ExchangeHistory, SYSTEM_PROMPT,
};

/// Openings shorter than this usually mean the interpreter misbehaved.
const MIN_OPENING_CHARS: usize = 10;

/// Why a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TurnBudget,
    /// The decision maker answered `quit`.
    Quit,
    Interrupted,
    /// The interpreter closed its output.
    GameEnded,
    /// The scripted backend ran out of commands.
    ScriptExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::TurnBudget => "turn budget reached",
            StopReason::Quit => "decision maker quit",
            StopReason::Interrupted => "interrupted",
            StopReason::GameEnded => "game ended",
            StopReason::ScriptExhausted => "script finished",
        })
    }
}

/// Fatal run failures. Each names the contract that broke and where the
/// player was, so a later run can resume.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("process launch failed: {0}")]
    Launch(#[source] SessionError),

    #[error("game session failed at turn {turn} (last location: {location}): {source}")]
    Session {
        turn: u32,
        location: String,
        source: SessionError,
    },

    #[error("decision call failed at turn {turn} (last location: {location}): {source}")]
    Decision {
        turn: u32,
        location: String,
        source: DecisionError,
    },
}

/// Files a run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub save_file: PathBuf,
    pub knowledge_file: PathBuf,
}

impl RunPaths {
    /// Paths for `game_file`, honouring explicit settings in `config`.
    pub fn for_game(game_file: &Path, config: &PlayerConfig) -> Self {
        Self {
            save_file: config.save_path_for(game_file),
            knowledge_file: config.knowledge_path_for(game_file),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session: SessionId,
    pub turns_played: u32,
    pub stop: StopReason,
    pub last_status: StatusSnapshot,
    /// Save file on disk after shutdown, if any.
    pub save_file: Option<PathBuf>,
    pub knowledge_file: PathBuf,
    pub facts_known: usize,
    pub locations_visited: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Turns played: {} ({})", self.turns_played, self.stop)?;
        if self.last_status.is_unknown() {
            writeln!(f, "Last location: unknown")?;
        } else {
            writeln!(
                f,
                "Last location: {} (score {}, moves {})",
                self.last_status.location, self.last_status.score, self.last_status.moves
            )?;
        }
        if let Some(save) = &self.save_file {
            writeln!(f, "Save file: {}", save.display())?;
        }
        write!(
            f,
            "Knowledge file: {} ({} facts, {} locations)",
            self.knowledge_file.display(),
            self.facts_known,
            self.locations_visited
        )
    }
}

/// Drives one game from opening to shutdown.
pub struct Orchestrator {
    config: PlayerConfig,
    decider: Box<dyn DecisionMaker>,
    builder: ContextBuilder,
    interrupted: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Create an orchestrator, rejecting configuration it cannot honor.
    pub fn new(config: PlayerConfig, decider: Box<dyn DecisionMaker>) -> Result<Self, ConfigError> {
        config.validate()?;
        let builder = ContextBuilder::new(config.context.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Self {
            config,
            decider,
            builder,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between turns. Setting it stops the run cleanly.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Set the interrupt flag on Ctrl-C.
    pub fn listen_for_interrupt(&self) {
        let flag = self.interrupt_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current turn");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    /// Launch the interpreter for `game_file` and play.
    pub async fn run(&self, game_file: &Path) -> Result<RunSummary, RunError> {
        let paths = RunPaths::for_game(game_file, &self.config);
        let restore_from = self
            .config
            .restore
            .then_some(paths.save_file.as_path());

        let (mut session, opening) =
            GameSession::start(game_file, restore_from, self.config.session.clone())
                .await
                .map_err(RunError::Launch)?;
        session.set_save_path(paths.save_file.clone());
        self.run_session(session, opening, &paths).await
    }

    /// Play on an already started session.
    pub async fn run_session<R, W>(
        &self,
        session: GameSession<R, W>,
        opening: Opening,
        paths: &RunPaths,
    ) -> Result<RunSummary, RunError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = info_span!("run", session = %session.id(), backend = self.decider.name());
        self.play(session, opening, paths).instrument(span).await
    }

    async fn play<R, W>(
        &self,
        mut session: GameSession<R, W>,
        opening: Opening,
        paths: &RunPaths,
    ) -> Result<RunSummary, RunError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut store = KnowledgeStore::new();
        store.merge(&KnowledgeStore::load_or_default(&paths.knowledge_file).await);

        if opening.text.trim().chars().count() < MIN_OPENING_CHARS {
            warn!(bytes = opening.text.len(), "very little output from the game, continuing anyway");
        }
        let mut narrative = classify(&opening.text, opening.restored.then_some("look")).narrative();
        info!(restored = opening.restored, "{narrative}");
        store.update(session.last_status(), &narrative, "");

        let mut history = ExchangeHistory::new(self.config.decision.history_window);
        let autosave = PersistenceSchedule::every(if self.config.autosave {
            self.config.autosave_every
        } else {
            0
        });
        let persist = PersistenceSchedule::every(self.config.persist_every);
        let retry_delay = Duration::from_millis(self.config.decision.retry_delay_ms);
        let mut turns = 0u32;

        let stop = loop {
            if self.interrupted.load(Ordering::SeqCst) {
                info!(turn = turns, "interrupted");
                break StopReason::Interrupted;
            }
            if turns >= self.config.max_turns {
                break StopReason::TurnBudget;
            }

            let request = DecisionRequest {
                system: SYSTEM_PROMPT.to_string(),
                history: history.to_vec(),
                context: self.builder.build(&store, None, &narrative).to_prompt_string(),
                narrative: narrative.clone(),
            };
            let raw = match decide_with_retry(self.decider.as_ref(), &request, retry_delay).await {
                Ok(raw) => raw,
                Err(DecisionError::Exhausted(count)) => {
                    info!(commands = count, "script finished");
                    break StopReason::ScriptExhausted;
                }
                Err(source) => {
                    let location = last_location(&session, &store);
                    self.shutdown(session, &store, paths, turns).await;
                    return Err(RunError::Decision {
                        turn: turns,
                        location,
                        source,
                    });
                }
            };

            let command = sanitize_command(&raw);
            if is_quit(&command) {
                info!(turn = turns, "decision maker chose to quit");
                break StopReason::Quit;
            }

            turns += 1;
            info!(turn = turns, command = %command, "sending command");
            let output = match exchange(&mut session, &command).await {
                Ok(output) => output,
                Err(source) => {
                    let location = last_location(&session, &store);
                    self.shutdown(session, &store, paths, turns).await;
                    return Err(RunError::Session {
                        turn: turns,
                        location,
                        source,
                    });
                }
            };

            info!(
                turn = turns,
                location = %output.status.location,
                score = output.status.score,
                moves = output.status.moves,
                "{}",
                output.narrative
            );
            let update = store.update(&output.status, &output.narrative, &command);
            if let Some((from, direction)) = &update.new_exit {
                debug!(from = %from, direction = %direction, "new exit");
            }
            let previous = std::mem::replace(&mut narrative, output.narrative);
            history.push(previous, command);

            if autosave.should_persist(turns) {
                if let Err(e) = session.save(&paths.save_file).await {
                    warn!(error = %e, "autosave failed");
                }
            }
            if persist.should_persist(turns) {
                if let Err(e) = store.persist(&paths.knowledge_file).await {
                    warn!(error = %e, "knowledge persistence failed");
                }
            }
            if !session.is_alive() {
                info!(turn = turns, "interpreter closed its output");
                break StopReason::GameEnded;
            }
        };

        let session_id = session.id();
        let last_status = session.last_status().clone();
        let save_file = self.shutdown(session, &store, paths, turns).await;
        Ok(RunSummary {
            session: session_id,
            turns_played: turns,
            stop,
            last_status,
            save_file,
            knowledge_file: paths.knowledge_file.clone(),
            facts_known: store.facts().len(),
            locations_visited: store.visited_locations().len(),
        })
    }

    /// Persist knowledge, save the game, close the session. Every step is
    /// attempted whatever happened before it.
    ///
    /// Returns the save file on disk afterwards.
    async fn shutdown<R, W>(
        &self,
        mut session: GameSession<R, W>,
        store: &KnowledgeStore,
        paths: &RunPaths,
        turns: u32,
    ) -> Option<PathBuf>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match store.persist(&paths.knowledge_file).await {
            Ok(()) => info!(path = %paths.knowledge_file.display(), "knowledge saved"),
            Err(e) => warn!(error = %e, "could not persist knowledge"),
        }

        if self.config.autosave && turns > 0 {
            if let Err(e) = session.save(&paths.save_file).await {
                warn!(error = %e, "final save failed");
            }
        }

        if let Err(e) = session.close().await {
            warn!(error = %e, "could not close the session cleanly");
        }

        resolve_save_file(&paths.save_file)
    }
}

/// Send a command, giving a timed-out read one more chance.
async fn exchange<R, W>(
    session: &mut GameSession<R, W>,
    command: &str,
) -> Result<TurnOutput, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match session.send_command(command).await {
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, command, "no response yet, waiting once more");
            session.await_response(command).await
        }
        other => other,
    }
}

fn last_location<R, W>(session: &GameSession<R, W>, store: &KnowledgeStore) -> String
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let status = session.last_status();
    if !status.is_unknown() {
        return status.location.clone();
    }
    store.current_location().unwrap_or("unknown").to_string()
}
