//! Decision makers - whatever chooses the next command.
//!
//! The turn loop only knows the [`DecisionMaker`] trait. Two backends exist:
//! - [`AnthropicDecider`]: the Anthropic Messages API
//! - [`ScriptedDecider`]: a fixed list of commands, for replays and tests

mod anthropic;
mod scripted;

pub use anthropic::*;
pub use scripted::*;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::{Backend, DecisionConfig};

/// Instructions sent with every request.
pub const SYSTEM_PROMPT: &str = r#"You are playing a classic parser-based text adventure game such as Zork I.

ABOUT THE GAME:
The game is set in a fantasy world you explore by typing commands. Your goal is to explore, solve puzzles, collect treasures, and accumulate points. The game understands short verb-noun commands.

HOW TO PLAY:
- Use simple two-word commands like "GO NORTH", "TAKE LAMP", "OPEN DOOR"
- Common verbs: GO, TAKE, DROP, OPEN, CLOSE, READ, EXAMINE, ATTACK, INVENTORY
- Directions: NORTH, SOUTH, EAST, WEST, UP, DOWN, NORTHEAST, etc. (or N, S, E, W, U, D, NE, etc.)
- Type INVENTORY (or I) to see what you're carrying
- Type LOOK to see your current location description again
- Type EXAMINE [object] to look at something closely

GOALS:
1. Explore the world
2. Solve puzzles to access new areas
3. Find and collect treasures (usually worth points)
4. Avoid dangers and survive
5. Maximize your score

STRATEGY:
- Use the knowledge notes you are given: known exits, past failures, visited places
- Examine everything carefully
- Try obvious actions first (take items, open containers)
- Keep a light source; dark areas are deadly
- You can only carry a limited amount
- If stuck, examine objects more carefully or revisit areas

Output ONLY the next command you want to execute, nothing else. No explanations, just the command."#;

/// Errors from a decision backend.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("ANTHROPIC_API_KEY is not set")]
    NoApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("decision service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse decision response: {0}")]
    Parse(String),

    #[error("invalid decision backend configuration: {0}")]
    Config(String),

    /// The scripted backend has no commands left.
    #[error("script exhausted after {0} commands")]
    Exhausted(usize),
}

impl DecisionError {
    /// Rate limits, overload, server errors and network failures.
    pub fn is_transient(&self) -> bool {
        match self {
            DecisionError::Network(_) => true,
            DecisionError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504 | 529),
            _ => false,
        }
    }
}

/// One past turn: what the game said and what was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub narrative: String,
    pub command: String,
}

/// The last few exchanges, oldest first.
#[derive(Debug, Clone)]
pub struct ExchangeHistory {
    window: usize,
    exchanges: VecDeque<Exchange>,
}

impl ExchangeHistory {
    /// Create an empty history keeping at most `window` exchanges.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            exchanges: VecDeque::new(),
        }
    }

    /// Record one exchange, forgetting the oldest when full.
    pub fn push(&mut self, narrative: impl Into<String>, command: impl Into<String>) {
        self.exchanges.push_back(Exchange {
            narrative: narrative.into(),
            command: command.into(),
        });
        while self.exchanges.len() > self.window {
            self.exchanges.pop_front();
        }
    }

    /// Number of exchanges held.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether no exchange has been recorded.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Exchanges oldest first.
    pub fn to_vec(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }
}

/// Everything a decision maker sees for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    pub system: String,
    pub history: Vec<Exchange>,
    /// Rendered context bundle.
    pub context: String,
    /// What the game just said.
    pub narrative: String,
}

/// Chooses the next command.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    /// Return the raw next command. Callers sanitize it.
    async fn decide(&self, request: &DecisionRequest) -> Result<String, DecisionError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Ask `decider`, retrying once after `delay` if the first failure is
/// transient.
pub async fn decide_with_retry(
    decider: &dyn DecisionMaker,
    request: &DecisionRequest,
    delay: Duration,
) -> Result<String, DecisionError> {
    match decider.decide(request).await {
        Err(e) if e.is_transient() => {
            warn!(backend = decider.name(), error = %e, ?delay, "transient decision failure, retrying once");
            tokio::time::sleep(delay).await;
            decider.decide(request).await
        }
        other => other,
    }
}

/// Build the backend named by `config`.
pub async fn build_decider(config: &DecisionConfig) -> Result<Box<dyn DecisionMaker>, DecisionError> {
    match config.backend {
        Backend::Anthropic => {
            let decider = AnthropicDecider::from_env(config.model.clone(), config.max_tokens)?;
            Ok(Box::new(decider))
        }
        Backend::Script => {
            let path = config
                .script
                .as_deref()
                .ok_or_else(|| DecisionError::Config("the script backend needs a script file".into()))?;
            Ok(Box::new(ScriptedDecider::from_file(path).await?))
        }
    }
}

/// Reduce a decision to a single command line.
///
/// Takes the first non-empty line, drops a leading `>` and surrounding
/// quotes or backticks. An empty answer becomes `look`.
pub fn sanitize_command(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let line = line.trim_start_matches('>').trim();
    let line = line
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
        .trim();
    if line.is_empty() {
        "look".to_string()
    } else {
        line.to_string()
    }
}

/// Whether a command ends the run instead of going to the game.
pub fn is_quit(command: &str) -> bool {
    let command = command.trim();
    command.eq_ignore_ascii_case("quit") || command.eq_ignore_ascii_case("q")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        failures: Vec<DecisionError>,
    }

    #[async_trait]
    impl DecisionMaker for Flaky {
        async fn decide(&self, _request: &DecisionRequest) -> Result<String, DecisionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.get(call) {
                Some(DecisionError::Network(m)) => Err(DecisionError::Network(m.clone())),
                Some(DecisionError::Api { status, message }) => Err(DecisionError::Api {
                    status: *status,
                    message: message.clone(),
                }),
                Some(_) => Err(DecisionError::NoApiKey),
                None => Ok("north".to_string()),
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            system: SYSTEM_PROMPT.to_string(),
            history: Vec::new(),
            context: String::new(),
            narrative: "West of House".to_string(),
        }
    }

    #[test]
    fn test_sanitize_command() {
        assert_eq!(sanitize_command("north"), "north");
        assert_eq!(sanitize_command("  \n> OPEN MAILBOX\nbecause it is there"), "OPEN MAILBOX");
        assert_eq!(sanitize_command("\"take lamp\""), "take lamp");
        assert_eq!(sanitize_command("`inventory`"), "inventory");
        assert_eq!(sanitize_command("   "), "look");
        assert_eq!(sanitize_command("\"\""), "look");
    }

    #[test]
    fn test_is_quit() {
        assert!(is_quit("QUIT"));
        assert!(is_quit(" q "));
        assert!(!is_quit("quit game"));
        assert!(!is_quit("look"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DecisionError::Network("reset".into()).is_transient());
        assert!(DecisionError::Api { status: 429, message: String::new() }.is_transient());
        assert!(DecisionError::Api { status: 529, message: String::new() }.is_transient());
        assert!(!DecisionError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!DecisionError::NoApiKey.is_transient());
        assert!(!DecisionError::Exhausted(3).is_transient());
    }

    #[test]
    fn test_history_window() {
        let mut history = ExchangeHistory::new(2);
        history.push("a", "1");
        history.push("b", "2");
        history.push("c", "3");
        let kept: Vec<_> = history.to_vec().into_iter().map(|e| e.command).collect();
        assert_eq!(kept, vec!["2", "3"]);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once_on_transient() {
        let decider = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![DecisionError::Api { status: 503, message: "overloaded".into() }],
        };
        let command = decide_with_retry(&decider, &request(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(command, "north");
        assert_eq!(decider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_transient_failure_is_returned() {
        let decider = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![
                DecisionError::Network("reset".into()),
                DecisionError::Network("reset again".into()),
            ],
        };
        let err = decide_with_retry(&decider, &request(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Network(_)));
        assert_eq!(decider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let decider = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![DecisionError::Api { status: 401, message: "bad key".into() }],
        };
        let err = decide_with_retry(&decider, &request(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Api { status: 401, .. }));
        assert_eq!(decider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_script_backend() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("walkthrough.txt");
        std::fs::write(&script, "# opening\nopen mailbox\nread leaflet\n").unwrap();

        let config = DecisionConfig {
            backend: Backend::Script,
            script: Some(script),
            ..DecisionConfig::default()
        };
        let decider = build_decider(&config).await.unwrap();
        assert_eq!(decider.name(), "script");
        assert_eq!(decider.decide(&request()).await.unwrap(), "open mailbox");
    }

    #[tokio::test]
    async fn test_build_script_backend_without_file() {
        let config = DecisionConfig {
            backend: Backend::Script,
            ..DecisionConfig::default()
        };
        let err = build_decider(&config).await.err().unwrap();
        assert!(matches!(err, DecisionError::Config(_)));
    }
}
