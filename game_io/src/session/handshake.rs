//! Save/restore handshake as an explicit state machine.
//!
//! The interpreter drives saving and restoring through free-text prompts:
//! the command asks for a filename, saving may ask before overwriting, and
//! the result is a short confirmation or an error message. Each response is
//! classified into a [`PromptKind`] and looked up in [`TRANSITIONS`]; new
//! prompt variants only need a new pattern or a new table row.

use serde::{Deserialize, Serialize};

/// Which handshake is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeKind {
    Save,
    Restore,
}

impl HandshakeKind {
    /// The game command that opens this handshake.
    pub fn command(&self) -> &'static str {
        match self {
            HandshakeKind::Save => "save",
            HandshakeKind::Restore => "restore",
        }
    }

    /// Recognize a player command that opens a handshake by itself.
    pub fn from_command(command: &str) -> Option<Self> {
        match command.trim().to_lowercase().as_str() {
            "save" => Some(HandshakeKind::Save),
            "restore" | "load" => Some(HandshakeKind::Restore),
            _ => None,
        }
    }
}

/// Position in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    Idle,
    AwaitingFilenamePrompt,
    AwaitingResult,
    AwaitingOverwriteConfirm,
    /// The interpreter confirmed.
    Done,
    /// The interpreter reported an error or asked something unexpected.
    Failed,
    /// The exchange ended without an explicit confirmation either way.
    Unconfirmed,
}

impl HandshakeState {
    /// Whether no further input is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Done | HandshakeState::Failed | HandshakeState::Unconfirmed
        )
    }
}

/// Classification of one interpreter response during a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptKind {
    FilenamePrompt,
    OverwritePrompt,
    Confirmed,
    Refused,
    Other,
}

/// What to send next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The opening `save`/`restore` command.
    Command,
    /// The save file path.
    Filename,
    /// An affirmative answer to an overwrite question.
    Yes,
    /// Nothing more to send.
    Finish,
}

struct Transition {
    kind: Option<HandshakeKind>,
    from: HandshakeState,
    on: PromptKind,
    to: HandshakeState,
    reply: Reply,
}

const fn row(
    kind: Option<HandshakeKind>,
    from: HandshakeState,
    on: PromptKind,
    to: HandshakeState,
    reply: Reply,
) -> Transition {
    Transition {
        kind,
        from,
        on,
        to,
        reply,
    }
}

use HandshakeState as S;
use PromptKind as P;

/// Transition table. First matching row wins; `kind: None` applies to both.
/// A state/prompt pair without a row fails the handshake.
const TRANSITIONS: &[Transition] = &[
    row(None, S::AwaitingFilenamePrompt, P::FilenamePrompt, S::AwaitingResult, Reply::Filename),
    row(None, S::AwaitingFilenamePrompt, P::Confirmed, S::Done, Reply::Finish),
    row(None, S::AwaitingFilenamePrompt, P::Refused, S::Failed, Reply::Finish),
    row(Some(HandshakeKind::Save), S::AwaitingResult, P::OverwritePrompt, S::AwaitingOverwriteConfirm, Reply::Yes),
    row(None, S::AwaitingResult, P::Confirmed, S::Done, Reply::Finish),
    row(None, S::AwaitingResult, P::Refused, S::Failed, Reply::Finish),
    row(None, S::AwaitingResult, P::Other, S::Unconfirmed, Reply::Finish),
    row(Some(HandshakeKind::Save), S::AwaitingOverwriteConfirm, P::Confirmed, S::Done, Reply::Finish),
    row(Some(HandshakeKind::Save), S::AwaitingOverwriteConfirm, P::Refused, S::Failed, Reply::Finish),
    row(Some(HandshakeKind::Save), S::AwaitingOverwriteConfirm, P::Other, S::Unconfirmed, Reply::Finish),
];

/// Lower-case fragments per prompt kind, checked in order.
const PROMPT_PATTERNS: &[(PromptKind, &[&str])] = &[
    (
        PromptKind::OverwritePrompt,
        &["overwrite", "already exists", "replace it?"],
    ),
    (
        PromptKind::Refused,
        &[
            "failed",
            "not found",
            "can't open",
            "cannot open",
            "could not open",
            "no such file",
            "invalid save",
            "corrupt",
            "not a valid",
            "error",
        ],
    ),
    (
        PromptKind::FilenamePrompt,
        &["filename", "file name", "name of file", "save file:", "enter a file"],
    ),
    (PromptKind::Confirmed, &["ok.", "saved.", "restored.", "game saved", "game restored"]),
];

/// Classify a handshake response.
pub fn classify_prompt(text: &str) -> PromptKind {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() {
        return PromptKind::Other;
    }

    for (kind, patterns) in PROMPT_PATTERNS {
        if patterns.iter().any(|p| lower.contains(p)) {
            return *kind;
        }
    }

    if lower.lines().any(|l| l.trim() == "ok") {
        return PromptKind::Confirmed;
    }
    PromptKind::Other
}

/// A single running handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    kind: HandshakeKind,
    state: HandshakeState,
    history: Vec<(HandshakeState, PromptKind)>,
}

impl Handshake {
    /// Create an idle handshake.
    pub fn new(kind: HandshakeKind) -> Self {
        Self {
            kind,
            state: HandshakeState::Idle,
            history: Vec::new(),
        }
    }

    /// Pick up a handshake the player's own command already opened.
    pub fn opened_by_command(kind: HandshakeKind) -> Self {
        Self {
            kind,
            state: HandshakeState::AwaitingFilenamePrompt,
            history: Vec::new(),
        }
    }

    /// Start the exchange: the caller should send the opening command.
    pub fn begin(&mut self) -> Reply {
        if self.state == HandshakeState::Idle {
            self.state = HandshakeState::AwaitingFilenamePrompt;
            Reply::Command
        } else {
            Reply::Finish
        }
    }

    /// Feed one classified response, returning what to send next.
    pub fn step(&mut self, prompt: PromptKind) -> Reply {
        if self.state.is_terminal() {
            return Reply::Finish;
        }

        self.history.push((self.state, prompt));
        let found = TRANSITIONS.iter().find(|t| {
            t.from == self.state && t.on == prompt && t.kind.map_or(true, |k| k == self.kind)
        });

        match found {
            Some(t) => {
                self.state = t.to;
                t.reply
            }
            None => {
                self.state = HandshakeState::Failed;
                Reply::Finish
            }
        }
    }

    /// Whether this is a save or a restore.
    pub fn kind(&self) -> HandshakeKind {
        self.kind
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// States visited and the prompts seen in them, for diagnostics.
    pub fn history(&self) -> &[(HandshakeState, PromptKind)] {
        &self.history
    }
}
