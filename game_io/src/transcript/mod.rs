//! Transcript classification - splitting raw interpreter output into a
//! status line and narrative body.
//!
//! Interpreters of this genre print a fixed-width status line carrying the
//! current location on the left and `Score: <n>  Moves: <n>` on the right.
//! There is no other framing, so everything here is a best-effort match with
//! an explicit "no match" result: callers fall back to the previous snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<location>\S(?:.*?\S)?)\s+score:\s*(?P<score>-?\d+)\s+moves:\s*(?P<moves>\d+)\s*$",
    )
    .expect("status line pattern is valid")
});

/// Location, score and move count reported by one status line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub location: String,
    pub score: i32,
    pub moves: u32,
}

impl StatusSnapshot {
    /// Create a new snapshot.
    pub fn new(location: impl Into<String>, score: i32, moves: u32) -> Self {
        Self {
            location: location.into(),
            score,
            moves,
        }
    }

    /// Whether no status line has been seen yet.
    pub fn is_unknown(&self) -> bool {
        self.location.is_empty()
    }
}

impl std::fmt::Display for StatusSnapshot {
    /// Renders the canonical status line, which parses back to `self`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}    Score: {}    Moves: {}",
            self.location, self.score, self.moves
        )
    }
}

/// Parse a single line against the status-line convention.
///
/// Returns `None` for anything that is not a status line, including lines
/// whose counters overflow.
pub fn parse_status_line(line: &str) -> Option<StatusSnapshot> {
    let caps = STATUS_LINE.captures(line)?;
    let location = caps.name("location")?.as_str().trim();
    if location.starts_with('>') {
        return None;
    }

    Some(StatusSnapshot {
        location: location.to_string(),
        score: caps.name("score")?.as_str().parse().ok()?,
        moves: caps.name("moves")?.as_str().parse().ok()?,
    })
}

/// One response split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    /// The last status line in the response, if any.
    pub status: Option<StatusSnapshot>,

    /// Narrative lines with status lines, command echo and bare prompts removed.
    pub body: Vec<String>,
}

impl Transcript {
    /// Narrative body as a single block of text.
    pub fn narrative(&self) -> String {
        self.body.join("\n")
    }

    /// Render back into interpreter-shaped text (status line first).
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(status) = &self.status {
            out.push_str(&status.to_string());
            out.push('\n');
        }
        out.push_str(&self.narrative());
        out
    }
}

/// Split a raw response into status and narrative.
///
/// `echoed_command` is the command just sent; a leading line that merely
/// repeats it (optionally after a `>` prompt) is dropped before
/// classification. Every line is scanned because a status line can appear
/// mid-response after a room change; the last match wins.
pub fn classify(text: &str, echoed_command: Option<&str>) -> Transcript {
    let mut transcript = Transcript::default();
    let mut echo_pending = echoed_command
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    for raw in text.lines() {
        let line = raw.trim_end();

        if let Some(command) = &echo_pending {
            if line.trim().is_empty() {
                continue;
            }
            let candidate = line.trim_start().trim_start_matches('>').trim();
            let is_echo = candidate.to_lowercase() == *command;
            echo_pending = None;
            if is_echo {
                continue;
            }
        }

        if let Some(status) = parse_status_line(line) {
            transcript.status = Some(status);
            continue;
        }

        if is_bare_prompt(line) {
            continue;
        }

        transcript.body.push(line.trim().to_string());
    }

    trim_blank_edges(&mut transcript.body);
    collapse_blank_runs(&mut transcript.body);
    transcript
}

fn is_bare_prompt(line: &str) -> bool {
    line.trim() == ">"
}

fn trim_blank_edges(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.is_empty()).count();
    lines.drain(..leading);
}

fn collapse_blank_runs(lines: &mut Vec<String>) {
    lines.dedup_by(|a, b| a.is_empty() && b.is_empty());
}
