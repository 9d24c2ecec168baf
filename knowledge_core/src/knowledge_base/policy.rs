//! Observation policy - decides which narrative sentences become which kind
//! of knowledge.
//!
//! The store never interprets prose itself. It hands each turn to an
//! [`ObservationPolicy`] and applies whatever [`Observation`]s come back, so
//! the heuristics can be swapped without touching storage or persistence.
//! [`KeywordPolicy`] is the default: plain keyword and pattern matching that
//! is knowingly incomplete.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Direction;

/// One turn as seen by a policy.
#[derive(Debug, Clone, Copy)]
pub struct TurnObservation<'a> {
    /// The command that produced the narrative. Empty for opening text.
    pub command: &'a str,
    pub narrative: &'a str,
    /// Location after the turn, if known.
    pub location: Option<&'a str>,
    /// The turn moved the player into `location`.
    pub arrived: bool,
    /// Change in score caused by the turn.
    pub score_delta: i32,
}

/// A single piece of knowledge extracted from a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Cause and effect worth remembering.
    Fact(String),
    /// Something seen at the current location.
    LocationInsight(String),
    /// An exit of the current location mentioned in its description.
    Exit(Direction),
    /// A description of a named item.
    Item { name: String, insight: String },
    /// How a puzzle was solved.
    Puzzle { id: String, solution: String },
}

/// Replaceable classification rules.
pub trait ObservationPolicy: Send + Sync {
    fn observe(&self, turn: &TurnObservation<'_>) -> Vec<Observation>;
}

const FAILURE_MARKERS: &[&str] = &[
    "you can't",
    "you cannot",
    "can't go",
    "you don't",
    "you aren't",
    "you're not",
    "not possible",
    "is locked",
    "is closed",
    "won't budge",
    "too dark",
    "pitch black",
    "there is no",
    "there's no",
    "i don't know the word",
    "i don't understand",
    "you have no",
    "nothing happens",
    "isn't something",
    "you'd need",
];

const CHANGE_MARKERS: &[&str] = &[
    "opens",
    "is now open",
    "unlocked",
    "you open",
    "is now on",
    "is now off",
    "turns on",
    "lights up",
    "reveals",
    "suddenly",
    "appears",
    "breaks",
    "falls",
    "you hear",
];

/// Verbs whose successful use on an object usually solves something.
const PUZZLE_VERBS: &[&str] = &[
    "open", "unlock", "move", "push", "pull", "turn", "raise", "lower", "tie", "light", "wave",
    "dig", "pray", "ring",
];

const EXAMINE_PREFIXES: &[&str] = &["examine ", "x ", "look at ", "read ", "inspect ", "search "];

const ARTICLES: &[&str] = &["a", "an", "the", "some"];

static ITEM_HERE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:there (?:is|are) (?P<a>[^.,;:]+?) (?:here|lying here|on the ground)|(?P<b>(?:an?|the|some) [^.,;:]+?) (?:is|are) (?:here|lying here|on the ground)|on the [^.,;:]+? (?:is|are) (?P<c>[^.,;:]+?))\s*[.!]?$",
    )
    .expect("pattern is valid")
});

static REVEALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:reveals|contains:?)\s+(?P<item>[^.,;:]+)").expect("pattern is valid")
});

static EXIT_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:to the|leads?|leading|heading|going|runs?|winds?)\s+(?:\w+\s+){0,2}?(?P<dir>north|south|east|west|northeast|northwest|southeast|southwest|up|down)(?:wards?)?\b",
    )
    .expect("pattern is valid")
});

static TOOL_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<verb>\w+) (?P<object>.+?) (?:with|using|to|into|onto|in|on|from) .+$")
        .expect("pattern is valid")
});

/// Default keyword-matching policy.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    failure_markers: Vec<String>,
    change_markers: Vec<String>,
    /// Sentences of a room description kept as insights on arrival.
    max_arrival_insights: usize,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self {
            failure_markers: FAILURE_MARKERS.iter().map(|m| m.to_string()).collect(),
            change_markers: CHANGE_MARKERS.iter().map(|m| m.to_string()).collect(),
            max_arrival_insights: 3,
        }
    }
}

impl KeywordPolicy {
    /// Create a policy with the default markers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lowercase phrase that marks a sentence as a failed action.
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_markers.push(marker.into().to_lowercase());
        self
    }

    /// Add a lowercase phrase that marks a sentence as a change of state.
    pub fn with_change_marker(mut self, marker: impl Into<String>) -> Self {
        self.change_markers.push(marker.into().to_lowercase());
        self
    }

    /// Limit the insights taken from a room description on arrival.
    pub fn with_max_arrival_insights(mut self, max: usize) -> Self {
        self.max_arrival_insights = max;
        self
    }

    fn is_failure(&self, lower: &str) -> bool {
        self.failure_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    fn is_change(&self, lower: &str) -> bool {
        self.change_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

impl ObservationPolicy for KeywordPolicy {
    fn observe(&self, turn: &TurnObservation<'_>) -> Vec<Observation> {
        let sentences = split_sentences(turn.narrative, turn.location);
        let mut observations = Vec::new();
        if sentences.is_empty() {
            return observations;
        }

        let command = turn.command.trim();
        let lower_command = command.to_lowercase();
        let place = turn
            .location
            .map(|l| format!(" in {l}"))
            .unwrap_or_default();
        let describes_room = turn.arrived || matches!(lower_command.as_str(), "look" | "l");

        let mut failed = false;
        let mut first_change: Option<&str> = None;
        let mut arrival_insights = 0;

        for sentence in &sentences {
            let lower = sentence.to_lowercase();
            if self.is_failure(&lower) {
                failed = true;
                observations.push(Observation::Fact(describe(command, &place, sentence)));
                continue;
            }
            if !describes_room && self.is_change(&lower) {
                first_change.get_or_insert(sentence.as_str());
                observations.push(Observation::Fact(describe(command, &place, sentence)));
            }
            if describes_room {
                if arrival_insights < self.max_arrival_insights {
                    observations.push(Observation::LocationInsight(sentence.clone()));
                    arrival_insights += 1;
                }
                for captures in EXIT_HINT.captures_iter(sentence) {
                    if let Some(direction) = Direction::parse_word(&captures["dir"]) {
                        observations.push(Observation::Exit(direction));
                    }
                }
            }
            for name in items_in(sentence) {
                observations.push(Observation::Item {
                    name,
                    insight: format!("Seen{}", if place.is_empty() { " nearby" } else { place.as_str() }),
                });
            }
        }

        if failed {
            return observations;
        }

        if let Some(object) = examined_object(&lower_command) {
            let description: Vec<&str> = sentences.iter().take(2).map(String::as_str).collect();
            observations.push(Observation::Item {
                name: normalize_item_name(object),
                insight: description.join(" "),
            });
        }

        let verb = lower_command.split_whitespace().next().unwrap_or_default();
        let tool_use = TOOL_USE.is_match(&lower_command);
        let puzzle_verb = first_change.is_some() && PUZZLE_VERBS.contains(&verb);
        if turn.score_delta > 0 || tool_use || puzzle_verb {
            let outcome = first_change.unwrap_or(sentences[0].as_str());
            let mut solution = format!("\"{command}\"{place}: {outcome}");
            if turn.score_delta > 0 {
                solution.push_str(&format!(" (+{} points)", turn.score_delta));
            }
            let id = match TOOL_USE.captures(&lower_command) {
                Some(captures) => slug(&format!("{} {}", &captures["verb"], &captures["object"])),
                None => slug(&lower_command),
            };
            if !id.is_empty() {
                observations.push(Observation::Puzzle { id, solution });
            }
        }

        observations
    }
}

fn describe(command: &str, place: &str, sentence: &str) -> String {
    if command.is_empty() {
        format!("Observed{place}: {sentence}")
    } else {
        format!("\"{command}\"{place}: {sentence}")
    }
}

/// Split narrative into sentences.
///
/// Wrapped lines of one paragraph are joined first. A line that is exactly
/// the location name is a room title and is skipped.
pub fn split_sentences(text: &str, title: Option<&str>) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        let is_title = title.is_some_and(|t| line.eq_ignore_ascii_case(t.trim()));
        if line.is_empty() || is_title {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut sentences = Vec::new();
    for paragraph in paragraphs {
        let mut sentence = String::new();
        let mut chars = paragraph.chars().peekable();
        while let Some(c) = chars.next() {
            sentence.push(c);
            let at_break = chars.peek().map_or(true, |next| next.is_whitespace());
            if matches!(c, '.' | '!' | '?') && at_break {
                push_sentence(&mut sentences, &sentence);
                sentence.clear();
            }
        }
        push_sentence(&mut sentences, &sentence);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, sentence: &str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

fn items_in(sentence: &str) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(captures) = ITEM_HERE.captures(sentence) {
        if let Some(m) = captures
            .name("a")
            .or_else(|| captures.name("b"))
            .or_else(|| captures.name("c"))
        {
            names.push(normalize_item_name(m.as_str()));
        }
    }
    for captures in REVEALS.captures_iter(sentence) {
        names.push(normalize_item_name(&captures["item"]));
    }
    names.retain(|n| !n.is_empty());
    names
}

fn examined_object(lower_command: &str) -> Option<&str> {
    EXAMINE_PREFIXES.iter().find_map(|prefix| {
        lower_command
            .strip_prefix(prefix)
            .map(str::trim)
            .filter(|object| !object.is_empty())
    })
}

/// Lowercase an item name and drop a leading article.
pub fn normalize_item_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let mut words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() > 1 && ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}

/// A dash-separated identifier made of the alphanumeric words of `text`,
/// articles excluded.
pub fn slug(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty() && !ARTICLES.contains(word))
        .collect::<Vec<_>>()
        .join("-")
}
