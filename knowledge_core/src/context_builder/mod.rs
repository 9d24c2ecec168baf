//! Context Builder - selects a bounded slice of knowledge for each decision.
//!
//! Sections are gathered in priority order:
//! 1. **Current location**: known exits and insights
//! 2. **Recent facts**: newest first, bounded count
//! 3. **Visited locations**: compact list of names
//! 4. **Items mentioned**: insights for items named in the latest narrative
//!
//! When the rendered bundle exceeds the size limit, whole sections are
//! dropped from the bottom first. Only when a single section remains are its
//! entries dropped, last entry first. Entries are never cut.

mod section;

pub use section::*;

use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;
use crate::knowledge_base::KnowledgeStore;

/// Text used when nothing has been learned yet.
pub const COLD_START_TEXT: &str = "No knowledge recorded yet.";

/// Text used when knowledge exists but none of it fits or applies.
pub const NOTHING_RELEVANT_TEXT: &str = "Nothing recorded applies here yet.";

/// Smallest size limit a builder accepts: the longer placeholder and its
/// newline.
pub const MIN_CONTEXT_CHARS: usize = NOTHING_RELEVANT_TEXT.len() + 1;

/// Limits for the context bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Maximum rendered size in characters.
    pub max_chars: usize,

    /// Maximum number of recent facts.
    pub max_facts: usize,

    /// Maximum number of visited location names.
    pub max_visited: usize,

    /// Maximum number of insights for the current location.
    pub max_insights: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            max_facts: 8,
            max_visited: 25,
            max_insights: 6,
        }
    }
}

impl ContextConfig {
    /// Reject size limits that cannot hold even the placeholder text.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.max_chars < MIN_CONTEXT_CHARS {
            return Err(KnowledgeError::InvalidConfig(format!(
                "max_chars must be at least {MIN_CONTEXT_CHARS}, got {}",
                self.max_chars
            )));
        }
        Ok(())
    }
}

/// The selected context for one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBundle {
    pub sections: Vec<ContextSection>,
    /// Titles of sections dropped to fit the size limit.
    pub dropped: Vec<String>,
    /// Entries removed from the last remaining section.
    pub trimmed_entries: usize,
    cold_start: bool,
}

impl ContextBundle {
    /// Render for inclusion in a prompt.
    ///
    /// Never empty: an empty bundle renders a one-line placeholder.
    pub fn to_prompt_string(&self) -> String {
        if self.sections.is_empty() {
            let text = if self.cold_start {
                COLD_START_TEXT
            } else {
                NOTHING_RELEVANT_TEXT
            };
            return format!("{text}\n");
        }
        render_sections(&self.sections)
    }

    /// Rendered size in characters.
    pub fn char_len(&self) -> usize {
        self.to_prompt_string().chars().count()
    }

    /// Whether anything was left out to fit the size limit.
    pub fn is_truncated(&self) -> bool {
        !self.dropped.is_empty() || self.trimmed_entries > 0
    }
}

/// Builds context bundles from a knowledge store.
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create a builder. The size limit is honored exactly, so limits below
    /// [`MIN_CONTEXT_CHARS`] are rejected.
    pub fn new(config: ContextConfig) -> Result<Self, KnowledgeError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a builder with default limits.
    pub fn with_defaults() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    /// The limits this builder applies.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build the context for the next decision.
    ///
    /// `current_location` overrides the store's own notion of where the
    /// player is. `recent_narrative` selects which item insights to include.
    pub fn build(
        &self,
        store: &KnowledgeStore,
        current_location: Option<&str>,
        recent_narrative: &str,
    ) -> ContextBundle {
        let location = current_location
            .filter(|l| !l.trim().is_empty())
            .or(store.current_location());

        let mut sections = Vec::new();
        if let Some(name) = location {
            sections.push(self.location_section(store, name));
        }
        sections.push(ContextSection::bulleted(
            "Recent Facts",
            store
                .recent_facts(self.config.max_facts)
                .map(str::to_string)
                .collect(),
        ));
        let visited = store.visited_locations();
        let skip = visited.len().saturating_sub(self.config.max_visited);
        sections.push(ContextSection::inline(
            "Visited Locations",
            visited[skip..].to_vec(),
        ));
        sections.push(ContextSection::bulleted(
            "Items Mentioned",
            mentioned_items(store, recent_narrative),
        ));
        sections.retain(|s| !s.is_empty());

        let mut bundle = ContextBundle {
            sections,
            dropped: Vec::new(),
            trimmed_entries: 0,
            cold_start: store.is_empty(),
        };
        self.fit(&mut bundle);
        bundle
    }

    fn location_section(&self, store: &KnowledgeStore, name: &str) -> ContextSection {
        let Some(record) = store.location(name) else {
            return ContextSection::bulleted(format!("Current Location: {name}"), Vec::new());
        };

        let mut entries = Vec::new();
        if !record.exits.is_empty() {
            let exits: Vec<String> = record
                .exits
                .iter()
                .map(|direction| match store.graph().destination(&record.name, *direction) {
                    Some(to) => format!("{direction} ({to})"),
                    None => direction.to_string(),
                })
                .collect();
            entries.push(format!("Known exits: {}", exits.join(", ")));
        }
        entries.extend(
            record
                .insights
                .iter()
                .take(self.config.max_insights)
                .cloned(),
        );
        ContextSection::bulleted(format!("Current Location: {}", record.name), entries)
    }

    fn fit(&self, bundle: &mut ContextBundle) {
        let max = self.config.max_chars;
        while bundle.sections.len() > 1 && bundle.char_len() > max {
            if let Some(section) = bundle.sections.pop() {
                bundle.dropped.push(section.title);
            }
        }
        while bundle.char_len() > max {
            let Some(section) = bundle.sections.first_mut() else {
                break;
            };
            if section.entries.len() > 1 {
                section.entries.pop();
                bundle.trimmed_entries += 1;
            } else {
                let section = bundle.sections.remove(0);
                bundle.dropped.push(section.title);
            }
        }
    }
}

/// Item insights for items named in `narrative`, as `name: insight`.
fn mentioned_items(store: &KnowledgeStore, narrative: &str) -> Vec<String> {
    let narrative = narrative.to_lowercase();
    if narrative.trim().is_empty() {
        return Vec::new();
    }
    store
        .items()
        .iter()
        .filter(|(name, _)| mentions(&narrative, name))
        .map(|(name, insight)| format!("{name}: {insight}"))
        .collect()
}

/// Whether `needle` occurs in `haystack` as whole words.
fn mentions(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::Direction;
    use game_io::StatusSnapshot;

    fn explored_store() -> KnowledgeStore {
        let mut store = KnowledgeStore::new();
        store.update(
            &StatusSnapshot::new("Living Room", 0, 1),
            "Living Room\nYou are in the living room. There is a doorway to the east.\nA battery-powered brass lantern is on the trophy case.",
            "",
        );
        store.update(&StatusSnapshot::new("Kitchen", 0, 2), "Kitchen\nYou are in the kitchen.", "east");
        store.update(&StatusSnapshot::new("Living Room", 0, 3), "Living Room", "west");
        store.record_fact("\"up\" in Kitchen: The chimney is too narrow.");
        store.record_fact("\"open case\" in Living Room: The trophy case is now open.");
        store.record_item("brass lantern", "A battery-powered lamp.");
        store.record_item("sword", "Elvish, glows near enemies.");
        store
    }

    #[test]
    fn test_cold_start_is_minimal_and_non_empty() {
        let bundle = ContextBuilder::with_defaults().build(&KnowledgeStore::new(), None, "");
        assert!(bundle.sections.is_empty());
        assert_eq!(bundle.to_prompt_string(), "No knowledge recorded yet.\n");
    }

    #[test]
    fn test_sections_in_priority_order() {
        let store = explored_store();
        let bundle = ContextBuilder::with_defaults().build(&store, Some("Living Room"), "Your brass lantern flickers.");
        let titles: Vec<_> = bundle.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Current Location: Living Room",
                "Recent Facts",
                "Visited Locations",
                "Items Mentioned",
            ]
        );
        assert!(!bundle.is_truncated());

        let prompt = bundle.to_prompt_string();
        assert!(prompt.contains("Known exits: East (Kitchen)"));
        assert!(prompt.contains("Living Room, Kitchen"));
        assert!(prompt.contains("brass lantern: A battery-powered lamp."));
        assert!(!prompt.contains("sword"));
    }

    #[test]
    fn test_facts_newest_first_and_bounded() {
        let mut store = KnowledgeStore::new();
        for i in 0..12 {
            store.record_fact(format!("fact {i}"));
        }
        let config = ContextConfig {
            max_facts: 3,
            ..ContextConfig::default()
        };
        let bundle = ContextBuilder::new(config).unwrap().build(&store, None, "");
        assert_eq!(bundle.sections[0].entries, vec!["fact 11", "fact 10", "fact 9"]);
    }

    #[test]
    fn test_visited_list_is_bounded() {
        let mut store = KnowledgeStore::new();
        for i in 0..30 {
            store.update(&StatusSnapshot::new(format!("Room {i}"), 0, i), "", "");
        }
        let bundle = ContextBuilder::with_defaults().build(&store, None, "");
        let visited = bundle
            .sections
            .iter()
            .find(|s| s.title == "Visited Locations")
            .unwrap();
        assert_eq!(visited.entries.len(), 25);
        assert_eq!(visited.entries.last().map(String::as_str), Some("Room 29"));
    }

    #[test]
    fn test_lowest_priority_sections_dropped_first() {
        let store = explored_store();
        let config = ContextConfig {
            max_chars: 200,
            ..ContextConfig::default()
        };
        let bundle = ContextBuilder::new(config).unwrap().build(&store, Some("Living Room"), "the brass lantern");
        assert!(bundle.char_len() <= 200);
        assert_eq!(bundle.sections[0].title, "Current Location: Living Room");
        assert!(bundle.dropped.contains(&"Items Mentioned".to_string()));
        let kept = bundle.sections.len();
        assert!(kept < 4);
    }

    #[test]
    fn test_single_section_loses_whole_entries() {
        let mut store = KnowledgeStore::new();
        for i in 0..8 {
            store.record_fact(format!("This is a complete sentence about discovery number {i}."));
        }
        let config = ContextConfig {
            max_chars: 150,
            ..ContextConfig::default()
        };
        let bundle = ContextBuilder::new(config).unwrap().build(&store, None, "");
        assert!(bundle.char_len() <= 150);
        assert!(bundle.trimmed_entries > 0);
        for entry in &bundle.sections[0].entries {
            assert!(entry.ends_with('.'));
            assert!(entry.starts_with("This is a complete sentence"));
        }
    }

    #[test]
    fn test_oversized_single_entry_falls_back_to_placeholder() {
        let mut store = KnowledgeStore::new();
        store.record_fact("x".repeat(500));
        let config = ContextConfig {
            max_chars: 100,
            ..ContextConfig::default()
        };
        let bundle = ContextBuilder::new(config).unwrap().build(&store, None, "");
        assert!(bundle.sections.is_empty());
        assert_eq!(bundle.to_prompt_string(), "Nothing recorded applies here yet.\n");
    }

    #[test]
    fn test_never_exceeds_budget() {
        let mut store = explored_store();
        for i in 0..40 {
            store.record_fact(format!("Observation {i} about the underground empire."));
            store.record_exit("Living Room", Direction::Down, "Cellar");
        }
        for max_chars in (MIN_CONTEXT_CHARS..=1200).step_by(37) {
            let config = ContextConfig {
                max_chars,
                ..ContextConfig::default()
            };
            let bundle = ContextBuilder::new(config).unwrap().build(&store, None, "brass lantern and sword");
            assert!(bundle.char_len() <= max_chars, "budget {max_chars} exceeded");
        }
    }

    #[test]
    fn test_budget_below_placeholder_is_rejected() {
        let config = ContextConfig {
            max_chars: MIN_CONTEXT_CHARS - 1,
            ..ContextConfig::default()
        };
        let err = ContextBuilder::new(config).err().unwrap();
        assert!(matches!(err, KnowledgeError::InvalidConfig(_)));
        assert!(err.to_string().contains("max_chars must be at least 35"));
    }

    #[test]
    fn test_placeholders_fit_smallest_budget() {
        let config = ContextConfig {
            max_chars: MIN_CONTEXT_CHARS,
            ..ContextConfig::default()
        };
        let builder = ContextBuilder::new(config).unwrap();
        assert_eq!(builder.config().max_chars, MIN_CONTEXT_CHARS);

        let cold = builder.build(&KnowledgeStore::new(), None, "");
        assert!(cold.char_len() <= MIN_CONTEXT_CHARS);

        let mut store = KnowledgeStore::new();
        store.record_fact("The grating is locked from above.");
        let crowded = builder.build(&store, None, "");
        assert!(crowded.sections.is_empty());
        assert_eq!(crowded.char_len(), MIN_CONTEXT_CHARS);
    }

    #[test]
    fn test_small_budget_is_honored_exactly() {
        let mut store = KnowledgeStore::new();
        for i in 0..5 {
            store.record_fact(format!("fact {i}"));
        }
        let config = ContextConfig {
            max_chars: 50,
            ..ContextConfig::default()
        };
        let bundle = ContextBuilder::new(config).unwrap().build(&store, None, "");
        assert!(bundle.char_len() <= 50);
        assert_eq!(bundle.sections[0].entries, vec!["fact 4", "fact 3", "fact 2"]);
        assert_eq!(bundle.trimmed_entries, 2);
    }

    #[test]
    fn test_mentions_whole_words_only() {
        assert!(mentions("the sword glows", "sword"));
        assert!(!mentions("swordfish swim here", "sword"));
        assert!(mentions("brass lantern.", "brass lantern"));
        assert!(!mentions("anything", ""));
    }
}
