//! The Knowledge Store - everything learned about one game, across sessions.

use game_io::StatusSnapshot;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    normalize_item_name, Direction, KeywordPolicy, LocationGraph, LocationRecord, Observation,
    ObservationPolicy, TurnObservation,
};

static DEFAULT_POLICY: Lazy<KeywordPolicy> = Lazy::new(KeywordPolicy::default);

/// Score bookkeeping carried between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub score: i32,
    pub best_score: i32,
    pub moves: u32,
    /// Turns observed over the lifetime of the store.
    pub turns: u64,
}

impl Progress {
    /// Record a snapshot. Returns the score change since the last one.
    fn observe(&mut self, snapshot: &StatusSnapshot) -> i32 {
        let delta = if self.turns == 0 && self.moves == 0 {
            0
        } else {
            snapshot.score - self.score
        };
        self.score = snapshot.score;
        self.moves = snapshot.moves;
        self.best_score = self.best_score.max(snapshot.score);
        delta
    }
}

/// What a single [`KnowledgeStore::update`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Location entered this turn.
    pub arrived: Option<String>,
    /// Exit recorded this turn, as `(from, direction)`.
    pub new_exit: Option<(String, Direction)>,
    pub facts_added: usize,
    pub observations: usize,
}

/// Structured record of facts, locations, items, puzzles and walked exits.
///
/// Every field defaults when missing from a persisted file and unknown keys
/// are ignored, so older and newer files load into the same type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeStore {
    /// Deduplicated, oldest first.
    facts: Vec<String>,
    /// Keyed by canonical (first-seen) location name.
    locations: BTreeMap<String, LocationRecord>,
    /// Keyed by lowercase item name.
    #[serde(rename = "item_insights")]
    items: BTreeMap<String, String>,
    #[serde(rename = "puzzle_solutions")]
    puzzles: BTreeMap<String, String>,
    #[serde(rename = "location_graph")]
    graph: LocationGraph,
    /// Canonical names in first-visit order.
    visited_locations: Vec<String>,
    current_location: Option<String>,
    progress: Progress,
}

impl KnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one turn using the default [`KeywordPolicy`].
    pub fn update(
        &mut self,
        snapshot: &StatusSnapshot,
        narrative: &str,
        command: &str,
    ) -> UpdateSummary {
        self.update_with(&*DEFAULT_POLICY, snapshot, narrative, command)
    }

    /// Incorporate one turn.
    ///
    /// When the snapshot names a location other than the current one, that
    /// location is marked visited and becomes current. If the command was a
    /// movement command the move is also recorded as an exit of the previous
    /// location. The narrative is then classified by `policy`.
    pub fn update_with(
        &mut self,
        policy: &dyn ObservationPolicy,
        snapshot: &StatusSnapshot,
        narrative: &str,
        command: &str,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut arrived = false;
        let mut score_delta = 0;

        if !snapshot.is_unknown() {
            let name = self.canonical_or_insert(&snapshot.location);
            if self.current_location.as_deref() != Some(name.as_str()) {
                let previous = self.current_location.replace(name.clone());
                self.mark_visited(&name);
                if let (Some(from), Some(direction)) = (previous, Direction::parse_command(command)) {
                    self.record_exit(&from, direction, &name);
                    debug!(from = %from, direction = %direction, to = %name, "recorded exit");
                    summary.new_exit = Some((from, direction));
                }
                summary.arrived = Some(name);
                arrived = true;
            }
            score_delta = self.progress.observe(snapshot);
        }

        let turn = TurnObservation {
            command,
            narrative,
            location: self.current_location.as_deref(),
            arrived,
            score_delta,
        };
        let observations = policy.observe(&turn);
        summary.observations = observations.len();

        for observation in observations {
            match observation {
                Observation::Fact(fact) => {
                    if self.record_fact(fact) {
                        summary.facts_added += 1;
                    }
                }
                Observation::LocationInsight(insight) => {
                    if let Some(record) = self.current_record_mut() {
                        record.add_insight(insight);
                    }
                }
                Observation::Exit(direction) => {
                    if let Some(record) = self.current_record_mut() {
                        record.exits.insert(direction);
                    }
                }
                Observation::Item { name, insight } => self.record_item(&name, insight),
                Observation::Puzzle { id, solution } => self.record_puzzle(&id, solution),
            }
        }

        self.progress.turns += 1;
        summary
    }

    /// Union `other` into this store.
    ///
    /// Facts, insights, exits and visited locations are only ever extended.
    /// Item insights and puzzle solutions from `other` replace existing ones.
    /// Merging a store into itself changes nothing.
    pub fn merge(&mut self, other: &KnowledgeStore) {
        for fact in &other.facts {
            self.record_fact(fact.clone());
        }

        for (name, record) in &other.locations {
            let key = self.canonical_or_insert(name);
            if let Some(existing) = self.locations.get_mut(&key) {
                existing.merge(record);
            }
        }

        for (name, insight) in &other.items {
            self.items.insert(name.clone(), insight.clone());
        }
        for (id, solution) in &other.puzzles {
            self.puzzles.insert(id.clone(), solution.clone());
        }

        let mut edges = LocationGraph::new();
        for (from, direction, to) in other.graph.edges() {
            edges.add_exit(self.canonical(from), direction, self.canonical(to));
        }
        self.graph.merge(&edges);

        for name in &other.visited_locations {
            let name = self.canonical(name).to_string();
            if !self.visited_locations.contains(&name) {
                self.visited_locations.push(name);
            }
        }

        if self.current_location.is_none() {
            self.current_location = other
                .current_location
                .as_deref()
                .map(|name| self.canonical(name).to_string());
        }

        if self.progress == Progress::default() {
            self.progress = other.progress;
        } else {
            self.progress.best_score = self.progress.best_score.max(other.progress.best_score);
        }
    }

    /// Add a fact. Returns false if the exact text was already known.
    pub fn record_fact(&mut self, fact: impl Into<String>) -> bool {
        let fact = fact.into();
        let fact = fact.trim();
        if fact.is_empty() || self.facts.iter().any(|known| known == fact) {
            return false;
        }
        self.facts.push(fact.to_string());
        true
    }

    /// Set the insight for an item, replacing any earlier one.
    pub fn record_item(&mut self, name: &str, insight: impl Into<String>) {
        let key = normalize_item_name(name);
        if !key.is_empty() {
            self.items.insert(key, insight.into());
        }
    }

    /// Set the solution for a puzzle, replacing any earlier one.
    pub fn record_puzzle(&mut self, id: &str, solution: impl Into<String>) {
        let id = id.trim();
        if !id.is_empty() {
            self.puzzles.insert(id.to_string(), solution.into());
        }
    }

    /// Record a walked exit, creating location records as needed.
    pub fn record_exit(&mut self, from: &str, direction: Direction, to: &str) {
        let from = self.canonical_or_insert(from);
        let to = self.canonical_or_insert(to);
        if let Some(record) = self.locations.get_mut(&from) {
            record.exits.insert(direction);
        }
        self.graph.add_exit(&from, direction, &to);
    }

    /// Look up a location by name, ignoring case.
    pub fn location(&self, name: &str) -> Option<&LocationRecord> {
        self.canonical_name(name)
            .and_then(|key| self.locations.get(key))
    }

    /// The stored spelling of a location name, ignoring case.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        if let Some((key, _)) = self.locations.get_key_value(name) {
            return Some(key.as_str());
        }
        self.locations
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// All facts, oldest first.
    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    /// Up to `limit` facts, newest first.
    pub fn recent_facts(&self, limit: usize) -> impl Iterator<Item = &str> + '_ {
        self.facts.iter().rev().take(limit).map(String::as_str)
    }

    /// All location records, by name.
    pub fn locations(&self) -> impl Iterator<Item = &LocationRecord> + '_ {
        self.locations.values()
    }

    /// Item insights keyed by lowercase name.
    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    /// Insight for one item, ignoring case.
    pub fn item(&self, name: &str) -> Option<&str> {
        self.items.get(&normalize_item_name(name)).map(String::as_str)
    }

    /// Puzzle solutions keyed by slug.
    pub fn puzzles(&self) -> &BTreeMap<String, String> {
        &self.puzzles
    }

    /// Exits that were actually walked.
    pub fn graph(&self) -> &LocationGraph {
        &self.graph
    }

    /// Location names in first-visit order.
    pub fn visited_locations(&self) -> &[String] {
        &self.visited_locations
    }

    /// Where the player was last seen.
    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }

    /// Score, best score, moves and turns so far.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// True when nothing has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.locations.is_empty()
            && self.items.is_empty()
            && self.puzzles.is_empty()
    }

    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical_name(name).unwrap_or(name)
    }

    fn canonical_or_insert(&mut self, name: &str) -> String {
        if let Some(key) = self.canonical_name(name) {
            return key.to_string();
        }
        let key = name.trim().to_string();
        self.locations
            .insert(key.clone(), LocationRecord::new(key.clone()));
        key
    }

    fn mark_visited(&mut self, name: &str) {
        if let Some(record) = self.locations.get_mut(name) {
            record.visited = true;
        }
        if !self.visited_locations.iter().any(|v| v == name) {
            self.visited_locations.push(name.to_string());
        }
    }

    fn current_record_mut(&mut self) -> Option<&mut LocationRecord> {
        let name = self.current_location.as_ref()?;
        self.locations.get_mut(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(location: &str) -> StatusSnapshot {
        StatusSnapshot::new(location, 0, 1)
    }

    #[test]
    fn test_first_update_visits_without_exit() {
        let mut store = KnowledgeStore::new();
        let summary = store.update(&at("West of House"), "West of House\nYou are standing in an open field.", "");

        assert_eq!(summary.arrived.as_deref(), Some("West of House"));
        assert_eq!(summary.new_exit, None);
        assert_eq!(store.current_location(), Some("West of House"));
        assert_eq!(store.visited_locations(), ["West of House".to_string()]);
        assert!(store.location("west of house").unwrap().visited);
    }

    #[test]
    fn test_movement_records_exit_and_graph_edge() {
        let mut store = KnowledgeStore::new();
        store.update(&at("Behind House"), "Behind House", "");
        let summary = store.update(&at("Kitchen"), "Kitchen\nYou are in the kitchen.", "go west");

        assert_eq!(summary.new_exit, Some(("Behind House".to_string(), Direction::West)));
        let behind = store.location("Behind House").unwrap();
        assert!(behind.exits.contains(&Direction::West));
        assert_eq!(
            store.graph().destination("Behind House", Direction::West),
            Some("Kitchen")
        );
    }

    #[test]
    fn test_failed_move_adds_fact_not_exit() {
        let mut store = KnowledgeStore::new();
        store.update(&at("Kitchen"), "Kitchen", "");
        let summary = store.update(&at("Kitchen"), "You can't go that way.", "north");

        assert_eq!(summary.new_exit, None);
        assert!(store.location("Kitchen").unwrap().exits.is_empty());
        assert_eq!(summary.facts_added, 1);
        assert!(store.facts()[0].contains("You can't go that way."));
        assert!(store.facts()[0].contains("north"));
    }

    #[test]
    fn test_teleport_without_movement_command_records_no_exit() {
        let mut store = KnowledgeStore::new();
        store.update(&at("Kitchen"), "", "");
        let summary = store.update(&at("Forest"), "", "pray");
        assert_eq!(summary.arrived.as_deref(), Some("Forest"));
        assert_eq!(summary.new_exit, None);
        assert!(store.graph().is_empty());
    }

    #[test]
    fn test_location_names_are_case_insensitive() {
        let mut store = KnowledgeStore::new();
        store.update(&at("Living Room"), "", "");
        store.update(&at("Kitchen"), "", "east");
        store.update(&at("LIVING ROOM"), "", "west");

        assert_eq!(store.current_location(), Some("Living Room"));
        assert_eq!(store.visited_locations().len(), 2);
        assert_eq!(
            store.graph().destination("Kitchen", Direction::West),
            Some("Living Room")
        );
    }

    #[test]
    fn test_unknown_snapshot_keeps_location() {
        let mut store = KnowledgeStore::new();
        store.update(&at("Kitchen"), "", "");
        let summary = store.update(&StatusSnapshot::default(), "Taken.", "take sack");
        assert_eq!(summary.arrived, None);
        assert_eq!(store.current_location(), Some("Kitchen"));
    }

    #[test]
    fn test_record_fact_deduplicates_in_order() {
        let mut store = KnowledgeStore::new();
        assert!(store.record_fact("The door is locked."));
        assert!(store.record_fact("The grue is near."));
        assert!(!store.record_fact("The door is locked."));
        let recent: Vec<_> = store.recent_facts(5).collect();
        assert_eq!(recent, vec!["The grue is near.", "The door is locked."]);
    }

    #[test]
    fn test_items_and_puzzles_latest_write_wins() {
        let mut store = KnowledgeStore::new();
        store.record_item("Brass Lantern", "Seen in Living Room");
        store.record_item("brass lantern", "Carried");
        store.record_puzzle("open-trap-door", "move rug first");
        store.record_puzzle("open-trap-door", "move rug, then open trap door");

        assert_eq!(store.item("the brass lantern"), Some("Carried"));
        assert_eq!(store.items().len(), 1);
        assert_eq!(
            store.puzzles()["open-trap-door"],
            "move rug, then open trap door"
        );
    }

    #[test]
    fn test_merge_into_self_is_noop() {
        let mut store = KnowledgeStore::new();
        store.update(&at("West of House"), "There is a small mailbox here.", "");
        store.update(&at("North of House"), "", "north");
        store.record_fact("The window is ajar.");
        let snapshot = store.clone();

        store.merge(&snapshot);
        assert_eq!(store, snapshot);
    }

    #[test]
    fn test_merge_unions_and_prefers_incoming_items() {
        let mut fresh = KnowledgeStore::new();
        fresh.record_fact("A");
        fresh.record_item("sword", "old");
        fresh.update(&at("Kitchen"), "", "");

        let mut loaded = KnowledgeStore::new();
        loaded.record_fact("B");
        loaded.record_fact("A");
        loaded.record_item("sword", "glowing");
        loaded.update(&at("kitchen"), "", "");
        loaded.update(&at("Attic"), "", "up");

        fresh.merge(&loaded);
        assert_eq!(fresh.facts(), ["A".to_string(), "B".to_string()]);
        assert_eq!(fresh.item("sword"), Some("glowing"));
        assert_eq!(
            fresh.visited_locations(),
            ["Kitchen".to_string(), "Attic".to_string()]
        );
        assert_eq!(fresh.graph().destination("Kitchen", Direction::Up), Some("Attic"));
        assert!(fresh.location("Kitchen").unwrap().exits.contains(&Direction::Up));
        assert_eq!(fresh.current_location(), Some("Kitchen"));
    }

    #[test]
    fn test_score_increase_becomes_puzzle() {
        let mut store = KnowledgeStore::new();
        store.update(&StatusSnapshot::new("Kitchen", 0, 5), "", "");
        store.update(&StatusSnapshot::new("Kitchen", 10, 6), "Done.", "put egg in case");
        assert_eq!(store.progress().best_score, 10);
        assert!(store.puzzles().contains_key("put-egg"));
    }
}
