//! Per-location records and the graph of observed transitions between them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::Direction;

/// Everything learned about one location.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRecord {
    /// Location name as first seen on the status line.
    pub name: String,
    /// Descriptive sentences, in the order they were learned.
    pub insights: Vec<String>,
    /// Exits known to exist, whether walked or only described.
    pub exits: BTreeSet<Direction>,
    pub visited: bool,
}

impl LocationRecord {
    /// Create an empty record for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Record an insight. Returns false if it was already known.
    pub fn add_insight(&mut self, insight: impl Into<String>) -> bool {
        let insight = insight.into();
        let insight = insight.trim();
        if insight.is_empty() || self.insights.iter().any(|known| known == insight) {
            return false;
        }
        self.insights.push(insight.to_string());
        true
    }

    /// Union another record of the same location into this one.
    pub fn merge(&mut self, other: &LocationRecord) {
        for insight in &other.insights {
            self.add_insight(insight.as_str());
        }
        self.exits.extend(other.exits.iter().copied());
        self.visited |= other.visited;
    }
}

/// Directed graph of walked exits: location name to direction to destination.
///
/// An edge exists only for moves that were actually observed to succeed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationGraph {
    edges: BTreeMap<String, BTreeMap<Direction, String>>,
}

impl LocationGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that moving `direction` from `from` leads to `to`.
    ///
    /// A later observation replaces an earlier destination; some games have
    /// exits that change once a puzzle is solved.
    pub fn add_exit(&mut self, from: &str, direction: Direction, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(direction, to.to_string());
    }

    /// Directions walked out of a location.
    pub fn exits(&self, from: &str) -> impl Iterator<Item = Direction> + '_ {
        self.edges
            .get(from)
            .into_iter()
            .flat_map(|exits| exits.keys().copied())
    }

    /// Where moving `direction` from `from` was seen to lead.
    pub fn destination(&self, from: &str, direction: Direction) -> Option<&str> {
        self.edges
            .get(from)
            .and_then(|exits| exits.get(&direction))
            .map(String::as_str)
    }

    /// All walked exits of a location with their destinations.
    pub fn destinations(&self, from: &str) -> impl Iterator<Item = (Direction, &str)> + '_ {
        self.edges
            .get(from)
            .into_iter()
            .flat_map(|exits| exits.iter().map(|(d, to)| (*d, to.as_str())))
    }

    /// Every edge as `(from, direction, to)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, Direction, &str)> + '_ {
        self.edges.iter().flat_map(|(from, exits)| {
            exits
                .iter()
                .map(move |(d, to)| (from.as_str(), *d, to.as_str()))
        })
    }

    /// Number of walked exits.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    /// Whether no exit has been walked.
    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// Add edges from `other` that this graph does not have.
    ///
    /// Existing destinations are kept, so merging is idempotent.
    pub fn merge(&mut self, other: &LocationGraph) {
        for (from, direction, to) in other.edges() {
            self.edges
                .entry(from.to_string())
                .or_default()
                .entry(direction)
                .or_insert_with(|| to.to_string());
        }
    }
}
