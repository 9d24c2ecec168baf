//! Compass and vertical directions, and recognition of movement commands.

use serde::{Deserialize, Serialize};

/// A direction the player can move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
    Up,
    Down,
    In,
    Out,
}

/// Verbs that may precede a direction in a movement command.
const MOVEMENT_VERBS: &[&str] = &["go", "walk", "run", "head", "move", "climb", "crawl"];

impl Direction {
    pub const ALL: [Direction; 12] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Northeast,
        Direction::Northwest,
        Direction::Southeast,
        Direction::Southwest,
        Direction::Up,
        Direction::Down,
        Direction::In,
        Direction::Out,
    ];

    /// Parse a single direction word or its abbreviation.
    pub fn parse_word(word: &str) -> Option<Self> {
        let direction = match word.trim().to_lowercase().as_str() {
            "n" | "north" => Direction::North,
            "s" | "south" => Direction::South,
            "e" | "east" => Direction::East,
            "w" | "west" => Direction::West,
            "ne" | "northeast" | "north-east" => Direction::Northeast,
            "nw" | "northwest" | "north-west" => Direction::Northwest,
            "se" | "southeast" | "south-east" => Direction::Southeast,
            "sw" | "southwest" | "south-west" => Direction::Southwest,
            "u" | "up" | "upward" | "upwards" => Direction::Up,
            "d" | "down" | "downward" | "downwards" => Direction::Down,
            "in" | "inside" | "enter" => Direction::In,
            "out" | "outside" | "exit" | "leave" => Direction::Out,
            _ => return None,
        };
        Some(direction)
    }

    /// Recognize a movement command: a bare direction (`n`, `north`), or a
    /// movement verb followed by one (`go north`, `climb up`).
    ///
    /// Anything else, including `go to kitchen`, is not a movement command.
    pub fn parse_command(command: &str) -> Option<Self> {
        let lower = command.trim().to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        match words.as_slice() {
            [word] => Self::parse_word(word),
            [verb, word] if MOVEMENT_VERBS.contains(verb) => Self::parse_word(word),
            [verb, "to", "the", word] if MOVEMENT_VERBS.contains(verb) => Self::parse_word(word),
            _ => None,
        }
    }

    /// Display name, e.g. `North`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::South => "South",
            Direction::East => "East",
            Direction::West => "West",
            Direction::Northeast => "Northeast",
            Direction::Northwest => "Northwest",
            Direction::Southeast => "Southeast",
            Direction::Southwest => "Southwest",
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::In => "In",
            Direction::Out => "Out",
        }
    }

    /// The direction leading back.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Northeast => Direction::Southwest,
            Direction::Northwest => Direction::Southeast,
            Direction::Southeast => Direction::Northwest,
            Direction::Southwest => Direction::Northeast,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
