//! Knowledge Base module - long-term memory of one game.
//!
//! The knowledge base consists of:
//! - **Facts**: Short cause/effect notes, deduplicated, in the order learned
//! - **Locations**: Insights and known exits per room, keyed by name
//! - **Items and puzzles**: One description per item, one solution per puzzle
//! - **Graph**: Walked exits between locations
//!
//! Turns come in through [`KnowledgeStore::update`], which delegates prose
//! classification to an [`ObservationPolicy`].

mod direction;
mod location;
mod persist;
mod policy;
mod store;

pub use direction::*;
pub use location::*;
pub use persist::*;
pub use policy::*;
pub use store::*;
