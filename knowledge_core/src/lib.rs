//! # Knowledge Core
//!
//! Long-term memory for an autonomous interactive fiction player. This crate
//! turns transcript text from `game_io` into structured knowledge, keeps it
//! across sessions, and selects a bounded slice of it for each decision.
//!
//! ## Core Components
//!
//! - **knowledge_base**: Facts, locations, items, puzzles and the exit graph
//! - **context_builder**: Size-bounded context bundles in priority order
//! - **error**: Load and persist failures
//!
//! ## Design Philosophy
//!
//! - **Never forget**: Merging and updating only extend what is known
//! - **Replaceable heuristics**: Prose classification lives behind a policy trait
//! - **Bounded output**: Whatever the store holds, the context stays within budget

pub mod context_builder;
pub mod error;
pub mod knowledge_base;

pub use context_builder::*;
pub use error::*;
pub use knowledge_base::*;
