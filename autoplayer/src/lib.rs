//! # Autoplayer
//!
//! Plays an interactive fiction game on its own: launches the interpreter,
//! asks a decision maker for each command and remembers what it learns
//! between sessions.
//!
//! ## Core Components
//!
//! - **orchestrator**: The turn loop, cadences and shutdown
//! - **decision**: The decision maker trait and its backends
//! - **config**: One TOML file for every setting
//! - **telemetry**: Log output setup
//!
//! ## Design Philosophy
//!
//! - **Thin loop**: Process handling lives in `game_io`, memory in `knowledge_core`
//! - **Swappable brains**: Any [`DecisionMaker`] can drive a game
//! - **Leave things resumable**: Every exit path saves what it can

pub mod config;
pub mod decision;
pub mod orchestrator;
pub mod telemetry;

pub use config::*;
pub use decision::*;
pub use orchestrator::*;
pub use telemetry::*;
