//! # Game I/O
//!
//! Everything that touches the interpreter process. This crate knows how to
//! talk to a line-oriented interactive fiction interpreter and how to read
//! its status line; it does not interpret what happens in the game.
//!
//! ## Core Components
//!
//! - **transcript**: Splits raw output into a status snapshot and narrative
//! - **session**: Launches the interpreter, cycles commands, drives save/restore
//! - **config**: Timeouts and interpreter command line

pub mod config;
pub mod error;
pub mod session;
pub mod transcript;

pub use config::*;
pub use error::*;
pub use session::*;
pub use transcript::*;
