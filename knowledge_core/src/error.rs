//! Errors raised while loading or saving knowledge.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the knowledge layer.
///
/// Load and persist failures never end a run: callers log them and carry on
/// with whatever knowledge is in memory.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The knowledge file exists but could not be read or parsed.
    #[error("failed to load knowledge from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// The knowledge file could not be written.
    #[error("failed to persist knowledge to {}: {reason}", path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("failed to encode knowledge: {0}")]
    Encode(#[from] serde_json::Error),

    /// Context limits that cannot be honored.
    #[error("invalid context configuration: {0}")]
    InvalidConfig(String),
}
