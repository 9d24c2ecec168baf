//! Errors raised while driving an interpreter session.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the session I/O layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The interpreter could not be launched or exited straight away.
    #[error("failed to start interpreter `{executable}`: {reason}")]
    Start { executable: String, reason: String },

    /// A required input file does not exist.
    #[error("game file not found: {0}")]
    MissingGameFile(PathBuf),

    /// No bytes arrived before the hard read ceiling.
    #[error("no output from interpreter within {waited:?}")]
    ReadTimeout { waited: Duration },

    /// The interpreter stopped responding or exited mid-session.
    #[error("interpreter session is dead: {0}")]
    Dead(String),

    /// The save handshake did not complete.
    #[error("save failed: {0}")]
    Save(String),

    /// The restore handshake did not complete.
    #[error("restore failed: {0}")]
    Restore(String),

    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid session configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether the turn loop may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::ReadTimeout { .. })
    }

    /// Whether the error only affects persisted game state.
    pub fn is_save_state_error(&self) -> bool {
        matches!(self, SessionError::Save(_) | SessionError::Restore(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_read_timeout_is_recoverable() {
        let timeout = SessionError::ReadTimeout {
            waited: Duration::from_secs(5),
        };
        assert!(timeout.is_recoverable());
        assert!(!SessionError::Dead("eof".into()).is_recoverable());
        assert!(!SessionError::Save("no prompt".into()).is_recoverable());
    }

    #[test]
    fn test_save_state_errors() {
        assert!(SessionError::Save("x".into()).is_save_state_error());
        assert!(SessionError::Restore("x".into()).is_save_state_error());
        assert!(!SessionError::Dead("x".into()).is_save_state_error());
    }
}
