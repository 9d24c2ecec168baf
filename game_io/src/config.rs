//! Session configuration: interpreter command line and read timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::SessionError;

/// Timeouts and interpreter settings for one session.
///
/// Durations are written in milliseconds in TOML (`quiescence_ms = 300`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Interpreter executable, looked up on `PATH` when not absolute.
    pub interpreter: String,

    /// Arguments placed before the game file.
    pub interpreter_args: Vec<String>,

    /// No new bytes for this long means the response is probably complete.
    #[serde(rename = "quiescence_ms", with = "millis")]
    pub quiescence: Duration,

    /// Give up on a single read after this long.
    #[serde(rename = "hard_timeout_ms", with = "millis")]
    pub hard_timeout: Duration,

    /// Ceiling for the first read after launch.
    #[serde(rename = "startup_timeout_ms", with = "millis")]
    pub startup_timeout: Duration,

    /// Ceiling for each step of a save or restore handshake.
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,

    /// How long to wait for a clean exit before killing the interpreter.
    #[serde(rename = "close_timeout_ms", with = "millis")]
    pub close_timeout: Duration,

    /// Trailing text marking "waiting for input". Ends a read early.
    pub prompt_marker: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interpreter: "dfrotz".to_string(),
            interpreter_args: Vec::new(),
            quiescence: Duration::from_millis(300),
            hard_timeout: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(3),
            close_timeout: Duration::from_secs(2),
            prompt_marker: Some(">".to_string()),
        }
    }
}

impl SessionConfig {
    /// Parse a `[session]`-style TOML table.
    pub fn from_toml_str(source: &str) -> Result<Self, SessionError> {
        let config: Self =
            toml::from_str(source).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the timeouts.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.interpreter.trim().is_empty() {
            return Err(SessionError::Config("interpreter must not be empty".into()));
        }
        if self.quiescence.is_zero() {
            return Err(SessionError::Config("quiescence window must be non-zero".into()));
        }
        if self.quiescence >= self.hard_timeout {
            return Err(SessionError::Config(format!(
                "quiescence window {:?} must be shorter than hard timeout {:?}",
                self.quiescence, self.hard_timeout
            )));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interpreter, "dfrotz");
        assert!(config.quiescence < config.hard_timeout);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = SessionConfig::from_toml_str(
            r#"
            interpreter = "/usr/local/bin/dfrotz"
            quiescence_ms = 150
            "#,
        )
        .unwrap();

        assert_eq!(config.interpreter, "/usr/local/bin/dfrotz");
        assert_eq!(config.quiescence, Duration::from_millis(150));
        assert_eq!(config.hard_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_toml_rejects_unknown_key() {
        let err = SessionConfig::from_toml_str("quiesence_ms = 10").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn test_quiescence_must_be_shorter_than_ceiling() {
        let err = SessionConfig::from_toml_str("quiescence_ms = 6000").unwrap_err();
        assert!(err.to_string().contains("shorter"));
    }
}
