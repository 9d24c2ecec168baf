//! Player configuration: one TOML file aggregating session, context and
//! decision settings. Every key is optional.
//!
//! ```toml
//! max_turns = 80
//! autosave_every = 5
//!
//! [session]
//! interpreter = "dfrotz"
//! quiescence_ms = 400
//!
//! [context]
//! max_chars = 1500
//!
//! [decision]
//! backend = "anthropic"
//! model = "claude-sonnet-4-5-20250929"
//! ```

use game_io::SessionConfig;
use knowledge_core::{ContextConfig, KnowledgeStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Errors from loading or validating player configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which decision maker drives the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Commands read from a file, one per line.
    Script,
}

/// Decision backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionConfig {
    pub backend: Backend,
    pub model: String,
    pub max_tokens: u32,
    /// Exchanges kept in the running history sent with each request.
    pub history_window: usize,
    /// Command file for the script backend.
    pub script: Option<PathBuf>,
    /// Pause before the single retry of a transient failure.
    pub retry_delay_ms: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 150,
            history_window: 10,
            script: None,
            retry_delay_ms: 2000,
        }
    }
}

/// Everything a run needs besides the game file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Turn budget.
    pub max_turns: u32,
    /// Save the game periodically and at exit.
    pub autosave: bool,
    pub autosave_every: u32,
    /// Persist knowledge every this many turns.
    pub persist_every: u32,
    /// Resume from the save file when one exists.
    pub restore: bool,
    /// Defaults to `<game dir>/saves/<stem>_autosave.qzl`.
    pub save_file: Option<PathBuf>,
    /// Defaults to `<game dir>/knowledge/<stem>_knowledge.json`.
    pub knowledge_file: Option<PathBuf>,
    pub session: SessionConfig,
    pub context: ContextConfig,
    pub decision: DecisionConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            autosave: true,
            autosave_every: 10,
            persist_every: knowledge_core::DEFAULT_PERSIST_EVERY,
            restore: true,
            save_file: None,
            knowledge_file: None,
            session: SessionConfig::default(),
            context: ContextConfig::default(),
            decision: DecisionConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.context
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.autosave && self.autosave_every == 0 {
            return Err(ConfigError::Invalid(
                "autosave_every must be at least 1 when autosave is on".into(),
            ));
        }
        if self.decision.history_window == 0 {
            return Err(ConfigError::Invalid("history_window must be at least 1".into()));
        }
        if self.decision.backend == Backend::Script && self.decision.script.is_none() {
            return Err(ConfigError::Invalid(
                "the script backend needs a script file".into(),
            ));
        }
        Ok(())
    }

    /// Save path for `game_file`, honouring an explicit setting.
    pub fn save_path_for(&self, game_file: &Path) -> PathBuf {
        self.save_file
            .clone()
            .unwrap_or_else(|| game_io::default_save_path(game_file))
    }

    /// Knowledge path for `game_file`, honouring an explicit setting.
    pub fn knowledge_path_for(&self, game_file: &Path) -> PathBuf {
        self.knowledge_file
            .clone()
            .unwrap_or_else(|| KnowledgeStore::knowledge_path_for(game_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.autosave_every, 10);
        assert_eq!(config.persist_every, 10);
        assert_eq!(config.decision.history_window, 10);
        assert_eq!(config.context.max_chars, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_path_is_default() {
        assert_eq!(PlayerConfig::load(None).unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");
        std::fs::write(
            &path,
            "max_turns = 80\n\n[session]\nquiescence_ms = 400\n\n[decision]\nbackend = \"script\"\nscript = \"moves.txt\"\n",
        )
        .unwrap();

        let config = PlayerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_turns, 80);
        assert_eq!(config.session.quiescence, Duration::from_millis(400));
        assert_eq!(config.session.interpreter, "dfrotz");
        assert_eq!(config.decision.backend, Backend::Script);
        assert_eq!(config.decision.script, Some(PathBuf::from("moves.txt")));
    }

    #[test]
    fn test_unknown_key_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");
        std::fs::write(&path, "max_turnz = 3\n").unwrap();

        let err = PlayerConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("player.toml"));
    }

    #[test]
    fn test_missing_file() {
        let err = PlayerConfig::load(Some(Path::new("/nonexistent/player.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = PlayerConfig::default();
        config.decision.backend = Backend::Script;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PlayerConfig::default();
        config.autosave_every = 0;
        assert!(config.validate().is_err());
        config.autosave = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_context_budget_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");

        std::fs::write(&path, "[context]\nmax_chars = 50\n").unwrap();
        assert_eq!(PlayerConfig::load(Some(&path)).unwrap().context.max_chars, 50);

        std::fs::write(&path, "[context]\nmax_chars = 10\n").unwrap();
        let err = PlayerConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("max_chars must be at least"));
    }

    #[test]
    fn test_paths() {
        let config = PlayerConfig::default();
        let game = Path::new("games/zork1.z5");
        assert_eq!(
            config.save_path_for(game),
            Path::new("games/saves/zork1_autosave.qzl")
        );
        assert_eq!(
            config.knowledge_path_for(game),
            Path::new("games/knowledge/zork1_knowledge.json")
        );

        let config = PlayerConfig {
            save_file: Some(PathBuf::from("my_save.sav")),
            ..PlayerConfig::default()
        };
        assert_eq!(config.save_path_for(game), Path::new("my_save.sav"));
    }
}
