//! Scripted backend: commands from a file, one per line.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{DecisionError, DecisionMaker, DecisionRequest};

/// Replays a fixed list of commands, then reports
/// [`DecisionError::Exhausted`].
#[derive(Debug)]
pub struct ScriptedDecider {
    commands: Vec<String>,
    cursor: AtomicUsize,
}

impl ScriptedDecider {
    /// Create a decider handing out `commands` in order.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a script. Blank lines and lines starting with `#` are skipped.
    pub fn parse(script: &str) -> Self {
        Self::new(
            script
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Read a script file. An unreadable file is a configuration error.
    pub async fn from_file(path: &Path) -> Result<Self, DecisionError> {
        let script = tokio::fs::read_to_string(path).await.map_err(|e| {
            DecisionError::Config(format!("cannot read script {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&script))
    }

    /// Commands not yet handed out.
    pub fn remaining(&self) -> usize {
        self.commands
            .len()
            .saturating_sub(self.cursor.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl DecisionMaker for ScriptedDecider {
    async fn decide(&self, _request: &DecisionRequest) -> Result<String, DecisionError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.commands
            .get(index)
            .cloned()
            .ok_or(DecisionError::Exhausted(self.commands.len()))
    }

    fn name(&self) -> &str {
        "script"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DecisionRequest {
        DecisionRequest {
            system: String::new(),
            history: Vec::new(),
            context: String::new(),
            narrative: String::new(),
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_exhausts() {
        let decider = ScriptedDecider::parse("# opening moves\nopen mailbox\n\nread leaflet\n");
        assert_eq!(decider.remaining(), 2);
        assert_eq!(decider.decide(&request()).await.unwrap(), "open mailbox");
        assert_eq!(decider.decide(&request()).await.unwrap(), "read leaflet");
        assert!(matches!(
            decider.decide(&request()).await,
            Err(DecisionError::Exhausted(2))
        ));
        assert_eq!(decider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moves.txt");
        std::fs::write(&path, "north\nsouth\n").unwrap();
        let decider = ScriptedDecider::from_file(&path).await.unwrap();
        assert_eq!(decider.remaining(), 2);

        let missing = ScriptedDecider::from_file(&dir.path().join("nope.txt")).await;
        assert!(matches!(missing, Err(DecisionError::Config(_))));
    }
}
