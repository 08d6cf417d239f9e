use regex::RegexSet;
use serde::Serialize;

use super::defaults::default_blocklist;

/// Matches shell commands against blocked patterns before `run_command` executes them.
pub struct CommandFilter {
    patterns: RegexSet,
    reasons: Vec<String>,
}

/// A command refused by the filter.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedCommand {
    pub blocked: bool,
    pub reason: String,
    pub command: String,
}

impl BlockedCommand {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "blocked": self.blocked,
            "reason": self.reason,
            "command": self.command,
        })
    }
}

impl CommandFilter {
    /// Compile `(pattern, reason)` pairs into a single [`RegexSet`].
    pub fn new(patterns: &[(String, String)]) -> Result<Self, regex::Error> {
        let (regexes, reasons): (Vec<_>, Vec<_>) = patterns.iter().cloned().unzip();
        Ok(Self {
            patterns: RegexSet::new(&regexes)?,
            reasons,
        })
    }

    pub fn from_defaults() -> Result<Self, regex::Error> {
        Self::new(&default_blocklist())
    }

    /// First matching pattern wins.
    pub fn check(&self, command: &str) -> Option<BlockedCommand> {
        let first = self.patterns.matches(command).into_iter().next()?;
        Some(BlockedCommand {
            blocked: true,
            reason: self.reasons[first].clone(),
            command: command.to_string(),
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.reasons.len()
    }
}
