//! REPL configuration.
//!
//! Loaded from `~/.eightball.toml` when present; every field has a
//! default so the file is optional. A malformed file is reported and
//! ignored rather than stopping the interpreter from starting.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplConfig {
    /// Prompt shown while in edit mode (immediate mode has none).
    pub edit_prompt: String,
    /// Where to persist input history; defaults to
    /// `~/.eightball_history`.
    pub history_file: Option<PathBuf>,
    /// Print the startup banner and free-space report.
    pub banner: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            edit_prompt: ">".to_string(),
            history_file: None,
            banner: true,
        }
    }
}

impl ReplConfig {
    /// Load from the user's home directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(dir) = home::home_dir() else {
            return ReplConfig::default();
        };
        Self::load_from(&dir.join(".eightball.toml"))
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return ReplConfig::default();
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Ignoring {}: {}", path.display(), e);
                ReplConfig::default()
            }
        }
    }

    /// Resolved history path, if any usable location exists.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file
            .clone()
            .or_else(|| home::home_dir().map(|d| d.join(".eightball_history")))
    }
}
