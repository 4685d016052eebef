//! Board configuration, read from `board.toml`.
//!
//! ```toml
//! [board]
//! kind = "pipeline"
//! title = "Sales pipeline"
//! actor = "dana"
//!
//! [drag]
//! threshold_px = 5.0
//!
//! [sync]
//! event_capacity = 256
//!
//! [store]
//! path = ".board/board.db"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```
//!
//! Every key is optional; a missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::board::drag::DEFAULT_DRAG_THRESHOLD_PX;
use crate::board::models::BoardKind;

/// File name looked up inside the board directory.
pub const CONFIG_FILE: &str = "board.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default)]
    pub kind: BoardKind,
    #[serde(default = "default_title")]
    pub title: String,
    /// Identity used by the "mine only" filter.
    #[serde(default)]
    pub actor: Option<String>,
}

fn default_title() -> String {
    "Board".to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            kind: BoardKind::default(),
            title: default_title(),
            actor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DragSection {
    /// Pointer travel before a press becomes a drag.
    #[serde(default = "default_threshold_px")]
    pub threshold_px: f64,
}

fn default_threshold_px() -> f64 {
    DEFAULT_DRAG_THRESHOLD_PX
}

impl Default for DragSection {
    fn default() -> Self {
        Self {
            threshold_px: default_threshold_px(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    crate::board::controller::DEFAULT_EVENT_CAPACITY
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// SQLite file. Relative paths resolve against the board directory.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".board/board.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Root of `board.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub drag: DragSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BoardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse board.toml")
    }

    /// Load `board.toml` from `dir`, or the defaults if it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize board.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Store path, resolved against `dir` when relative.
    pub fn store_path(&self, dir: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            dir.join(&self.store.path)
        }
    }

    /// Warnings for values that parse but make no sense.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.drag.threshold_px.is_finite() || self.drag.threshold_px < 0.0 {
            warnings.push(format!(
                "Invalid drag.threshold_px {}: must be a non-negative number",
                self.drag.threshold_px
            ));
        }
        if self.sync.event_capacity == 0 {
            warnings.push("sync.event_capacity must be at least 1".to_string());
        }
        if self.board.title.trim().is_empty() {
            warnings.push("board.title is empty".to_string());
        }
        warnings
    }
}
