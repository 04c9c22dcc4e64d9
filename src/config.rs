//! Configuration file
//!
//! TOML, every field optional:
//!
//! ```toml
//! [omr]
//! fill_low = 0.35
//! min_radius_px = 6
//!
//! [historical]
//! table = "tri_table.csv"
//! year_window = 5
//!
//! [historical.zero_score_defaults]
//! LC = 270.6
//!
//! [scoring]
//! min_difficulty_std = 3.0
//! threads = 8
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::omr::OmrOptions;
use crate::scoring::{
    Area, CoherenceOptions, HistoricalConfig, ZeroScoreDefaults,
    DEFAULT_MIN_DIFFICULTY_STD, DEFAULT_POINTS_PER_CORRECT, DEFAULT_YEAR_WINDOW,
};

/// Directory name under the platform config directory
pub const CONFIG_DIR_NAME: &str = "omr-tri";

/// File name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `[historical]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalSection {
    /// Delimited table file, used when the command line names none
    pub table: Option<PathBuf>,
    pub year_window: usize,
    /// Per-area overrides of the built-in raw-0 floors
    pub zero_score_defaults: BTreeMap<Area, f64>,
}

impl Default for HistoricalSection {
    fn default() -> Self {
        Self {
            table: None,
            year_window: DEFAULT_YEAR_WINDOW,
            zero_score_defaults: BTreeMap::new(),
        }
    }
}

/// `[scoring]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub min_difficulty_std: f64,
    pub points_per_correct: f64,
    /// Worker threads; all cores when unset
    pub threads: Option<usize>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            min_difficulty_std: DEFAULT_MIN_DIFFICULTY_STD,
            points_per_correct: DEFAULT_POINTS_PER_CORRECT,
            threads: None,
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub omr: OmrOptions,
    pub historical: HistoricalSection,
    pub scoring: ScoringSection,
}

impl Config {
    /// `<config dir>/omr-tri/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load an explicit file; a missing file is an error
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Detection options with threshold ordering restored
    pub fn omr_options(&self) -> OmrOptions {
        self.omr.clone().normalized()
    }

    /// Table options with zero-score overrides merged over the built-ins
    pub fn historical_config(&self) -> HistoricalConfig {
        let mut defaults = ZeroScoreDefaults::default();
        defaults.0.extend(&self.historical.zero_score_defaults);
        HistoricalConfig {
            year_window: self.historical.year_window.max(1),
            zero_score_defaults: defaults,
        }
    }

    pub fn coherence_options(&self) -> CoherenceOptions {
        CoherenceOptions {
            min_difficulty_std: self.scoring.min_difficulty_std,
        }
    }

    /// Worker thread count, at least 1
    pub fn threads(&self) -> usize {
        self.scoring.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
