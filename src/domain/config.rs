use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ValidationLimits, WbsStrategy, change_tracker::DEFAULT_DEPTH};

/// Configuration for the estimate engine.
///
/// This struct holds the settings that tune validation, the undo history and
/// the default WBS view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Number of undo (and redo) levels kept.
    undo_depth: usize,

    /// Maximum length of `Text`, in characters.
    max_text_len: usize,

    /// Maximum length of `LongText`, in characters.
    max_long_text_len: usize,

    /// Largest tolerated difference between `Sum` and `QtyResult * Up`.
    sum_tolerance: f64,

    /// Whether long texts are checked with the writing heuristics.
    pub check_long_text: bool,

    /// How the root level of the WBS view is ordered.
    pub wbs_strategy: WbsStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_DEPTH,
            max_text_len: default_max_text_len(),
            max_long_text_len: default_max_long_text_len(),
            sum_tolerance: default_sum_tolerance(),
            check_long_text: true,
            wbs_strategy: WbsStrategy::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns the number of undo levels.
    #[must_use]
    pub const fn undo_depth(&self) -> usize {
        self.undo_depth
    }

    /// Sets the number of undo levels. Zero is raised to one.
    pub fn set_undo_depth(&mut self, depth: usize) {
        self.undo_depth = depth.max(1);
    }

    /// The validation thresholds described by this configuration.
    #[must_use]
    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_text_len: self.max_text_len,
            max_long_text_len: self.max_long_text_len,
            sum_tolerance: self.sum_tolerance,
            check_long_text: self.check_long_text,
        }
    }
}

const fn default_undo_depth() -> usize {
    DEFAULT_DEPTH
}

const fn default_max_text_len() -> usize {
    255
}

const fn default_max_long_text_len() -> usize {
    2000
}

const fn default_sum_tolerance() -> f64 {
    0.01
}

const fn default_true() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_undo_depth")]
        undo_depth: usize,

        #[serde(default = "default_max_text_len")]
        max_text_len: usize,

        #[serde(default = "default_max_long_text_len")]
        max_long_text_len: usize,

        /// Tolerance used when comparing `Sum` against `QtyResult * Up`.
        #[serde(default = "default_sum_tolerance")]
        sum_tolerance: f64,

        #[serde(default = "default_true")]
        check_long_text: bool,

        #[serde(default)]
        wbs_strategy: WbsStrategy,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                undo_depth,
                max_text_len,
                max_long_text_len,
                sum_tolerance,
                check_long_text,
                wbs_strategy,
            } => Self {
                undo_depth: undo_depth.max(1),
                max_text_len,
                max_long_text_len,
                sum_tolerance,
                check_long_text,
                wbs_strategy,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            undo_depth: config.undo_depth,
            max_text_len: config.max_text_len,
            max_long_text_len: config.max_long_text_len,
            sum_tolerance: config.sum_tolerance,
            check_long_text: config.check_long_text,
            wbs_strategy: config.wbs_strategy,
        }
    }
}
