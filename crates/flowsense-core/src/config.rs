//! Analysis options
//!
//! Options are plain serde structs so hosts can load them from the same JSON
//! file that configures their checkers. Every field has a default, so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataflowOptions {
    /// Inlining of direct calls with available bodies
    pub context_sensitivity: ContextSensitivity,
    /// Upper bound on block visits per solver run; hitting it stops iteration
    /// and the result is reported as not converged
    pub max_block_visits: usize,
}

impl Default for DataflowOptions {
    fn default() -> Self {
        Self {
            context_sensitivity: ContextSensitivity::default(),
            max_block_visits: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSensitivity {
    pub enabled: bool,
    /// Maximum number of inlined frames stacked on top of the analysed function
    pub max_depth: usize,
}

impl Default for ContextSensitivity {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: 2,
        }
    }
}

impl DataflowOptions {
    /// Options with inlining turned on up to `max_depth` frames
    pub fn with_inlining(max_depth: usize) -> Self {
        Self {
            context_sensitivity: ContextSensitivity {
                enabled: true,
                max_depth,
            },
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(content)?;
        Ok(options)
    }
}
