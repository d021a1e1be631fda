//! Loader configuration.
//!
//! Every section has defaults, so a JSON file only needs to name the values
//! it changes.

use crate::error::{Result, RomError};
use crate::io::IOLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Master configuration for image loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// File size limits for images and definitions.
    pub io: IOLimits,
    /// XML parser options for definition files.
    pub parser: ParserConfig,
    /// Inheritance resolution limits.
    pub inheritance: InheritanceConfig,
    /// Checksum handling during load.
    pub checksum: ChecksumConfig,
}

impl LoaderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RomError::Config(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RomError::Config(e.to_string()))
    }

    /// Load a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// XML parser options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Accept documents carrying a DTD.
    pub allow_dtd: bool,
    /// Maximum number of XML nodes per definition file.
    pub nodes_limit: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allow_dtd: false,
            nodes_limit: u32::MAX,
        }
    }
}

impl ParserConfig {
    pub(crate) fn parsing_options(&self) -> roxmltree::ParsingOptions {
        roxmltree::ParsingOptions {
            allow_dtd: self.allow_dtd,
            nodes_limit: self.nodes_limit,
            ..roxmltree::ParsingOptions::default()
        }
    }
}

/// Limits for `base` chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InheritanceConfig {
    /// Longest acyclic chain accepted before giving up.
    pub max_depth: usize,
}

impl Default for InheritanceConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
    /// Validate the checksum table right after a rom is loaded.
    pub validate_on_load: bool,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            validate_on_load: true,
        }
    }
}
