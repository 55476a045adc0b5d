//! Runtime configuration loading.
//!
//! Configuration lives in `$XDG_CONFIG_HOME/spellbridge/config.toml`. Every
//! table is optional; missing values fall back to their defaults.
//!
//! ```toml
//! [logger]
//! default_level = "info"
//! format = "text"
//! enable_debug = true
//! enable_structure = true
//! components = ["agent", "tools"]
//! output_target = "stderr"
//!
//! [logger.attributes]
//! service = "spellbridge"
//!
//! [policy]
//! default_allow = false
//! denied_bridges = ["shell"]
//!
//! [policy.grants]
//! script_logger = ["memory", "storage"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};
use crate::permission::PolicyConfig;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Settings for the unified logging bridge.
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Registration policy.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Logger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Level used when a call does not name one (debug, info, warn, error)
    /// Default: "info"
    pub default_level: String,
    /// Output format (text, json)
    /// Default: "text"
    pub format: String,
    /// Route component messages to the debug bridge
    pub enable_debug: bool,
    /// Route records to the structured bridge
    pub enable_structure: bool,
    /// Components enabled at startup
    pub components: Vec<String>,
    /// Where records are written
    /// Default: "stderr"
    pub output_target: String,
    /// Attributes attached to every record
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            format: "text".to_string(),
            enable_debug: true,
            enable_structure: true,
            components: Vec::new(),
            output_target: "stderr".to_string(),
            attributes: HashMap::new(),
        }
    }
}

/// Accepted log level names.
pub const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Accepted output formats.
pub const LOG_FORMATS: [&str; 2] = ["text", "json"];

impl LoggerSettings {
    pub fn validate(&self) -> BridgeResult<()> {
        if !LOG_LEVELS.contains(&self.default_level.as_str()) {
            return Err(BridgeError::InvalidConfig(format!(
                "Invalid logger.default_level: {}. Must be one of: {}",
                self.default_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if !LOG_FORMATS.contains(&self.format.as_str()) {
            return Err(BridgeError::InvalidConfig(format!(
                "Invalid logger.format: {}. Must be one of: {}",
                self.format,
                LOG_FORMATS.join(", ")
            )));
        }
        if self.components.iter().any(|c| c.trim().is_empty()) {
            return Err(BridgeError::InvalidConfig(
                "logger.components must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

impl RuntimeConfig {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> BridgeResult<Self> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the specified path.
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load configuration from the default XDG config location.
    ///
    /// A missing file yields the default configuration.
    pub fn load_default() -> BridgeResult<Self> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn default_config_path() -> BridgeResult<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "spellbridge").ok_or_else(
            || BridgeError::InvalidConfig("Could not determine config directory".to_string()),
        )?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> BridgeResult<()> {
        self.logger.validate()?;

        for (bridge_id, kinds) in &self.policy.grants {
            if bridge_id.is_empty() {
                return Err(BridgeError::InvalidConfig(
                    "policy.grants keys must be bridge ids".to_string(),
                ));
            }
            if kinds.iter().any(|k| k.is_empty()) {
                return Err(BridgeError::InvalidConfig(format!(
                    "Bridge '{bridge_id}': granted permission types must not be empty"
                )));
            }
        }
        Ok(())
    }
}
