//! Configuration for the sift engine.
//!
//! Config file resolution order for [`Config::load`]:
//! 1. SIFT_CONFIG environment variable
//! 2. Platform config directory (e.g. ~/.config/sift/config.toml)
//! 3. Built-in defaults
//!
//! ```toml
//! and_ops = ["and", "AND", "&&"]
//! or_ops = ["or", "OR", "||"]
//! default_namespace = "builtin.tests"
//!
//! [prefixes]
//! x = "sift.extra"
//!
//! [default_bindings]
//! today = "2024-01-01"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Environment variable pointing at an explicit config file.
pub const SIFT_CONFIG_VAR: &str = "SIFT_CONFIG";

/// Engine configuration shared by every query compiled against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Literals recognized as the AND operator.
    #[serde(default = "default_and_ops")]
    pub and_ops: Vec<String>,

    /// Literals recognized as the OR operator.
    #[serde(default = "default_or_ops")]
    pub or_ops: Vec<String>,

    /// Namespace for unqualified predicate names (`namespace.subspace`).
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Short prefixes expanded to a full namespace (`x.leaf` -> `sift.extra.leaf`).
    #[serde(default = "default_prefixes")]
    pub prefixes: BTreeMap<String, String>,

    /// Named bindings available to every query; caller bindings win.
    #[serde(default)]
    pub default_bindings: BTreeMap<String, Value>,
}

fn default_and_ops() -> Vec<String> {
    vec!["and".to_string(), "AND".to_string(), "&&".to_string()]
}

fn default_or_ops() -> Vec<String> {
    vec!["or".to_string(), "OR".to_string(), "||".to_string()]
}

fn default_namespace() -> String {
    "builtin.tests".to_string()
}

fn default_prefixes() -> BTreeMap<String, String> {
    BTreeMap::from([("x".to_string(), "sift.extra".to_string())])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            and_ops: default_and_ops(),
            or_ops: default_or_ops(),
            default_namespace: default_namespace(),
            prefixes: default_prefixes(),
            default_bindings: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config using the standard resolution order.
    pub fn load() -> Result<Self> {
        match resolve_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from a TOML file, or return defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse config from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.and_ops.is_empty() || self.or_ops.is_empty() {
            return Err(Error::Config("and_ops and or_ops must not be empty".to_string()));
        }
        if let Some(op) = self.and_ops.iter().find(|op| self.or_ops.contains(op)) {
            return Err(Error::Config(format!("'{}' is both an and and an or operator", op)));
        }
        if self.and_ops.iter().chain(&self.or_ops).any(|op| op.is_empty() || op.contains(char::is_whitespace)) {
            return Err(Error::Config("operators must be non-empty and contain no whitespace".to_string()));
        }
        if two_segments(&self.default_namespace).is_none() {
            return Err(Error::Config(format!(
                "default_namespace '{}' must look like 'namespace.subspace'",
                self.default_namespace
            )));
        }
        for (prefix, namespace) in &self.prefixes {
            if prefix.is_empty() || prefix.contains('.') || two_segments(namespace).is_none() {
                return Err(Error::Config(format!("Invalid prefix mapping '{}' = '{}'", prefix, namespace)));
            }
        }
        Ok(())
    }
}

fn two_segments(namespace: &str) -> Option<(&str, &str)> {
    let (first, second) = namespace.split_once('.')?;
    if first.is_empty() || second.is_empty() || second.contains('.') {
        return None;
    }
    Some((first, second))
}

/// Resolve the config file path, if any location applies.
fn resolve_config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(path) = std::env::var(SIFT_CONFIG_VAR) {
        return Some(PathBuf::from(path));
    }

    // 2. Platform config directory (via directories crate)
    ProjectDirs::from("", "", "sift").map(|dirs| dirs.config_dir().join("config.toml"))
}
