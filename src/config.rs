//! Configuration management for schema stores
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (marshal.toml)
//! - Environment variables (SCHEMA_MARSHAL__*)
//!
//! ## Example config file (marshal.toml):
//! ```toml
//! [store]
//! path = "./data/schemas.bin"
//! sync_on_save = true
//!
//! [codec]
//! max_depth = 64
//! max_len = 67108864
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::CodecLimits;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// Registry file settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Structural codec settings
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Registry file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the registry file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// fsync the temp file before it replaces the registry
    #[serde(default = "default_true")]
    pub sync_on_save: bool,
}

/// Decoding limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Maximum nesting depth of a payload
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum length of any string, array or object in a payload
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("schemas.bin")
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    CodecLimits::default().max_depth
}

fn default_max_len() -> usize {
    CodecLimits::default().max_len
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            sync_on_save: true,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_len: default_max_len(),
        }
    }
}

impl CodecConfig {
    pub fn limits(&self) -> CodecLimits {
        CodecLimits {
            max_depth: self.max_depth,
            max_len: self.max_len,
        }
    }
}

impl MarshalConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["marshal.toml", ".marshal.toml", "config/marshal.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-marshal") {
            let xdg_config = config_dir.config_dir().join("marshal.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_MARSHAL__STORE__PATH=...
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_MARSHAL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = MarshalConfig::default();
        assert!(config.store.sync_on_save);
        assert_eq!(config.store.path, PathBuf::from("schemas.bin"));
        assert_eq!(config.codec.limits(), CodecLimits::default());
    }

    #[test]
    fn test_serialize_config() {
        let config = MarshalConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[codec]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[store]\npath = \"elsewhere.bin\"\n\n[codec]\nmax_depth = 8\n").unwrap();

        let config = MarshalConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.store.path, PathBuf::from("elsewhere.bin"));
        assert!(config.store.sync_on_save);
        assert_eq!(config.codec.max_depth, 8);
        assert_eq!(config.codec.max_len, CodecLimits::default().max_len);
    }
}
