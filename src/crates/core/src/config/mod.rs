//! Configuration
//!
//! TOML config file with per-field fallback to built-in defaults.
//! Lookup order for each field: explicit caller override (CLI flag),
//! config file, default.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::session::history::DEFAULT_HISTORY_CAP;

/// Runtime configuration of a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base address of the inference server.
    pub base_url: String,
    /// Chat completion model.
    pub model: String,
    /// Image captioning model.
    pub vision_model: String,
    /// Finalized turns retained before FIFO eviction.
    pub history_cap: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            vision_model: "minicpm-v".to_string(),
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// On-disk shape of the config file; every field optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    model: Option<String>,
    vision_model: Option<String>,
    history_cap: Option<usize>,
}

impl ChatConfig {
    /// Default location: `<config-dir>/skiff/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("skiff").join("config.toml"))
    }

    /// Load configuration from the given file, falling back to defaults
    /// for absent fields. A missing file yields the defaults; a
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, toml::de::Error> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("no config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
        };
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(raw)?;
        let defaults = Self::default();
        Ok(Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            model: file.model.unwrap_or(defaults.model),
            vision_model: file.vision_model.unwrap_or(defaults.vision_model),
            history_cap: file.history_cap.unwrap_or(defaults.history_cap),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ChatConfig::from_toml_str("").unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let config = ChatConfig::from_toml_str(
            r#"
            model = "deepseek-coder-v2:lite"
            history_cap = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "deepseek-coder-v2:lite");
        assert_eq!(config.history_cap, 20);
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.vision_model, "minicpm-v");
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(ChatConfig::from_toml_str("model = [not toml").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ChatConfig::load(Path::new("/nonexistent/skiff/config.toml")).unwrap();
        assert_eq!(config, ChatConfig::default());
    }
}
