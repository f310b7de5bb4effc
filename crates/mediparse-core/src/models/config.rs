//! Configuration structures for the rules console.

use serde::{Deserialize, Serialize};

use super::rules::DEFAULT_TABLE_NAME;

/// Main configuration for mediparse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Backend API configuration.
    pub api: ApiConfig,

    /// Offline rule evaluation configuration.
    pub evaluation: EvaluationConfig,

    /// Rule editor configuration.
    pub editor: EditorConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend, without trailing slash.
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
        }
    }
}

/// Rule evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Header row used when a table type does not set one.
    pub default_header_row_index: usize,

    /// Trim whitespace around cell values.
    pub trim_cells: bool,

    /// Skip rows whose cells are all empty.
    pub skip_blank_rows: bool,

    /// Fill tax, cost estimate and validity from contract metadata.
    pub apply_contract_defaults: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            default_header_row_index: 0,
            trim_cells: true,
            skip_blank_rows: true,
            apply_contract_defaults: true,
        }
    }
}

/// Rule editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Name given to newly added table types.
    pub new_table_name: String,

    /// Name of the fallback table type created when detection yields nothing.
    pub default_table_name: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            new_table_name: "Neue Tabelle".to_string(),
            default_table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ConsoleConfig =
            serde_json::from_str(r#"{"api": {"token": "abc"}, "evaluation": {"trim_cells": false}}"#)
                .unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.token.as_deref(), Some("abc"));
        assert!(!config.evaluation.trim_cells);
        assert!(config.evaluation.skip_blank_rows);
        assert_eq!(config.editor.default_table_name, "Haupttabelle");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ConsoleConfig::default();
        config.api.base_url = "https://api.example.org".to_string();
        config.save(&path).unwrap();

        let loaded = ConsoleConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
