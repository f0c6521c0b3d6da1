use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::category::CategorizationMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing configuration section: [{0}]")]
    MissingSection(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: PathBuf,
    pub delimited: DelimitedConfig,
    pub limits: Limits,
    pub categorization: CategorizationConfig,
    pub sync: SyncConfig,
    pub aggregator: Option<AggregatorConfig>,
    pub extraction: Option<ExtractionConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("saldo.db"),
            delimited: DelimitedConfig::default(),
            limits: Limits::default(),
            categorization: CategorizationConfig::default(),
            sync: SyncConfig::default(),
            aggregator: None,
            extraction: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    /// Reads `path`, or returns the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn aggregator(&self) -> Result<&AggregatorConfig, ConfigError> {
        self.aggregator
            .as_ref()
            .ok_or(ConfigError::MissingSection("aggregator"))
    }

    pub fn extraction(&self) -> Result<&ExtractionConfig, ConfigError> {
        self.extraction
            .as_ref()
            .ok_or(ConfigError::MissingSection("extraction"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// Drop the first row only when its date column is not a date.
    #[default]
    Auto,
    Present,
    Absent,
}

/// Zero-based column positions for delimited files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub date: usize,
    pub description: usize,
    pub amount: usize,
    /// Textual credit/debit column; overrides the amount's sign when filled.
    pub kind: Option<usize>,
    pub balance: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            date: 0,
            description: 1,
            amount: 2,
            kind: Some(3),
            balance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedConfig {
    pub delimiter: char,
    pub header: HeaderMode,
    pub columns: ColumnMap,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            header: HeaderMode::Auto,
            columns: ColumnMap::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub delimited_max_bytes: usize,
    pub ofx_max_bytes: usize,
    pub extraction_upload_max_bytes: usize,
    /// Text beyond this is cut before it reaches the external transformer.
    pub extraction_forward_max_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            delimited_max_bytes: 10 * 1024 * 1024,
            ofx_max_bytes: 5 * 1024 * 1024,
            extraction_upload_max_bytes: 10 * 1024 * 1024,
            extraction_forward_max_bytes: 32 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizationConfig {
    pub mode: CategorizationMode,
    /// TOML file of `[[category]]` tables replacing the built-in dictionary.
    pub keywords_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timeout_secs: u64,
    pub detect_transfers: bool,
    pub transfer_window_days: u64,
    pub transfer_lookback_days: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            detect_transfers: true,
            transfer_window_days: 2,
            transfer_lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
}

fn default_extraction_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = EngineConfig::from_toml("").unwrap();
        assert_eq!(cfg.delimited.delimiter, ',');
        assert_eq!(cfg.delimited.columns.kind, Some(3));
        assert_eq!(cfg.limits.ofx_max_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.categorization.mode, CategorizationMode::Auto);
        assert!(cfg.aggregator.is_none());
        assert!(matches!(cfg.aggregator(), Err(ConfigError::MissingSection("aggregator"))));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml(
            r#"
database = "/var/lib/saldo/saldo.db"

[delimited]
delimiter = ";"
header = "present"

[delimited.columns]
date = 1
description = 2
amount = 4

[categorization]
mode = "safe"

[aggregator]
base_url = "https://api.pluggy.ai"
client_id = "id"
client_secret = "secret"
"#,
        )
        .unwrap();
        assert_eq!(cfg.database, PathBuf::from("/var/lib/saldo/saldo.db"));
        assert_eq!(cfg.delimited.delimiter, ';');
        assert_eq!(cfg.delimited.header, HeaderMode::Present);
        assert_eq!(cfg.delimited.columns.amount, 4);
        assert_eq!(cfg.delimited.columns.kind, Some(3));
        assert_eq!(cfg.categorization.mode, CategorizationMode::Safe);
        assert_eq!(cfg.sync.timeout_secs, 60);
        assert_eq!(cfg.aggregator().unwrap().client_id, "id");
    }

    #[test]
    fn load_missing_file_is_default() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/saldo.toml")).unwrap();
        assert_eq!(cfg.database, PathBuf::from("saldo.db"));
    }
}
