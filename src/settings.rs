use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings operations
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Setting not found: {0}")]
    SettingNotFound(String),
}

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Settings file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl SettingsFormat {
    /// Detect the format from a file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            match ext.as_str() {
                "toml" => Some(Self::Toml),
                "json" => Some(Self::Json),
                _ => None,
            }
        })
    }
}

/// Settings for the crawler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Raw settings as key-value pairs
    #[serde(flatten)]
    pub raw: HashMap<String, serde_json::Value>,

    /// Path to the settings file, if loaded from a file
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl Settings {
    /// Create a new empty settings object
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a file, detecting the format from its extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path)
            .ok_or_else(|| SettingsError::UnknownFormat(path.to_string_lossy().to_string()))?;

        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut settings = match format {
            SettingsFormat::Toml => Self::from_toml(&contents)?,
            SettingsFormat::Json => Self::from_json(&contents)?,
        };

        settings.file_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: HashMap<String, serde_json::Value> =
            toml::from_str(contents).map_err(|e| SettingsError::TomlParse(e.to_string()))?;
        Ok(Self {
            raw,
            file_path: None,
        })
    }

    /// Load settings from JSON
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(contents)?;
        Ok(Self {
            raw,
            file_path: None,
        })
    }

    /// Get a setting as a specific type
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T> {
        self.raw
            .get(key)
            .ok_or_else(|| SettingsError::SettingNotFound(key.to_string()))
            .and_then(|value| {
                serde_json::from_value(value.clone()).map_err(SettingsError::JsonParse)
            })
    }

    /// Get a setting with a default value
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Set a setting
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(SettingsError::JsonParse)?;
        self.raw.insert(key.to_string(), value);
        Ok(())
    }

    /// Check if a setting exists
    pub fn contains(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    /// Get all settings
    pub fn all(&self) -> &HashMap<String, serde_json::Value> {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_toml() {
        let toml = r#"
            concurrent_requests = 8
            user_agent = "trawler/0.1.0"
            log_stats = true
        "#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.get::<usize>("concurrent_requests").unwrap(), 8);
        assert_eq!(settings.get::<String>("user_agent").unwrap(), "trawler/0.1.0");
        assert!(settings.get::<bool>("log_stats").unwrap());
    }

    #[test]
    fn test_from_json() {
        let json = r#"
        {
            "concurrent_requests": 8,
            "user_agent": "trawler/0.1.0",
            "log_stats": true
        }
        "#;

        let settings = Settings::from_json(json).unwrap();

        assert_eq!(settings.get::<usize>("concurrent_requests").unwrap(), 8);
        assert!(settings.get::<bool>("log_stats").unwrap());
    }

    #[test]
    fn test_from_file_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "request_timeout = 10").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.get::<u64>("request_timeout").unwrap(), 10);
        assert!(settings.file_path.is_some());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = Settings::from_file("settings.ini").unwrap_err();
        assert!(matches!(err, SettingsError::UnknownFormat(_)));
    }

    #[test]
    fn test_get_or_and_set() {
        let mut settings = Settings::new();
        assert_eq!(settings.get_or("max_open_spiders", 1usize), 1);

        settings.set("max_open_spiders", 4usize).unwrap();
        assert!(settings.contains("max_open_spiders"));
        assert_eq!(settings.get_or("max_open_spiders", 1usize), 4);
    }
}
