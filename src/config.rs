use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GREETING: &str = "Hi there! How can I help you today?";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the model service. Flags and `GEMINI_API_KEY` take precedence.
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    pub model: String,

    /// Root of the REST API, without the `/models/...` suffix
    pub base_url: String,

    /// Stream answers into the placeholder as they arrive
    pub stream: bool,

    /// First assistant entry of every conversation; empty for none
    pub greeting: String,

    /// Fixed strings shown by the conversation view
    pub texts: Texts,
}

/// Fixed user-facing strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Texts {
    /// Placeholder shown while a request is outstanding
    pub pending: String,
    /// Shown when the model answered with no text
    pub empty: String,
    /// Shown when the call failed for any reason
    pub error: String,
    /// Composer hint while the input buffer is empty
    pub input_placeholder: String,
}

impl Default for Texts {
    fn default() -> Self {
        Self {
            pending: "Typing...".to_string(),
            empty: "No response available".to_string(),
            error: "Oops! Something went wrong. Please try again.".to_string(),
            input_placeholder: "Type message here".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            stream: false,
            greeting: DEFAULT_GREETING.to_string(),
            texts: Texts::default(),
        }
    }
}

impl Config {
    /// `~/.parley`
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".parley"))
    }

    /// `~/.parley/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Key given on the command line or in the environment wins over the file.
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }

    /// Check if API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// API key with everything but the last four characters hidden
    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                let chars: Vec<char> = key.chars().collect();
                let visible = chars.len().min(4);
                let tail: String = chars[chars.len() - visible..].iter().collect();
                format!("{}{}", "*".repeat(chars.len() - visible), tail)
            }
            _ => "(not set)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.texts, Texts::default());
        assert!(!config.has_api_key());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = \"gemini-2.0-flash\"\n[texts]\npending = \"...\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.texts.pending, "...");
        assert_eq!(config.texts.error, Texts::default().error);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.stream = true;
        config.greeting = String::new();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(loaded.stream);
        assert_eq!(loaded.greeting, "");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn override_replaces_file_key_unless_blank() {
        let mut config = Config::default();
        config.api_key = Some("from-file".to_string());

        let kept = config.clone().with_api_key_override(Some("  ".to_string()));
        assert_eq!(kept.api_key.as_deref(), Some("from-file"));

        let replaced = config.with_api_key_override(Some("from-env".to_string()));
        assert_eq!(replaced.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn masks_all_but_tail() {
        let mut config = Config::default();
        assert_eq!(config.masked_api_key(), "(not set)");
        config.api_key = Some("abcdefgh".to_string());
        assert_eq!(config.masked_api_key(), "****efgh");
        config.api_key = Some("abc".to_string());
        assert_eq!(config.masked_api_key(), "abc");
    }
}
