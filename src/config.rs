use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default agent address
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the agent server
    pub endpoint: String,

    /// Path of the chat route on the agent server
    pub chat_path: String,

    /// Sent as `X-API-Key` when present
    pub api_key: Option<String>,

    /// Seconds to wait for the TCP/TLS connection
    pub connect_timeout_secs: u64,

    /// Session storage settings
    pub storage: StorageConfig,

    /// UI preferences and strings
    pub ui: UiConfig,
}

/// Where the session transcript lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key holding the serialized transcript
    pub key: String,
    /// Parent directory of per-session folders
    pub root: PathBuf,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Shown as a non-persisted agent turn when the request fails
    pub error_message: String,
    pub copy_label: String,
    pub copied_label: String,
    pub typing_label: String,
    /// Oldest displayed turns are dropped past this count
    pub max_messages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            chat_path: "/chat".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            storage: StorageConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            key: "chatHistory".to_string(),
            root: std::env::temp_dir().join("streamchat").join("sessions"),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            error_message: "Error: No se pudo conectar con el agente.".to_string(),
            copy_label: "Copiar".to_string(),
            copied_label: "¡Copiado!".to_string(),
            typing_label: "El agente está escribiendo".to_string(),
            max_messages: 500,
        }
    }
}

impl Config {
    /// Location of the user's config file
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".streamchat").join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = Self::from_file(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Environment overrides. `AGENT_API_KEY` is what the agent server reads
    /// its own key from, so it is honored as a fallback.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("STREAMCHAT_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }

        let key = lookup("STREAMCHAT_API_KEY")
            .or_else(|| lookup("AGENT_API_KEY"))
            .filter(|v| !v.trim().is_empty());
        if key.is_some() {
            self.api_key = key;
        }
    }

    /// Full URL of the chat route
    pub fn chat_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if self.chat_path.starts_with('/') {
            format!("{}{}", base, self.chat_path)
        } else {
            format!("{}/{}", base, self.chat_path)
        }
    }

    /// Directory holding one session's storage
    ///
    /// Ids are restricted to ASCII letters, digits, `-` and `_` so they
    /// always name a direct child of the storage root.
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            bail!("Invalid session id {session_id:?}: use letters, digits, '-' or '_'");
        }
        Ok(self.storage.root.join(session_id))
    }
}
