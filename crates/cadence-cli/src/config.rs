//! Configuration file support

use cadence_ai::{ModelConfig, Result as AiResult, get_api_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variables checked for the upstream key, in order
const API_KEY_VARS: &[&str] = &["CADENCE_API_KEY", "GITHUB_TOKEN"];

/// Configuration for cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream model id
    pub model: String,
    /// Upstream base URL
    pub base_url: String,
    /// Upstream API key (alternative to environment variables)
    pub api_key: Option<String>,
    /// Maximum output tokens per reply
    pub max_tokens: u32,
    /// Extra headers sent upstream
    pub headers: BTreeMap<String, String>,
    /// Port the relay listens on
    pub port: u16,
    /// Directory for session files
    pub data_dir: Option<PathBuf>,
    /// Relay address used by `cadence chat`
    pub relay_url: String,
    /// Length of a spoken pause
    pub pause_ms: u64,
    /// Command that speaks its last argument
    pub speak_command: String,
    /// Origins allowed to call the relay from a browser
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4.5".to_string(),
            base_url: "https://api.githubcopilot.com".to_string(),
            api_key: None,
            max_tokens: 1024,
            headers: BTreeMap::from([(
                "Copilot-Integration-Id".to_string(),
                "vscode-chat".to_string(),
            )]),
            port: 3001,
            data_dir: None,
            relay_url: "http://localhost:3001".to_string(),
            pause_ms: 600,
            speak_command: "espeak".to_string(),
            cors_allowed_origins: None,
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CADENCE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Upstream API key from config, then environment
    pub fn api_key(&self) -> AiResult<String> {
        get_api_key(self.api_key.as_deref(), API_KEY_VARS)
    }

    /// Listening port; `PORT` overrides the file
    pub fn port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.port)
    }

    /// Directory holding one file per session
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cadence")
                .join("sessions")
        })
    }

    /// Upstream model settings
    pub fn model_config(&self) -> ModelConfig {
        let mut model = ModelConfig::new(&self.model, &self.base_url);
        model.max_tokens = self.max_tokens;
        model.headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        model
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# cadence configuration file
# Place at ~/.config/cadence/config.toml (Linux) or set CADENCE_CONFIG_PATH

# Upstream model and endpoint (OpenAI-compatible chat completions)
model = "claude-haiku-4.5"
base_url = "https://api.githubcopilot.com"
max_tokens = 1024

# API key (optional - CADENCE_API_KEY or GITHUB_TOKEN are used otherwise)
# api_key = "..."

# Relay server
port = 3001
# data_dir = "/var/lib/cadence/sessions"
# cors_allowed_origins = ["http://localhost:5173"]

# Terminal client
relay_url = "http://localhost:3001"
pause_ms = 600
speak_command = "espeak"

# Extra headers sent upstream
[headers]
Copilot-Integration-Id = "vscode-chat"
"#
}
