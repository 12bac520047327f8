use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api_base_url`
pub const API_URL_ENV: &str = "LOCALAI_API_URL";

pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
pub const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);
pub const TOP_K_RANGE: (u32, u32) = (1, 100);
pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 32768);

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend API, e.g. `http://localhost:8000/api`
    pub api_base_url: String,

    /// Seconds allowed to establish a connection
    pub connect_timeout_secs: u64,

    /// Seconds allowed for a complete non-streaming request
    pub request_timeout_secs: u64,

    /// Seconds allowed between two byte ranges of a streamed response
    pub stream_idle_timeout_secs: u64,

    /// Interval for refreshing the conversation index and dashboard
    pub poll_interval_secs: u64,

    /// Client-local chat settings
    pub settings: Settings,

    /// Directory holding config and logs; not serialized
    #[serde(skip)]
    pub home: PathBuf,
}

/// Settings edited from the settings panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    pub stream_responses: bool,
    pub theme: String,
    pub auto_save: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_model: "dolphin-mistral".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 2048,
            stream_responses: true,
            theme: "dark".to_string(),
            auto_save: true,
        }
    }
}

impl Settings {
    /// Clamp sampling parameters into the ranges the backend accepts
    pub fn clamp(&mut self) {
        self.temperature = self.temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        self.top_p = self.top_p.clamp(TOP_P_RANGE.0, TOP_P_RANGE.1);
        self.top_k = self.top_k.clamp(TOP_K_RANGE.0, TOP_K_RANGE.1);
        self.max_tokens = self.max_tokens.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1);
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "http://localhost:8000/api".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 120,
            poll_interval_secs: 30,
            settings: Settings::default(),
            home: default_home(),
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".localai")
}

impl Config {
    /// Load configuration from `~/.localai/config.toml`, creating the directory
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?.join(".localai");
        fs::create_dir_all(&home).context("Failed to create .localai directory")?;

        let mut config = Self::load_from(&home.join("config.toml"))?;
        config.home = home;

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }

        Ok(config)
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.settings.clamp();
        if let Some(parent) = path.parent() {
            config.home = parent.to_path_buf();
        }
        Ok(config)
    }

    /// Persist only the chat settings, leaving other keys as they are on disk
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.home).context("Failed to create .localai directory")?;
        let path = self.config_path();
        let mut on_disk = Self::load_from(&path)?;
        on_disk.settings = settings.clone();
        on_disk.save_to(&path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("localai.log")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
