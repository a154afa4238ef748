use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub station: StationSection,
}

/// Where the hosted config document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// http(s):// or file:// URL of the config document.
    #[serde(default = "default_config_url")]
    pub url: String,
    /// Optional bearer token for the admin station API.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// The station to watch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationSection {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub short_code: String,
    #[serde(default)]
    pub default_dj: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            url: default_config_url(),
            api_key: None,
        }
    }
}

fn default_config_url() -> String {
    "https://raw.githubusercontent.com/joemcmahon/radiospiral-config/master/config.json"
        .to_string()
}

impl WatchConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("azura-watch")
            .join("config.toml")
    }
}
