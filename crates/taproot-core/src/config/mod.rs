//! Settings store with file persistence
//!
//! Holds app preferences and the disabled-plugin set. The file is read
//! once at startup and written back when the user toggles something.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Taproot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app: AppSettings,
    pub plugins: PluginSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub theme: String,
    pub auto_sync_on_startup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_date: Option<DateTime<Utc>>,
}

/// Per-plugin toggles. A plugin whose id appears in `disabled` is never
/// constructed or activated at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSettings {
                theme: "dark".to_string(),
                auto_sync_on_startup: true,
                last_sync_date: None,
            },
            plugins: PluginSettings::default(),
        }
    }
}

impl Settings {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("TAPROOT_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("taproot")
        };
        Ok(dir)
    }

    /// Get the settings file path
    pub fn settings_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.toml"))
    }

    /// Load settings from file, or return defaults if the file doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::settings_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            let settings: Settings = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to file
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::settings_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    /// Whether a plugin id is currently disabled
    pub fn is_plugin_disabled(&self, plugin_id: &str) -> bool {
        self.plugins.disabled.iter().any(|id| id == plugin_id)
    }

    /// Disable a plugin id. Returns false if it was already disabled.
    pub fn disable_plugin(&mut self, plugin_id: &str) -> bool {
        if self.is_plugin_disabled(plugin_id) {
            return false;
        }
        self.plugins.disabled.push(plugin_id.to_string());
        true
    }

    /// Enable a plugin id. Returns false if it was not disabled.
    pub fn enable_plugin(&mut self, plugin_id: &str) -> bool {
        let before = self.plugins.disabled.len();
        self.plugins.disabled.retain(|id| id != plugin_id);
        self.plugins.disabled.len() != before
    }

    /// Get a settings value by dotted key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "app.theme" => Ok(self.app.theme.clone()),
            "app.auto_sync_on_startup" => Ok(self.app.auto_sync_on_startup.to_string()),
            "app.last_sync_date" => Ok(self
                .app
                .last_sync_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "(never)".to_string())),
            "plugins.disabled" => Ok(self.plugins.disabled.join(", ")),
            _ => Err(anyhow!(
                "Unknown settings key: {}. Use `taproot config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a settings value by dotted key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "app.theme" => {
                self.app.theme = value.to_string();
            }
            "app.auto_sync_on_startup" => {
                self.app.auto_sync_on_startup = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "plugins.disabled" => {
                self.plugins.disabled = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => {
                return Err(anyhow!(
                    "Unknown or read-only settings key: {}. Use `taproot config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }
}
