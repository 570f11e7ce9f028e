//! Configuration management for Clip Captioner
//! Handles loading and saving settings to settings.json, optionally
//! sealed at rest (see `security`).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::security::{ProtectionMode, SettingsEnvelope};
use crate::types::SubtitleRemovalConfig;

/// Application configuration stored in settings.json
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// Google Gemini API keys (rotated round-robin per call)
    #[serde(default)]
    pub gemini_api_keys: Vec<String>,
    /// Generation model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Style prompt pre-filled into the TUI; empty means the built-in
    /// analysis prompt is used
    #[serde(default)]
    pub default_style_prompt: String,
    /// Maximum accepted upload size in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Subtitle removal defaults applied to newly created items
    #[serde(default)]
    pub subtitle_removal: SubtitleRemovalConfig,
    /// Send a desktop notification when a caption finishes
    #[serde(default = "default_notify")]
    pub notify_on_complete: bool,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_max_file_size_mb() -> u64 {
    500
}

fn default_notify() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_keys: Vec::new(),
            model: default_model(),
            default_style_prompt: String::new(),
            max_file_size_mb: default_max_file_size_mb(),
            subtitle_removal: SubtitleRemovalConfig::default(),
            notify_on_complete: true,
        }
    }
}

/// Configuration plus the protection mode it was stored under, so a
/// save round-trips without downgrading the seal.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: AppConfig,
    pub protection: ProtectionMode,
}

impl AppConfig {
    /// Configuration file name
    pub const CONFIG_PATH: &'static str = "settings.json";

    /// API keys with the environment credential, if set, taking priority
    pub fn api_keys_with_env(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(env_key) = std::env::var("GEMINI_API_KEY") {
            if !env_key.trim().is_empty() {
                keys.push(env_key);
            }
        }
        keys.extend(self.gemini_api_keys.iter().cloned());
        keys
    }

    /// Maximum upload size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Write a fresh default settings.json (plain, unprotected)
    pub fn create_default() -> Result<()> {
        let json = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(Self::CONFIG_PATH, json)?;
        Ok(())
    }
}

impl Settings {
    /// Load settings.json, creating a default file when absent. The file
    /// is either a plain `AppConfig` or a `SettingsEnvelope`; the
    /// password is only consulted for password-sealed envelopes.
    pub fn load(password: Option<&str>) -> Result<Self> {
        if !Path::new(AppConfig::CONFIG_PATH).exists() {
            AppConfig::create_default()?;
            log::info!("Created default {}", AppConfig::CONFIG_PATH);
        }

        let content = fs::read_to_string(AppConfig::CONFIG_PATH)
            .with_context(|| format!("Failed to read {}", AppConfig::CONFIG_PATH))?;

        parse_settings(&content, password)
    }

    /// Save, preserving the protection mode the settings were loaded
    /// under. Password mode requires the password again.
    pub fn save(&self, password: Option<&str>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config)?;
        let on_disk = match self.protection {
            ProtectionMode::None => json,
            mode => {
                let envelope = SettingsEnvelope::seal(&json, mode, password)?;
                serde_json::to_string_pretty(&envelope)?
            }
        };
        fs::write(AppConfig::CONFIG_PATH, on_disk)?;
        Ok(())
    }
}

/// Parse either on-disk representation.
fn parse_settings(content: &str, password: Option<&str>) -> Result<Settings> {
    // An envelope always carries "mode" and "data"; a plain config never
    // has a "data" field.
    if let Ok(envelope) = serde_json::from_str::<SettingsEnvelope>(content) {
        let plain = envelope.unseal(password)?;
        let config: AppConfig = serde_json::from_str(&plain)
            .map_err(|e| anyhow!("Failed to parse unsealed settings: {}", e))?;
        return Ok(Settings {
            config,
            protection: envelope.mode,
        });
    }

    let config: AppConfig = serde_json::from_str(content)
        .map_err(|e| anyhow!("Failed to parse {}: {}", AppConfig::CONFIG_PATH, e))?;
    Ok(Settings {
        config,
        protection: ProtectionMode::None,
    })
}
