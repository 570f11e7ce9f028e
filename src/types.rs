//! Shared data types for Clip Captioner

use serde::{Deserialize, Serialize};

/// Opaque identifier for an upload item. Assigned once at intake,
/// never reused for the lifetime of the process.
pub type ItemId = u64;

/// Lifecycle of the caption (text generation) track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionStatus {
    /// Dormant, no work scheduled
    #[default]
    Idle,
    /// Item created, payload not yet sent anywhere
    Preparing,
    /// Streaming call to the generation service is underway
    Analyzing,
    /// Stream finished without error
    Completed,
    /// Generation failed; the item carries a mapped error message
    Error,
}

/// Lifecycle of the (simulated) subtitle removal track,
/// independent of the caption track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    /// Reserved for a real job runner; the simulated task never fails
    #[allow(dead_code)]
    Error,
}

/// How hard the subtitle removal pass should scrub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    /// Smart in-fill
    #[default]
    Standard,
    /// Forceful erase, slower
    Aggressive,
}

/// Which part of the frame the removal pass searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleArea {
    /// Bottom strip only
    #[default]
    Bottom,
    /// Full-frame search
    Full,
}

/// Subtitle removal settings. A copy of the current global value is
/// frozen onto each item at creation time; later edits to the global
/// defaults never touch already-created items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleRemovalConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: SubtitleMode,
    #[serde(default)]
    pub area: SubtitleArea,
}

impl Default for SubtitleRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SubtitleMode::Standard,
            area: SubtitleArea::Bottom,
        }
    }
}

impl SubtitleMode {
    pub fn label(&self) -> &'static str {
        match self {
            SubtitleMode::Standard => "Standard",
            SubtitleMode::Aggressive => "Aggressive",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SubtitleMode::Standard => SubtitleMode::Aggressive,
            SubtitleMode::Aggressive => SubtitleMode::Standard,
        }
    }
}

impl SubtitleArea {
    pub fn label(&self) -> &'static str {
        match self {
            SubtitleArea::Bottom => "Bottom",
            SubtitleArea::Full => "Full frame",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SubtitleArea::Bottom => SubtitleArea::Full,
            SubtitleArea::Full => SubtitleArea::Bottom,
        }
    }
}

/// Application version constant
pub const APP_VERSION: &str = "0.9.2";

/// Application name constant
pub const APP_NAME: &str = "Clip Captioner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_config_defaults() {
        let config = SubtitleRemovalConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.mode, SubtitleMode::Standard);
        assert_eq!(config.area, SubtitleArea::Bottom);
    }

    #[test]
    fn test_subtitle_config_lowercase_wire_format() {
        let config = SubtitleRemovalConfig {
            enabled: true,
            mode: SubtitleMode::Aggressive,
            area: SubtitleArea::Full,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"aggressive\""));
        assert!(json.contains("\"full\""));

        let parsed: SubtitleRemovalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_subtitle_config_missing_fields_fall_back() {
        let parsed: SubtitleRemovalConfig = serde_json::from_str("{\"enabled\": true}").unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.mode, SubtitleMode::Standard);
        assert_eq!(parsed.area, SubtitleArea::Bottom);
    }
}
