//! TOML configuration file loading
//!
//! Supports `~/.config/portfolio-chat/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: ApiFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub widget: WidgetFileConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL the endpoint paths are joined onto
    pub base_url: Option<String>,
    pub chat_path: Option<String>,
    pub transcribe_path: Option<String>,
    pub speak_path: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Voice capture and playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Level below which input counts as quiet
    pub silence_threshold: Option<f32>,
    /// Quiet time that ends a recording
    pub silence_duration_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub fft_size: Option<usize>,
    pub smoothing: Option<f32>,
    /// Speak replies to voice questions
    pub auto_speak: Option<bool>,
    pub speak_while_recording: Option<bool>,
    /// Play synthesized speech without an explicit play command
    pub autoplay: Option<bool>,
    pub sample_rate: Option<u32>,
}

/// Widget presentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct WidgetFileConfig {
    /// Viewport width below which the layout is narrow
    pub narrow_breakpoint: Option<f64>,
    pub collapsed_height: Option<f64>,
    pub expanded_placeholder: Option<String>,
    pub teaser_phrases: Option<Vec<String>>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/portfolio-chat/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("portfolio-chat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_overlay_parses() {
        let file = parse_config_file(
            r#"
            [api]
            base_url = "https://example.dev/api"

            [voice]
            autoplay = false
            "#,
        )
        .unwrap();

        assert_eq!(file.api.base_url.as_deref(), Some("https://example.dev/api"));
        assert_eq!(file.api.chat_path, None);
        assert_eq!(file.voice.autoplay, Some(false));
        assert!(file.widget.teaser_phrases.is_none());
    }

    #[test]
    fn test_wrong_type_rejected() {
        assert!(parse_config_file("[voice]\nautoplay = \"yes\"\n").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let file = load_config_file_from(Path::new("/nonexistent/portfolio-chat.toml"));
        assert!(file.api.base_url.is_none());
    }
}
