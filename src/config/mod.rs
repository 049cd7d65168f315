//! Configuration management for the chat widget
//!
//! Values come from defaults, overlaid by the TOML file, overlaid by
//! `PORTFOLIO_CHAT_*` environment variables.

pub mod file;

use std::time::Duration;

use crate::voice::{SAMPLE_RATE, SilenceSettings};
use crate::{Error, Result};

use self::file::ConfigFile;

/// Default backend base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Viewport width (CSS px) below which the layout counts as narrow
pub const DEFAULT_NARROW_BREAKPOINT: f64 = 768.0;

/// Placeholder shown once the widget is expanded
pub const DEFAULT_EXPANDED_PLACEHOLDER: &str = "Ask something about Fran...";

/// Phrases cycled through by the collapsed prompt bar
pub const DEFAULT_TEASER_PHRASES: [&str; 4] = [
    "Ask me about my AI stack...",
    "Ask me about my biggest failure...",
    "Ask me about TestGorilla...",
    "Ask about Emendu's operations...",
];

/// Widget configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub voice: VoiceConfig,
    pub widget: WidgetConfig,
}

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub chat_path: String,
    pub transcribe_path: String,
    pub speak_path: String,
    /// Applies to connection setup only; reply streams are never cut short
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/chat".to_string(),
            transcribe_path: "/transcribe".to_string(),
            speak_path: "/speak".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    /// Config pointing every endpoint at `base_url`
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Join `path` onto the base URL with exactly one slash between them
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn chat_url(&self) -> String {
        self.endpoint(&self.chat_path)
    }

    #[must_use]
    pub fn transcribe_url(&self) -> String {
        self.endpoint(&self.transcribe_path)
    }

    #[must_use]
    pub fn speak_url(&self) -> String {
        self.endpoint(&self.speak_path)
    }
}

/// Voice input/output behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub silence: SilenceSettings,
    /// Speak the reply to a voice-originated question
    pub auto_speak: bool,
    /// Allow synthesized speech to start while a recording is running
    pub speak_while_recording: bool,
    /// Play synthesized speech without waiting for an explicit play
    pub autoplay: bool,
    /// Preferred capture sample rate
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence: SilenceSettings::default(),
            auto_speak: true,
            speak_while_recording: false,
            autoplay: true,
            sample_rate: SAMPLE_RATE,
        }
    }
}

/// Widget presentation
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    pub narrow_breakpoint: f64,
    /// Height of the collapsed prompt bar
    pub collapsed_height: f64,
    pub expanded_placeholder: String,
    pub teaser_phrases: Vec<String>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            narrow_breakpoint: DEFAULT_NARROW_BREAKPOINT,
            collapsed_height: 80.0,
            expanded_placeholder: DEFAULT_EXPANDED_PLACEHOLDER.to_string(),
            teaser_phrases: DEFAULT_TEASER_PHRASES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed or the result
    /// is invalid
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default = Self::default();

        let api = {
            let d = default.api;
            ApiConfig {
                base_url: env("PORTFOLIO_CHAT_API_URL")
                    .or(fc.api.base_url)
                    .unwrap_or(d.base_url),
                chat_path: fc.api.chat_path.unwrap_or(d.chat_path),
                transcribe_path: fc.api.transcribe_path.unwrap_or(d.transcribe_path),
                speak_path: fc.api.speak_path.unwrap_or(d.speak_path),
                connect_timeout: fc
                    .api
                    .connect_timeout_ms
                    .map_or(d.connect_timeout, Duration::from_millis),
            }
        };

        let voice = {
            let d = default.voice;
            let v = fc.voice;
            let silence = SilenceSettings {
                threshold: parse_env(&env, "PORTFOLIO_CHAT_SILENCE_THRESHOLD")?
                    .or(v.silence_threshold)
                    .unwrap_or(d.silence.threshold),
                window: v
                    .silence_duration_ms
                    .map_or(d.silence.window, Duration::from_millis),
                grace_period: v
                    .grace_period_ms
                    .map_or(d.silence.grace_period, Duration::from_millis),
                poll_interval: v
                    .poll_interval_ms
                    .map_or(d.silence.poll_interval, Duration::from_millis),
                fft_size: v.fft_size.unwrap_or(d.silence.fft_size),
                smoothing: v.smoothing.unwrap_or(d.silence.smoothing),
            };

            VoiceConfig {
                silence,
                auto_speak: env_flag(&env, "PORTFOLIO_CHAT_AUTO_SPEAK")?
                    .or(v.auto_speak)
                    .unwrap_or(d.auto_speak),
                speak_while_recording: v.speak_while_recording.unwrap_or(d.speak_while_recording),
                autoplay: env_flag(&env, "PORTFOLIO_CHAT_AUTOPLAY")?
                    .or(v.autoplay)
                    .unwrap_or(d.autoplay),
                sample_rate: v.sample_rate.unwrap_or(d.sample_rate),
            }
        };

        let widget = {
            let d = default.widget;
            let w = fc.widget;
            WidgetConfig {
                narrow_breakpoint: w.narrow_breakpoint.unwrap_or(d.narrow_breakpoint),
                collapsed_height: w.collapsed_height.unwrap_or(d.collapsed_height),
                expanded_placeholder: w.expanded_placeholder.unwrap_or(d.expanded_placeholder),
                teaser_phrases: w
                    .teaser_phrases
                    .filter(|phrases| !phrases.is_empty())
                    .unwrap_or(d.teaser_phrases),
            }
        };

        let config = Self { api, voice, widget };
        config.validate()?;

        tracing::debug!(
            base_url = %config.api.base_url,
            autoplay = config.voice.autoplay,
            auto_speak = config.voice.auto_speak,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url must not be empty".to_string()));
        }
        let silence = &self.voice.silence;
        if !(0.0..=255.0).contains(&silence.threshold) {
            return Err(Error::Config(format!(
                "voice.silence_threshold must be within 0..=255, got {}",
                silence.threshold
            )));
        }
        if !(0.0..=1.0).contains(&silence.smoothing) {
            return Err(Error::Config(format!(
                "voice.smoothing must be within 0..=1, got {}",
                silence.smoothing
            )));
        }
        if !(32..=32768).contains(&silence.fft_size) {
            return Err(Error::Config(format!(
                "voice.fft_size must be within 32..=32768, got {}",
                silence.fft_size
            )));
        }
        if silence.poll_interval.is_zero() {
            return Err(Error::Config("voice.poll_interval_ms must be positive".to_string()));
        }
        if self.voice.sample_rate == 0 {
            return Err(Error::Config("voice.sample_rate must be positive".to_string()));
        }
        if self.widget.narrow_breakpoint <= 0.0 {
            return Err(Error::Config(
                "widget.narrow_breakpoint must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key}: cannot parse {raw:?}")))
        })
        .transpose()
}

fn env_flag(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    env(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{key}: expected a boolean, got {raw:?}"))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(ConfigFile::default(), |_| None).unwrap();
        assert_eq!(config.api.chat_url(), "http://localhost:3000/api/chat");
        assert_eq!(config.api.transcribe_url(), "http://localhost:3000/api/transcribe");
        assert!(config.voice.autoplay);
        assert!(config.voice.auto_speak);
        assert!(!config.voice.speak_while_recording);
        assert_eq!(config.widget.teaser_phrases.len(), 4);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = file::parse_config_file(
            "[api]\nbase_url = \"http://file.test/api\"\n[voice]\nautoplay = true\n",
        )
        .unwrap();
        let env = env_from(&[
            ("PORTFOLIO_CHAT_API_URL", "http://env.test/api/"),
            ("PORTFOLIO_CHAT_AUTOPLAY", "off"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert_eq!(config.api.speak_url(), "http://env.test/api/speak");
        assert!(!config.voice.autoplay);
    }

    #[test]
    fn test_file_overlays_defaults() {
        let fc = file::parse_config_file(
            "[voice]\nsilence_duration_ms = 3000\n[widget]\nteaser_phrases = []\n",
        )
        .unwrap();
        let config = Config::from_sources(fc, |_| None).unwrap();
        assert_eq!(config.voice.silence.window, Duration::from_secs(3));
        assert_eq!(config.voice.silence.grace_period, Duration::from_secs(1));
        // Empty phrase list keeps the defaults
        assert_eq!(config.widget.teaser_phrases.len(), 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let env = env_from(&[("PORTFOLIO_CHAT_AUTOPLAY", "maybe")]);
        assert!(matches!(
            Config::from_sources(ConfigFile::default(), env),
            Err(Error::Config(_))
        ));

        let env = env_from(&[("PORTFOLIO_CHAT_SILENCE_THRESHOLD", "300")]);
        assert!(Config::from_sources(ConfigFile::default(), env).is_err());
    }

    #[test]
    fn test_fft_size_bounded() {
        for size in [16, 1 << 20] {
            let fc = file::parse_config_file(&format!("[voice]\nfft_size = {size}\n")).unwrap();
            assert!(matches!(
                Config::from_sources(fc, |_| None),
                Err(Error::Config(msg)) if msg.contains("fft_size")
            ));
        }

        let fc = file::parse_config_file("[voice]\nfft_size = 2048\n").unwrap();
        let config = Config::from_sources(fc, |_| None).unwrap();
        assert_eq!(config.voice.silence.fft_size, 2048);
    }
}
