//! Client configuration
//!
//! Loaded from TOML, then overridden from the environment.

use crate::audio::{CaptureSettings, PcmFormat};
use crate::client::ResponseMode;
use crate::{ParrotError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const ENDPOINT_ENV: &str = "PARROT_ENDPOINT";
pub const SUGGESTIONS_ENDPOINT_ENV: &str = "PARROT_SUGGESTIONS_ENDPOINT";
pub const MODE_ENV: &str = "PARROT_MODE";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Completion endpoint
    pub endpoint: String,

    /// Autocomplete endpoint
    pub suggestions_endpoint: String,

    /// Reply delivery requested from the server
    pub mode: ResponseMode,

    pub request_timeout_secs: u64,

    /// Monitor the microphone
    pub enable_audio_input: bool,

    /// Play spoken replies
    pub enable_audio_output: bool,

    pub capture: CaptureSettings,

    /// Layout of raw PCM reply audio
    pub playback: PcmFormat,

    pub suggestion_debounce_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api".to_string(),
            suggestions_endpoint: "http://localhost:3000/api/suggestions".to_string(),
            mode: ResponseMode::SingleShot,
            request_timeout_secs: 60,
            enable_audio_input: true,
            enable_audio_output: true,
            capture: CaptureSettings::default(),
            playback: PcmFormat::default(),
            suggestion_debounce_ms: 300,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_suggestions_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.suggestions_endpoint = endpoint.into();
        self
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Disable audio input (text-only mode)
    pub fn without_audio_input(mut self) -> Self {
        self.enable_audio_input = false;
        self
    }

    /// Disable audio output (text-only mode)
    pub fn without_audio_output(mut self) -> Self {
        self.enable_audio_output = false;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ParrotError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| ParrotError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `PARROT_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            debug!("{} overrides endpoint", ENDPOINT_ENV);
            self.endpoint = endpoint;
        }
        if let Some(endpoint) = lookup(SUGGESTIONS_ENDPOINT_ENV) {
            debug!("{} overrides suggestions endpoint", SUGGESTIONS_ENDPOINT_ENV);
            self.suggestions_endpoint = endpoint;
        }
        if let Some(mode) = lookup(MODE_ENV) {
            self.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "single_shot" | "single-shot" => ResponseMode::SingleShot,
                "streaming" => ResponseMode::Streaming,
                other => {
                    return Err(ParrotError::Config(format!(
                        "{} must be single_shot or streaming, got {:?}",
                        MODE_ENV, other
                    )));
                }
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("endpoint", &self.endpoint),
            ("suggestions_endpoint", &self.suggestions_endpoint),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ParrotError::Config(format!(
                    "{} must be an http(s) URL, got {:?}",
                    name, url
                )));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ParrotError::Config("request_timeout_secs must be positive".into()));
        }

        if self.playback.sample_rate == 0 || self.playback.channels == 0 {
            return Err(ParrotError::Config("playback format must be non-zero".into()));
        }

        if self.enable_audio_input {
            self.capture.validate().map_err(ParrotError::Config)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.enable_audio_input);
        assert!(config.enable_audio_output);
        assert_eq!(config.mode, ResponseMode::SingleShot);
        assert_eq!(config.suggestion_debounce(), Duration::from_millis(300));
        assert_eq!(config.playback.sample_rate, 24000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::default()
            .with_endpoint("https://example.com/api")
            .with_mode(ResponseMode::Streaming)
            .without_audio_input()
            .without_audio_output();

        assert_eq!(config.endpoint, "https://example.com/api");
        assert_eq!(config.mode, ResponseMode::Streaming);
        assert!(!config.enable_audio_input);
        assert!(!config.enable_audio_output);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
endpoint = "https://chat.example.com/api"
mode = "streaming"

[capture]
positive_threshold = 0.7
"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "https://chat.example.com/api");
        assert_eq!(config.mode, ResponseMode::Streaming);
        assert_eq!(config.capture.positive_threshold, 0.7);
        assert_eq!(config.capture.redemption_frames, 8);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = \"sometimes\"").unwrap();
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ParrotError::Config(_))
        ));
        assert!(ClientConfig::load("/nonexistent/parrot.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENDPOINT_ENV, "http://10.0.0.2:3000/api"),
            (MODE_ENV, "Streaming"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.endpoint, "http://10.0.0.2:3000/api");
        assert_eq!(config.mode, ResponseMode::Streaming);

        let bad = ClientConfig::default().with_overrides(|key| {
            (key == MODE_ENV).then(|| "sometimes".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = ClientConfig::default().with_endpoint("localhost:3000");
        assert!(config.validate().is_err());
    }
}
