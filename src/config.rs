//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml` in the working directory, optional)
//! - Environment variables with the `APP_` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform conventions)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_CONVERSATION__WAKE_PHRASE`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (defined in the Default impl)
//!
//! Section and key are separated by a double underscore so that keys which
//! contain underscores themselves (`wake_phrase`, `frame_samples`) stay intact.
//! `APP_CONVERSATION__QUESTIONS` takes a `|`-separated list.

use crate::audio::queue::OverflowPolicy;
use crate::device::DevicePreference;
use crate::error::{AppError, AppResult};
use crate::transcription::ModelSize;
use serde::{Deserialize, Serialize};
use std::env;

/// Sample rate the Whisper model expects.
pub const REQUIRED_SAMPLE_RATE: u32 = 16_000;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub endpoint: EndpointConfig,
    pub conversation: ConversationConfig,
}

/// Network listener settings.
///
/// ## Fields:
/// - `host`: address to bind (`0.0.0.0` accepts connections from any interface)
/// - `port`: TCP port of the single listener
/// - `ws_path`: path of the real-time WebSocket endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
}

/// Speech model settings.
///
/// ## Fields:
/// - `path`: directory holding `config.json`, `tokenizer.json` and `model.safetensors`
/// - `size`: Whisper variant the directory contains ("tiny", "base", "small", "medium", "large").
///   Only used to point at the right download source when the directory is missing.
/// - `language`: language hint passed to the decoder, `None` lets the model decide
/// - `device`: compute device preference ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub size: String,
    pub language: Option<String>,
    pub device: String,
}

/// Where audio frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    /// Live capture from an input device
    Microphone,
    /// A 16 kHz mono 16-bit WAV file, replayed at real-time pace
    Wav,
}

/// Audio capture and hand-off settings.
///
/// ## Fields:
/// - `source`: microphone or WAV file
/// - `device`: input device name; the system default is used when unset
/// - `wav_path`: input file, required when `source = "wav"`
/// - `sample_rate`: capture rate in Hz (must be 16000)
/// - `frame_samples`: samples per captured frame (8000 = 0.5 s)
/// - `queue_capacity`: frames the hand-off queue holds before the overflow policy applies
/// - `overflow`: `drop_oldest` or `drop_newest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub source: AudioSourceKind,
    pub device: Option<String>,
    pub wav_path: Option<String>,
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

/// Utterance endpoint detection settings.
///
/// ## Fields:
/// - `energy_threshold`: RMS level (0.0 - 1.0) above which a window counts as speech
/// - `window_ms`: analysis window length
/// - `end_silence_ms`: trailing silence that closes an utterance
/// - `min_speech_ms`: voiced audio required for an utterance to count
/// - `max_utterance_ms`: hard cap on utterance length
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub energy_threshold: f32,
    pub window_ms: u32,
    pub end_silence_ms: u32,
    pub min_speech_ms: u32,
    pub max_utterance_ms: u32,
}

/// Dialogue script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub wake_phrase: String,
    pub questions: Vec<String>,
    pub closing_message: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                ws_path: "/ws".to_string(),
            },
            model: ModelConfig {
                path: "model".to_string(),
                size: "tiny".to_string(),
                language: Some("en".to_string()),
                device: "auto".to_string(),
            },
            audio: AudioConfig {
                source: AudioSourceKind::Microphone,
                device: None,
                wav_path: None,
                sample_rate: REQUIRED_SAMPLE_RATE,
                frame_samples: 8000,
                queue_capacity: 32,
                overflow: OverflowPolicy::DropOldest,
            },
            endpoint: EndpointConfig {
                energy_threshold: 0.015,
                window_ms: 30,
                end_silence_ms: 700,
                min_speech_ms: 250,
                max_utterance_ms: 15_000,
            },
            conversation: ConversationConfig {
                wake_phrase: "hey assistant".to_string(),
                questions: vec![
                    "How are you feeling today?".to_string(),
                    "What is your favorite color?".to_string(),
                    "Do you like coding?".to_string(),
                ],
                closing_message: "Thank you! Have a great day.".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=8080`: override server port
    /// - `APP_AUDIO__SOURCE=wav` and `APP_AUDIO__WAV_PATH=demo.wav`: replay a file
    /// - `APP_CONVERSATION__QUESTIONS="Name?|Age?"`: replace the question list
    /// - `HOST=0.0.0.0` / `PORT=3000`: deployment platform overrides
    pub fn load() -> AppResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator("|")
                    .with_list_parse_key("conversation.questions")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Every failure here is a fatal startup error.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "WebSocket path must start with '/': {}",
                self.server.ws_path
            )));
        }

        self.model.size.parse::<ModelSize>().map_err(AppError::Config)?;
        self.model.device.parse::<DevicePreference>().map_err(AppError::Config)?;

        if self.conversation.wake_phrase.trim().is_empty() {
            return Err(AppError::Config("Wake phrase cannot be empty".to_string()));
        }

        if self.conversation.questions.is_empty() {
            return Err(AppError::Config("At least one question is required".to_string()));
        }

        if self.conversation.closing_message.trim().is_empty() {
            return Err(AppError::Config("Closing message cannot be empty".to_string()));
        }

        if self.audio.sample_rate != REQUIRED_SAMPLE_RATE {
            return Err(AppError::Config(format!(
                "Sample rate must be {} Hz, got {}",
                REQUIRED_SAMPLE_RATE, self.audio.sample_rate
            )));
        }

        if self.audio.frame_samples == 0 {
            return Err(AppError::Config("Frame size must be greater than 0".to_string()));
        }

        if self.audio.queue_capacity == 0 {
            return Err(AppError::Config("Frame queue capacity must be greater than 0".to_string()));
        }

        if self.audio.source == AudioSourceKind::Wav && self.audio.wav_path.is_none() {
            return Err(AppError::Config(
                "audio.wav_path is required when audio.source is \"wav\"".to_string(),
            ));
        }

        if self.endpoint.energy_threshold <= 0.0 {
            return Err(AppError::Config("Energy threshold must be greater than 0".to_string()));
        }

        if self.endpoint.window_ms == 0 {
            return Err(AppError::Config("Endpoint window must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.ws_path, "/ws");
        assert_eq!(config.audio.frame_samples, 8000);
        assert_eq!(config.conversation.wake_phrase, "hey assistant");
        assert_eq!(config.conversation.questions.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.conversation.questions.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.conversation.wake_phrase = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.sample_rate = 44_100;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.model.size = "enormous".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.model.device = "tpu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wav_source_requires_path() {
        let mut config = AppConfig::default();
        config.audio.source = AudioSourceKind::Wav;
        assert!(config.validate().is_err());

        config.audio.wav_path = Some("demo.wav".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [server]
            port = 9090

            [audio]
            overflow = "drop_newest"

            [conversation]
            questions = ["color?", "food?"]
        "#;

        let config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.audio.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.conversation.questions, vec!["color?", "food?"]);
        assert_eq!(config.conversation.wake_phrase, "hey assistant");
    }
}
