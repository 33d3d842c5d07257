//! # Error Handling
//!
//! Error types for the voice assistant backend.
//!
//! ## Error Taxonomy:
//! - **Fatal startup errors**: bad configuration, missing model assets, model load
//!   failure, unavailable audio device or unreadable WAV input. These abort the
//!   process with a diagnostic and are never retried.
//! - **Recognizer errors**: raised mid-stream by the speech engine. Fatal to the
//!   recognition loop only; the WebSocket server keeps running.
//!
//! Transient send failures and malformed client messages are not errors at this
//! level: they are logged where they happen and otherwise ignored.

use std::fmt;
use std::path::PathBuf;

/// Application error categories.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::AudioDevice("no input device available".to_string()).into());
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Configuration file or environment variable problems
    Config(String),

    /// The model directory or one of its required files does not exist
    ModelAssetsMissing {
        /// Where the assets were expected
        path: PathBuf,
        /// Where the assets can be obtained from
        source: String,
    },

    /// Model assets exist but could not be loaded
    ModelLoad(String),

    /// No usable audio capture device
    AudioDevice(String),

    /// Audio input file could not be read or has the wrong format
    AudioInput(String),

    /// The speech recognizer failed while decoding
    Recognizer(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ModelAssetsMissing { path, source } => write!(
                f,
                "Speech model not found at '{}'. Download the model from {} and unpack it as '{}' \
                 (expected config.json, tokenizer.json and model.safetensors)",
                path.display(),
                source,
                path.display()
            ),
            AppError::ModelLoad(msg) => write!(f, "Failed to load speech model: {}", msg),
            AppError::AudioDevice(msg) => write!(f, "Audio device error: {}", msg),
            AppError::AudioInput(msg) => write!(f, "Audio input error: {}", msg),
            AppError::Recognizer(msg) => write!(f, "Recognizer error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Configuration loading failures surface as `AppError::Config`.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_diagnostic_names_location_and_source() {
        let err = AppError::ModelAssetsMissing {
            path: PathBuf::from("model"),
            source: "https://huggingface.co/openai/whisper-tiny".to_string(),
        };

        let message = err.to_string();
        assert!(message.contains("'model'"));
        assert!(message.contains("https://huggingface.co/openai/whisper-tiny"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AppError = config::ConfigError::Message("bad port".to_string()).into();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: bad port");
    }
}
