//! # Transcription Module
//!
//! Speech-to-text with Whisper models via candle, in pure Rust.
//!
//! ## Key Components:
//! - **Model**: loading a checkpoint from the local model directory and decoding clips
//! - **Endpointing**: cutting the continuous frame stream into utterances
//! - **Engine**: the `SpeechRecognizer` interface used by the recognition loop
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate (default, enough for short answers)
//! - **base**: ~74MB
//! - **small**: ~244MB
//! - **medium**: ~769MB
//! - **large**: ~1550MB, best accuracy but slowest

pub mod endpoint; // Energy-based utterance segmentation
pub mod engine; // Recognizer adapter
pub mod model; // Whisper model loading and decoding

pub use engine::{SpeechRecognizer, WhisperRecognizer};
pub use model::{ModelSize, WhisperModel};
