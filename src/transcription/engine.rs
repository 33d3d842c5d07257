//! # Recognizer Adapter
//!
//! Presents the speech engine to the recognition loop as a frame-in,
//! utterance-out interface.
//!
//! ## Key Responsibilities:
//! - **Endpointing**: cut the frame stream into utterances (`UtteranceSegmenter`)
//! - **Decoding**: hand each utterance to Whisper
//! - **Normalization**: make the text comparable with the wake phrase

use crate::audio::frame::AudioFrame;
use crate::config::EndpointConfig;
use crate::transcription::endpoint::UtteranceSegmenter;
use crate::transcription::model::WhisperModel;
use anyhow::Result;
use tracing::{debug, info};

/// Stateful speech recognizer for a single audio stream.
pub trait SpeechRecognizer: Send {
    /// Feed one frame. Returns finalized text when an utterance ends.
    fn feed(&mut self, frame: &AudioFrame) -> Result<Option<String>>;

    /// The stream has ended: decode whatever is still buffered.
    fn finish(&mut self) -> Result<Vec<String>>;
}

/// Turns one utterance of samples into text.
pub trait Transcribe: Send {
    fn transcribe(&mut self, pcm: &[f32]) -> Result<String>;
}

impl Transcribe for WhisperModel {
    fn transcribe(&mut self, pcm: &[f32]) -> Result<String> {
        WhisperModel::transcribe(self, pcm)
    }
}

/// Energy endpointing in front of a clip transcriber.
pub struct WhisperRecognizer<T: Transcribe = WhisperModel> {
    segmenter: UtteranceSegmenter,
    transcriber: T,
}

impl<T: Transcribe> WhisperRecognizer<T> {
    pub fn new(transcriber: T, endpoint: &EndpointConfig, sample_rate: u32) -> Self {
        Self {
            segmenter: UtteranceSegmenter::new(endpoint, sample_rate),
            transcriber,
        }
    }

    fn decode(&mut self, audio: &[f32]) -> Result<Option<String>> {
        let raw = self.transcriber.transcribe(audio)?;
        let text = normalize_transcript(&raw);
        if text.is_empty() {
            debug!("Utterance decoded to no speech: '{}'", raw);
            return Ok(None);
        }
        info!("Recognized: {}", text);
        Ok(Some(text))
    }
}

impl<T: Transcribe> SpeechRecognizer for WhisperRecognizer<T> {
    fn feed(&mut self, frame: &AudioFrame) -> Result<Option<String>> {
        match self.segmenter.push(&frame.to_f32()) {
            Some(audio) => self.decode(&audio),
            None => Ok(None),
        }
    }

    fn finish(&mut self) -> Result<Vec<String>> {
        if self.segmenter.in_utterance() {
            debug!("Flushing the open utterance");
        }
        let mut texts = Vec::new();
        for audio in self.segmenter.finish() {
            if let Some(text) = self.decode(&audio)? {
                texts.push(text);
            }
        }
        Ok(texts)
    }
}

/// Lowercase, strip punctuation (apostrophes stay), drop bracketed
/// annotations such as `[BLANK_AUDIO]` or `(music)`, collapse whitespace.
pub fn normalize_transcript(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut depth = 0usize;

    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_alphanumeric() || c == '\'' => cleaned.extend(c.to_lowercase()),
            _ => cleaned.push(' '),
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
