//! # Utterance Endpointing
//!
//! Whisper transcribes whole clips, so the continuous frame stream is cut into
//! utterances first. Audio is scored in short windows by RMS energy:
//!
//! - an utterance opens on the first voiced window, keeping a short stretch of
//!   the preceding audio so word onsets are not clipped
//! - it closes after `end_silence_ms` of unvoiced windows, or once it reaches
//!   `max_utterance_ms`
//! - it is kept only if at least `min_speech_ms` of it was voiced; shorter
//!   bursts (clicks, bumps) are discarded

use crate::config::EndpointConfig;
use std::collections::VecDeque;
use tracing::debug;

/// Audio kept from before the first voiced window.
const PREROLL_MS: u32 = 200;

#[derive(Debug)]
pub struct UtteranceSegmenter {
    window_samples: usize,
    threshold: f32,
    end_silence_windows: usize,
    min_speech_windows: usize,
    max_windows: usize,
    preroll_samples: usize,

    /// Samples not yet forming a full window
    partial: Vec<f32>,
    preroll: VecDeque<f32>,
    in_utterance: bool,
    buffer: Vec<f32>,
    windows: usize,
    voiced_windows: usize,
    silent_run: usize,
    completed: VecDeque<Vec<f32>>,
}

fn windows_for(ms: u32, window_ms: u32) -> usize {
    ms.div_ceil(window_ms.max(1)) as usize
}

impl UtteranceSegmenter {
    pub fn new(config: &EndpointConfig, sample_rate: u32) -> Self {
        let window_ms = config.window_ms.max(1);
        Self {
            window_samples: ((sample_rate as u64 * window_ms as u64 / 1000) as usize).max(1),
            threshold: config.energy_threshold,
            end_silence_windows: windows_for(config.end_silence_ms, window_ms).max(1),
            min_speech_windows: windows_for(config.min_speech_ms, window_ms),
            max_windows: windows_for(config.max_utterance_ms, window_ms).max(1),
            preroll_samples: (sample_rate as u64 * PREROLL_MS as u64 / 1000) as usize,
            partial: Vec::new(),
            preroll: VecDeque::new(),
            in_utterance: false,
            buffer: Vec::new(),
            windows: 0,
            voiced_windows: 0,
            silent_run: 0,
            completed: VecDeque::new(),
        }
    }

    /// Feed samples; returns at most one finished utterance.
    ///
    /// If more than one utterance completes, the rest are returned by later
    /// calls or by `finish`.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.partial.extend_from_slice(samples);

        let mut consumed = 0;
        while self.partial.len() - consumed >= self.window_samples {
            let end = consumed + self.window_samples;
            let window = self.partial[consumed..end].to_vec();
            self.process_window(&window);
            consumed = end;
        }
        self.partial.drain(..consumed);

        self.completed.pop_front()
    }

    /// End of stream: return every utterance still held, including one in progress.
    pub fn finish(&mut self) -> Vec<Vec<f32>> {
        if self.in_utterance {
            let rest = std::mem::take(&mut self.partial);
            self.buffer.extend_from_slice(&rest);
            self.close_utterance();
        }
        self.partial.clear();
        self.preroll.clear();
        self.completed.drain(..).collect()
    }

    /// Whether an utterance is currently open.
    pub fn in_utterance(&self) -> bool {
        self.in_utterance
    }

    fn process_window(&mut self, window: &[f32]) {
        let voiced = rms(window) >= self.threshold;

        if !self.in_utterance {
            if voiced {
                self.in_utterance = true;
                self.buffer = self.preroll.drain(..).collect();
                self.buffer.extend_from_slice(window);
                self.windows = 1;
                self.voiced_windows = 1;
                self.silent_run = 0;
            } else {
                self.preroll.extend(window.iter().copied());
                let excess = self.preroll.len().saturating_sub(self.preroll_samples);
                self.preroll.drain(..excess);
            }
            return;
        }

        self.buffer.extend_from_slice(window);
        self.windows += 1;
        if voiced {
            self.voiced_windows += 1;
            self.silent_run = 0;
        } else {
            self.silent_run += 1;
        }

        if self.silent_run >= self.end_silence_windows || self.windows >= self.max_windows {
            self.close_utterance();
        }
    }

    fn close_utterance(&mut self) {
        let audio = std::mem::take(&mut self.buffer);
        if self.voiced_windows >= self.min_speech_windows {
            debug!(
                "Utterance endpoint: {} samples, {} voiced window(s)",
                audio.len(),
                self.voiced_windows
            );
            self.completed.push_back(audio);
        } else {
            debug!("Discarding {} voiced window(s) as noise", self.voiced_windows);
        }

        self.in_utterance = false;
        self.windows = 0;
        self.voiced_windows = 0;
        self.silent_run = 0;
        self.preroll.clear();
    }
}

/// Root mean square of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
