//! # Whisper Model
//!
//! Loads a Whisper checkpoint from a local directory with candle and turns
//! 16 kHz PCM into text with greedy decoding.
//!
//! ## Model Directory Layout:
//! - `config.json`: model hyper-parameters
//! - `tokenizer.json`: Hugging Face tokenizer
//! - `model.safetensors`: weights
//!
//! The directory is a startup precondition. When it (or any file in it) is
//! missing, loading fails with `AppError::ModelAssetsMissing`, which names the
//! expected location and the repository the files come from.
//!
//! ## Decoding Process:
//! 1. Pad the utterance to Whisper's 30 second window
//! 2. Compute the log-mel spectrogram with a Slaney mel filter bank
//! 3. Run the encoder once
//! 4. Prompt the decoder with `<|startoftranscript|>`, the language token,
//!    `<|transcribe|>` and `<|notimestamps|>`, then pick the most likely token
//!    until `<|endoftext|>`

use crate::error::{AppError, AppResult};
use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// FFT window used by Whisper's feature extractor.
const N_FFT: usize = 400;

/// Whisper checkpoint sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Hugging Face repository holding this checkpoint.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    pub fn download_url(&self) -> String {
        format!("https://huggingface.co/{}", self.repo_name())
    }
}

impl std::str::FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(format!("Unknown model size: {}", s)),
        }
    }
}

/// Paths of the three required model files.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelAssets {
    /// Verify that `dir` holds every required file.
    pub fn locate(dir: &Path, size: ModelSize) -> AppResult<Self> {
        let assets = Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        };

        let complete = dir.is_dir()
            && [&assets.config, &assets.tokenizer, &assets.weights]
                .iter()
                .all(|path| path.is_file());

        if !complete {
            return Err(AppError::ModelAssetsMissing {
                path: dir.to_path_buf(),
                source: size.download_url(),
            });
        }

        Ok(assets)
    }
}

/// A loaded Whisper model.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    mel_filters: Vec<f32>,
    /// Decoder prompt: start of transcript, optional language, task, no timestamps
    prompt: Vec<u32>,
    eot_token: u32,
}

impl WhisperModel {
    /// Load the model from a local directory.
    ///
    /// ## Parameters:
    /// - **dir**: model directory
    /// - **size**: checkpoint size, used to name the download source on failure
    /// - **language**: language code such as `"en"`; `None` skips the language token
    /// - **device**: where to run inference
    pub fn load(dir: &Path, size: ModelSize, language: Option<&str>, device: Device) -> AppResult<Self> {
        let assets = ModelAssets::locate(dir, size)?;
        info!("Loading Whisper model from '{}'...", dir.display());
        let start_time = std::time::Instant::now();

        let config_json = std::fs::read_to_string(&assets.config)
            .map_err(|e| AppError::ModelLoad(format!("cannot read {}: {}", CONFIG_FILE, e)))?;
        let config: Config = serde_json::from_str(&config_json)
            .map_err(|e| AppError::ModelLoad(format!("invalid {}: {}", CONFIG_FILE, e)))?;

        let tokenizer = Tokenizer::from_file(&assets.tokenizer)
            .map_err(|e| AppError::ModelLoad(format!("invalid {}: {}", TOKENIZER_FILE, e)))?;

        // SAFETY: the weights file is only read, and is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&assets.weights], m::DTYPE, &device) }
            .map_err(|e| AppError::ModelLoad(format!("cannot map {}: {}", WEIGHTS_FILE, e)))?;
        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| AppError::ModelLoad(format!("cannot build model: {}", e)))?;

        let mut prompt = vec![token_id(&tokenizer, m::SOT_TOKEN)?];
        if let Some(language) = language {
            prompt.push(token_id(&tokenizer, &format!("<|{}|>", language))?);
        }
        prompt.push(token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?);
        prompt.push(token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?);
        let eot_token = token_id(&tokenizer, m::EOT_TOKEN)?;

        let mel_filters = mel_filter_bank(config.num_mel_bins, N_FFT, m::SAMPLE_RATE);

        let mut whisper = Self {
            model,
            config,
            tokenizer,
            device,
            mel_filters,
            prompt,
            eot_token,
        };

        // Decode a second of silence so a broken checkpoint fails at startup.
        let check = whisper
            .transcribe(&vec![0.0f32; m::SAMPLE_RATE])
            .map_err(|e| AppError::ModelLoad(format!("model validation failed: {}", e)))?;
        debug!("Model validation output: '{}'", check);

        info!(
            "Whisper model loaded in {:.2}s ({} mel bins, {} decoder layers)",
            start_time.elapsed().as_secs_f64(),
            whisper.config.num_mel_bins,
            whisper.config.decoder_layers
        );
        Ok(whisper)
    }

    /// Transcribe one utterance of 16 kHz mono samples in -1.0..1.0.
    ///
    /// Audio beyond 30 seconds is ignored.
    pub fn transcribe(&mut self, pcm: &[f32]) -> Result<String> {
        let start_time = std::time::Instant::now();

        let mut padded = pcm[..pcm.len().min(m::N_SAMPLES)].to_vec();
        padded.resize(m::N_SAMPLES, 0.0);

        let n_mels = self.config.num_mel_bins;
        let mel = m::audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let n_frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?
            .narrow(2, 0, n_frames.min(m::N_FRAMES))?;

        let features = self.model.encoder.forward(&mel, true)?;

        let mut tokens = self.prompt.clone();
        let max_tokens = self.config.max_target_positions / 2;
        for i in 0..max_tokens {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let mut logits: Vec<f32> = logits.to_vec1()?;
            for &suppressed in &self.config.suppress_tokens {
                if let Some(logit) = logits.get_mut(suppressed as usize) {
                    *logit = f32::NEG_INFINITY;
                }
            }

            let next_token = logits
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(index, _)| index as u32)
                .ok_or_else(|| anyhow!("decoder produced no logits"))?;

            if next_token == self.eot_token {
                break;
            }
            tokens.push(next_token);
            if tokens.len() >= self.config.max_target_positions {
                break;
            }
        }

        let text = self
            .tokenizer
            .decode(&tokens[self.prompt.len()..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            pcm.len() as f64 / m::SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            text.trim()
        );

        Ok(text.trim().to_string())
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> AppResult<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| AppError::ModelLoad(format!("tokenizer has no '{}' token", token)))
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        mel * MEL_F_SP
    }
}

/// Triangular, area-normalized mel filters laid out `[n_mels][n_fft / 2 + 1]`.
///
/// Matches the filter bank Whisper's feature extractor was trained with.
pub fn mel_filter_bank(n_mels: usize, n_fft: usize, sample_rate: usize) -> Vec<f32> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate as f64 / 2.0;

    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|i| i as f64 * nyquist / (n_bins - 1) as f64)
        .collect();

    let max_mel = hz_to_mel(nyquist);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_bins];
    for m in 0..n_mels {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let norm = 2.0 / (right - left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);
            filters[m * n_bins + k] = (weight * norm) as f32;
        }
    }
    filters
}
