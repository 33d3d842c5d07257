//! # Audio Frame Sources
//!
//! Produces fixed-size 16 kHz mono frames on a dedicated thread and pushes
//! them into the frame queue.
//!
//! ## Sources:
//! - **Microphone**: live capture through cpal. The stream is not `Send`, so
//!   it is built, played and kept alive entirely inside the capture thread.
//!   The thread reports back once the device is running so that an
//!   unavailable device aborts startup.
//! - **WAV file**: a 16 kHz 16-bit file is decoded up front and replayed at
//!   real-time pace. The queue closes when the file ends, which ends the
//!   recognition stream.

use crate::audio::frame::{AudioFrame, FrameAssembler};
use crate::audio::queue::FrameSender;
use crate::config::{AudioConfig, AudioSourceKind, REQUIRED_SAMPLE_RATE};
use crate::error::{AppError, AppResult};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use std::fs::File;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Start the configured source. Returns once audio is flowing.
pub fn start_audio_source(config: &AudioConfig, frames: FrameSender) -> AppResult<()> {
    match config.source {
        AudioSourceKind::Microphone => {
            spawn_microphone(config.device.clone(), config.frame_samples, frames)
        }
        AudioSourceKind::Wav => {
            let path = config.wav_path.as_deref().ok_or_else(|| {
                AppError::Config("audio.wav_path is required for the wav source".to_string())
            })?;
            let source = WavSource::open(Path::new(path), config.frame_samples)?;
            if source.is_empty() {
                warn!("WAV input '{}' contains no audio", path);
            }
            spawn_wav(source, frames, true)?;
            Ok(())
        }
    }
}

/// Capture from an input device until the process exits.
fn spawn_microphone(
    device_name: Option<String>,
    frame_samples: usize,
    frames: FrameSender,
) -> AppResult<()> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<AppResult<()>>(1);

    thread::Builder::new()
        .name("audio-capture".to_string())
        .spawn(move || {
            let _stream = match open_microphone(device_name.as_deref(), frame_samples, frames) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            loop {
                thread::park();
            }
        })
        .map_err(|e| AppError::AudioDevice(format!("failed to spawn capture thread: {}", e)))?;

    ready_rx.recv().map_err(|_| {
        AppError::AudioDevice("capture thread exited before the device started".to_string())
    })?
}

fn open_microphone(
    device_name: Option<&str>,
    frame_samples: usize,
    frames: FrameSender,
) -> AppResult<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AppError::AudioDevice(format!("failed to enumerate input devices: {}", e)))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AppError::AudioDevice(format!("input device '{}' not found", name)))?,
        None => host
            .default_input_device()
            .ok_or_else(|| AppError::AudioDevice("no input device available".to_string()))?,
    };

    let target_rate = SampleRate(REQUIRED_SAMPLE_RATE);
    let supported = device
        .supported_input_configs()
        .map_err(|e| AppError::AudioDevice(format!("failed to query input configs: {}", e)))?
        .filter(|c| c.min_sample_rate() <= target_rate && c.max_sample_rate() >= target_rate)
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::I16))
        .ok_or_else(|| {
            AppError::AudioDevice(format!(
                "input device does not support {} Hz capture in i16 or f32",
                REQUIRED_SAMPLE_RATE
            ))
        })?
        .with_sample_rate(target_rate);

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let mut assembler = FrameAssembler::new(frame_samples, config.channels as usize);

    info!(
        "Capturing from '{}' at {} Hz, {} channel(s), {:?}",
        device.name().unwrap_or_default(),
        REQUIRED_SAMPLE_RATE,
        config.channels,
        sample_format
    );

    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for frame in assembler.push_i16(data) {
                    frames.push(frame);
                }
            },
            err_fn,
            None,
        ),
        _ => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in assembler.push_f32(data) {
                    frames.push(frame);
                }
            },
            err_fn,
            None,
        ),
    }
    .map_err(|e| AppError::AudioDevice(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| AppError::AudioDevice(format!("failed to start input stream: {}", e)))?;

    Ok(stream)
}

/// A WAV file decoded into frames.
pub struct WavSource {
    frames: Vec<AudioFrame>,
    frame_duration: Duration,
}

impl WavSource {
    /// Read and validate a 16 kHz 16-bit PCM file.
    ///
    /// Multi-channel files are downmixed; the last partial frame is zero-padded.
    pub fn open(path: &Path, frame_samples: usize) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::AudioInput(format!("cannot open '{}': {}", path.display(), e))
        })?;
        let (header, data) = wav::read(&mut file).map_err(|e| {
            AppError::AudioInput(format!("cannot decode '{}': {}", path.display(), e))
        })?;

        if header.sampling_rate != REQUIRED_SAMPLE_RATE {
            return Err(AppError::AudioInput(format!(
                "'{}' is sampled at {} Hz, expected {} Hz",
                path.display(),
                header.sampling_rate,
                REQUIRED_SAMPLE_RATE
            )));
        }

        let samples = match data {
            wav::BitDepth::Sixteen(samples) => samples,
            _ => {
                return Err(AppError::AudioInput(format!(
                    "'{}' has {} bits per sample, expected 16-bit PCM",
                    path.display(),
                    header.bits_per_sample
                )))
            }
        };

        let mut assembler = FrameAssembler::new(frame_samples, header.channel_count as usize);
        let mut frames = assembler.push_i16(&samples);
        frames.extend(assembler.flush());

        debug!(
            "Loaded '{}': {} frame(s) of {} samples",
            path.display(),
            frames.len(),
            frame_samples
        );

        Ok(Self {
            frames,
            frame_duration: Duration::from_micros(
                frame_samples as u64 * 1_000_000 / REQUIRED_SAMPLE_RATE as u64,
            ),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Replay a WAV source. The queue sender is dropped when the file ends.
///
/// With `realtime` each frame is followed by a pause of one frame duration.
pub fn spawn_wav(source: WavSource, frames: FrameSender, realtime: bool) -> AppResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("audio-wav".to_string())
        .spawn(move || {
            let total = source.len();
            for frame in source.frames {
                frames.push(frame);
                if realtime {
                    thread::sleep(source.frame_duration);
                }
            }
            info!(
                "WAV input finished after {} frame(s), {} dropped",
                total,
                frames.dropped()
            );
        })
        .map_err(|e| AppError::AudioInput(format!("failed to spawn WAV thread: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{frame_queue, OverflowPolicy};
    use tempfile::NamedTempFile;

    fn write_wav(sample_rate: u32, channels: u16, samples: Vec<i16>) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        // Format tag 1 is integer PCM.
        let header = wav::Header::new(1, channels, sample_rate, 16);
        wav::write(header, &wav::BitDepth::Sixteen(samples), file.as_file_mut()).unwrap();
        file
    }

    #[test]
    fn test_wav_is_split_into_padded_frames() {
        let file = write_wav(16_000, 1, (1..=10).collect());

        let source = WavSource::open(file.path(), 4).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.frames[0].samples(), vec![1, 2, 3, 4]);
        assert_eq!(source.frames[2].samples(), vec![9, 10, 0, 0]);
        assert_eq!(source.frame_duration, Duration::from_micros(250));
    }

    #[test]
    fn test_stereo_wav_is_downmixed() {
        let file = write_wav(16_000, 2, vec![10, 30, -10, -30]);

        let source = WavSource::open(file.path(), 2).unwrap();
        assert_eq!(source.frames[0].samples(), vec![20, -20]);
    }

    #[test]
    fn test_wrong_sample_rate_is_rejected() {
        let file = write_wav(44_100, 1, vec![0; 100]);

        let err = WavSource::open(file.path(), 4).err().unwrap();
        assert!(matches!(err, AppError::AudioInput(_)));
        assert!(err.to_string().contains("44100"));
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let err = WavSource::open(Path::new("/nonexistent/input.wav"), 4).err().unwrap();
        assert!(matches!(err, AppError::AudioInput(_)));
    }

    #[test]
    fn test_wav_replay_ends_the_stream() {
        let file = write_wav(16_000, 1, vec![1; 12]);
        let source = WavSource::open(file.path(), 4).unwrap();
        let (tx, rx) = frame_queue(8, OverflowPolicy::DropOldest);

        spawn_wav(source, tx, false).unwrap().join().unwrap();

        let received: Vec<AudioFrame> = rx.iter().collect();
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|f| f.samples() == vec![1; 4]));
    }
}
