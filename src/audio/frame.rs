//! # Audio Frames
//!
//! Fixed-size blocks of 16-bit little-endian PCM, the unit handed from the
//! capture thread to the recognition loop.

use byteorder::{ByteOrder, LittleEndian};

/// One captured frame: mono, 16 kHz, raw little-endian i16 bytes.
///
/// Immutable once built; ownership moves through the frame queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    /// Encode samples as little-endian bytes.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut data = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(samples, &mut data);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Decode back to samples.
    pub fn samples(&self) -> Vec<i16> {
        let mut samples = vec![0i16; self.sample_count()];
        LittleEndian::read_i16_into(self.as_bytes(), &mut samples);
        samples
    }

    /// Samples scaled to -1.0..1.0 for feature extraction.
    pub fn to_f32(&self) -> Vec<f32> {
        pcm_to_float(&self.samples())
    }
}

/// Convert 16-bit PCM to floats in -1.0..1.0.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert a float sample to 16-bit PCM, clamping out-of-range input.
pub fn float_to_pcm(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Turns arbitrarily sized device buffers into fixed-size mono frames.
///
/// Interleaved multi-channel input is averaged down to one channel.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_samples: usize,
    channels: usize,
    pending: Vec<i16>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize, channels: usize) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Append interleaved i16 samples, returning every frame completed.
    pub fn push_i16(&mut self, data: &[i16]) -> Vec<AudioFrame> {
        if self.channels == 1 {
            self.pending.extend_from_slice(data);
        } else {
            let channels = self.channels;
            self.pending.extend(data.chunks_exact(channels).map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            }));
        }
        self.drain_frames()
    }

    /// Append interleaved f32 samples, returning every frame completed.
    pub fn push_f32(&mut self, data: &[f32]) -> Vec<AudioFrame> {
        let channels = self.channels;
        self.pending.extend(data.chunks_exact(channels).map(|frame| {
            let sum: f32 = frame.iter().sum();
            float_to_pcm(sum / channels as f32)
        }));
        self.drain_frames()
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Emit the leftover samples as a final frame, zero-padded to full size.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.pending() == 0 {
            return None;
        }
        self.pending.resize(self.frame_samples, 0);
        let frame = AudioFrame::from_samples(&self.pending);
        self.pending.clear();
        Some(frame)
    }

    fn drain_frames(&mut self) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            frames.push(AudioFrame::from_samples(&self.pending));
            self.pending = rest;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_little_endian() {
        let frame = AudioFrame::from_samples(&[1, -2, 0x1234]);
        assert_eq!(frame.as_bytes(), &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
        assert_eq!(frame.sample_count(), 3);
        assert_eq!(frame.samples(), vec![1, -2, 0x1234]);
    }

    #[test]
    fn test_pcm_conversion() {
        let floats = pcm_to_float(&[0, 16384, -32768]);
        assert_eq!(floats, vec![0.0, 0.5, -1.0]);
        assert_eq!(float_to_pcm(2.0), i16::MAX);
        assert_eq!(float_to_pcm(0.0), 0);
    }

    #[test]
    fn test_assembler_emits_fixed_size_frames() {
        let mut assembler = FrameAssembler::new(4, 1);

        assert!(assembler.push_i16(&[1, 2, 3]).is_empty());
        let frames = assembler.push_i16(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), vec![1, 2, 3, 4]);
        assert_eq!(frames[1].samples(), vec![5, 6, 7, 8]);
        assert_eq!(assembler.pending(), 1);

        let last = assembler.flush().unwrap();
        assert_eq!(last.samples(), vec![9, 0, 0, 0]);
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_assembler_downmixes_stereo() {
        let mut assembler = FrameAssembler::new(2, 2);

        let frames = assembler.push_i16(&[100, 300, -50, -150]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), vec![200, -100]);

        let frames = assembler.push_f32(&[0.5, 0.5, 0.0, 0.0]);
        assert_eq!(frames[0].samples(), vec![float_to_pcm(0.5), 0]);
    }
}
