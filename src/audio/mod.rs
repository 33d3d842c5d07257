//! # Audio Module
//!
//! Capture side of the pipeline: everything that runs before recognition.
//!
//! ## Key Components:
//! - **Frames**: fixed-size PCM blocks and the assembler that produces them
//! - **Queue**: bounded, non-blocking hand-off to the recognition thread
//! - **Capture**: microphone and WAV file sources
//!
//! ## Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod capture; // Microphone and WAV sources
pub mod frame; // AudioFrame and FrameAssembler
pub mod queue; // Bounded frame queue with overflow policy
