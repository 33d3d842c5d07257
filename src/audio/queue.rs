//! # Frame Queue
//!
//! Bounded hand-off between the capture thread and the recognition loop.
//!
//! The producer side never blocks: the device callback must return quickly, so
//! when the queue is full a frame is discarded according to the configured
//! `OverflowPolicy`. The consumer side is a plain `crossbeam_channel::Receiver`
//! and sees the end of the stream once every `FrameSender` is dropped.

use crate::audio::frame::AudioFrame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Which frame to give up when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame so the newest audio gets through
    #[default]
    DropOldest,
    /// Discard the frame being pushed
    DropNewest,
}

pub type FrameReceiver = Receiver<AudioFrame>;

/// Producer handle of the frame queue.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<AudioFrame>,
    /// Used only to evict under `DropOldest`
    evict: Receiver<AudioFrame>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

/// Create a queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize, policy: OverflowPolicy) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let sender = FrameSender {
        tx,
        evict: rx.clone(),
        policy,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl FrameSender {
    /// Enqueue without blocking.
    pub fn push(&self, frame: AudioFrame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => match self.policy {
                    OverflowPolicy::DropNewest => {
                        self.record_drop();
                        return;
                    }
                    OverflowPolicy::DropOldest => {
                        if self.evict.try_recv().is_ok() {
                            self.record_drop();
                        }
                        frame = rejected;
                    }
                },
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Total frames discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if total == 1 || total % 100 == 0 {
            warn!(
                "Frame queue full, {} frame(s) dropped so far ({:?})",
                total, self.policy
            );
        }
    }
}
