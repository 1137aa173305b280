//! Latest annotated frame, shared between the capture loop and stream sessions.
//!
//! Single writer, many readers. Publishing swaps in a new `Arc` and bumps the
//! sequence in one step, so a reader sees either nothing or a complete frame
//! together with the sequence it was published under. Readers only hold the
//! lock long enough to clone the `Arc`.

use bytes::Bytes;
use motion_preview_common::frame::Frame;
use std::sync::Arc;
use tokio::sync::watch;

/// A published frame together with its JPEG encoding.
#[derive(Debug)]
pub struct PreviewFrame {
    frame: Frame,
    jpeg: Bytes,
    motion: bool,
}

impl PreviewFrame {
    pub fn new(frame: Frame, jpeg: Bytes, motion: bool) -> Self {
        Self { frame, jpeg, motion }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Encoded bytes, cheap to clone.
    pub fn jpeg(&self) -> Bytes {
        self.jpeg.clone()
    }

    pub fn motion(&self) -> bool {
        self.motion
    }
}

/// What a reader observes: the current frame (if any) and its sequence.
/// Sequence 0 means nothing has been published yet.
#[derive(Debug, Clone, Default)]
pub struct PreviewSnapshot {
    pub frame: Option<Arc<PreviewFrame>>,
    pub sequence: u64,
}

/// Write half. Deliberately not `Clone`: there is exactly one publisher.
pub struct PreviewPublisher {
    tx: watch::Sender<PreviewSnapshot>,
}

/// Read half. Clone one per consumer.
#[derive(Clone)]
pub struct PreviewReader {
    rx: watch::Receiver<PreviewSnapshot>,
}

pub fn channel() -> (PreviewPublisher, PreviewReader) {
    let (tx, rx) = watch::channel(PreviewSnapshot::default());
    (PreviewPublisher { tx }, PreviewReader { rx })
}

impl PreviewPublisher {
    /// Replace the visible frame and return its sequence number.
    pub fn publish(&self, frame: PreviewFrame) -> u64 {
        let frame = Arc::new(frame);
        let mut sequence = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.sequence += 1;
            snapshot.frame = Some(frame);
            sequence = snapshot.sequence;
        });
        sequence
    }

    pub fn reader(&self) -> PreviewReader {
        PreviewReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl PreviewReader {
    /// Current snapshot. Never blocks on the writer for longer than an `Arc` clone.
    pub fn read(&self) -> PreviewSnapshot {
        self.rx.borrow().clone()
    }
}
