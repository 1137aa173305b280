//! Frame sources: where the capture loop gets its raw BGR frames.

mod http;
mod pattern;

pub use http::HttpSnapshotSource;
pub use pattern::TestPatternSource;

use motion_preview_common::frame::Frame;
use motion_preview_detector::DecodeError;
use std::future::Future;
use std::time::Duration;

/// Fixed capture resolution for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("frame source {0} is not started")]
    NotStarted(&'static str),
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to decode camera image: {0}")]
    Decode(#[from] DecodeError),
    #[error("capture worker failed: {0}")]
    Worker(String),
}

/// Camera collaborator driven by the capture loop.
///
/// Only the capture loop owns a source, so implementations need no internal
/// synchronization.
pub trait FrameSource: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Set the output resolution. Called once, before `start`.
    fn configure(&mut self, resolution: Resolution);

    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Produce the next BGR frame.
    fn capture(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;

    fn stop(&mut self) {}
}
