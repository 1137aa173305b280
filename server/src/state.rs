use motion_preview_detector::{validate_kernel, DetectError};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::preview::PreviewReader;

/// Everything the HTTP handlers need, built once in `main`.
pub struct AppState {
    pub preview: PreviewReader,
    pub kernel: BlurKernel,
    /// Kernel applied when a preview request carries no `gauss` parameter.
    pub default_kernel: u32,
    pub pacing: Duration,
    pub stats: Arc<PipelineStats>,
    pub shutdown: Shutdown,
}

/// Blur kernel size used by the capture loop, selectable per request.
///
/// There is one detector, so the most recent request wins.
#[derive(Clone)]
pub struct BlurKernel(Arc<AtomicU32>);

impl BlurKernel {
    pub fn new(size: u32) -> Result<Self, DetectError> {
        validate_kernel(size)?;
        Ok(Self(Arc::new(AtomicU32::new(size))))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, size: u32) -> Result<(), DetectError> {
        validate_kernel(size)?;
        self.0.store(size, Ordering::Relaxed);
        Ok(())
    }
}

/// Counters reported by `/status`.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub snapshots_written: AtomicU64,
    pub active_sessions: AtomicUsize,
    next_session_id: AtomicU64,
}

impl PipelineStats {
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Process-wide stop signal. Cloned into every long-running task.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger and the first listener.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Resolves once shutdown is triggered (or the trigger is dropped).
    pub async fn wait(mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }
}
