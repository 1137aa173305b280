use bytes::Bytes;
use motion_preview_common::config::Config;
use motion_preview_detector::{encode_jpeg, DetectError, EncodeError, MotionDetector};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::preview::{PreviewFrame, PreviewPublisher};
use crate::snapshot::SnapshotStore;
use crate::source::{CaptureError, FrameSource, Resolution};
use crate::state::{BlurKernel, PipelineStats, Shutdown};

/// Consecutive capture failures before the loop escalates to a warning.
const FAILURE_WARN_THRESHOLD: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("detection rejected frame: {0}")]
    Detect(#[from] DetectError),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("detector worker failed: {0}")]
    Worker(String),
}

/// What one successful cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub sequence: u64,
    pub motion: bool,
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub capture_timeout: Duration,
    pub resolution: Resolution,
    pub rotate_180: bool,
    pub min_contour_area: u32,
    pub jpeg_quality: u8,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.capture.interval_ms),
            capture_timeout: Duration::from_millis(config.camera.capture_timeout_ms),
            resolution: Resolution {
                width: config.camera.width,
                height: config.camera.height,
            },
            rotate_180: config.camera.rotate_180,
            min_contour_area: config.detector.min_contour_area,
            jpeg_quality: config.stream.jpeg_quality,
        }
    }
}

/// Fixed-period driver: capture, detect, publish, and snapshot on motion.
///
/// The loop is the only owner of the detector, so its one-frame history
/// always belongs to this single camera stream.
pub struct CaptureLoop<S: FrameSource> {
    source: S,
    /// Taken while a detection runs on the blocking pool.
    detector: Option<MotionDetector>,
    publisher: PreviewPublisher,
    snapshots: Option<SnapshotStore>,
    kernel: BlurKernel,
    stats: Arc<PipelineStats>,
    settings: CaptureSettings,
    consecutive_failures: u32,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(
        mut source: S,
        publisher: PreviewPublisher,
        snapshots: Option<SnapshotStore>,
        kernel: BlurKernel,
        stats: Arc<PipelineStats>,
        settings: CaptureSettings,
    ) -> Self {
        source.configure(settings.resolution);
        Self {
            source,
            detector: Some(MotionDetector::new(settings.min_contour_area)),
            publisher,
            snapshots,
            kernel,
            stats,
            settings,
            consecutive_failures: 0,
        }
    }

    /// Run until `shutdown` fires. Each tick runs one full cycle; a slow
    /// cycle delays the next tick instead of bunching ticks up.
    pub async fn run(mut self, shutdown: Shutdown) {
        if let Err(e) = self.source.start() {
            error!(source = self.source.name(), error = %e, "failed to start frame source");
            return;
        }
        info!(
            source = self.source.name(),
            interval_ms = self.settings.interval.as_millis() as u64,
            min_contour_area = self.settings.min_contour_area,
            "capture loop started"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = shutdown.wait();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let result = self.run_cycle().await;
                    self.record(result);
                }
            }
        }

        self.source.stop();
        info!(
            snapshots = self.snapshots.as_ref().map_or(0, |s| s.counter()),
            "capture loop stopped"
        );
    }

    /// One capture/detect/publish/persist pass. Errors abort this cycle only;
    /// the preview state is either fully updated or untouched.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let frame = match tokio::time::timeout(self.settings.capture_timeout, self.source.capture()).await {
            Ok(frame) => frame?,
            Err(_) => return Err(CaptureError::Timeout(self.settings.capture_timeout).into()),
        };
        let frame = if self.settings.rotate_180 {
            frame.rotate_180()
        } else {
            frame
        };

        let kernel = self.kernel.get();
        let quality = self.settings.jpeg_quality;
        let mut detector = self
            .detector
            .take()
            .unwrap_or_else(|| MotionDetector::new(self.settings.min_contour_area));

        let (detector, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = detector
                .detect(&frame, kernel)
                .map_err(CycleError::from)
                .and_then(|result| {
                    let jpeg = encode_jpeg(&result.annotated_frame, quality)?;
                    Ok((result, jpeg))
                });
            (detector, outcome)
        })
        .await
        .map_err(|e| CycleError::Worker(e.to_string()))?;
        self.detector = Some(detector);

        let (result, jpeg) = outcome?;
        let jpeg = Bytes::from(jpeg);
        let sequence = self
            .publisher
            .publish(PreviewFrame::new(result.annotated_frame, jpeg.clone(), result.motion));

        let snapshot = match (&mut self.snapshots, result.motion) {
            (Some(store), true) => match store.persist(&jpeg).await {
                Ok(path) => {
                    self.stats.snapshots_written.fetch_add(1, Ordering::Relaxed);
                    Some(path)
                }
                Err(e) => {
                    warn!(error = %e, sequence, "failed to persist motion snapshot");
                    None
                }
            },
            _ => None,
        };

        debug!(sequence, motion = result.motion, boxes = result.boxes.len(), kernel, "cycle complete");
        Ok(CycleOutcome {
            sequence,
            motion: result.motion,
            snapshot,
        })
    }

    fn record(&mut self, result: Result<CycleOutcome, CycleError>) {
        match result {
            Ok(outcome) => {
                if self.consecutive_failures > 0 {
                    info!(
                        failures = self.consecutive_failures,
                        sequence = outcome.sequence,
                        "capture recovered"
                    );
                    self.consecutive_failures = 0;
                }
                if let Some(path) = outcome.snapshot {
                    info!(path = %path.display(), "motion detected, snapshot saved");
                }
            }
            Err(CycleError::Capture(e)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == FAILURE_WARN_THRESHOLD {
                    warn!(
                        failures = self.consecutive_failures,
                        error = %e,
                        "camera keeps failing, still retrying every tick"
                    );
                } else {
                    debug!(failures = self.consecutive_failures, error = %e, "capture failed, skipping cycle");
                }
            }
            Err(e) => {
                warn!(error = %e, "cycle skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview;
    use crate::source::TestPatternSource;
    use motion_preview_common::frame::Frame;
    use std::collections::VecDeque;

    /// Plays back a fixed script of frames and failures.
    struct ScriptedSource {
        script: VecDeque<Result<Frame, CaptureError>>,
    }

    impl FrameSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn configure(&mut self, _resolution: Resolution) {}

        async fn capture(&mut self) -> Result<Frame, CaptureError> {
            self.script
                .pop_front()
                .unwrap_or(Err(CaptureError::NotStarted("scripted")))
        }
    }

    /// Never returns a frame.
    struct StalledSource;

    impl FrameSource for StalledSource {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn configure(&mut self, _resolution: Resolution) {}

        async fn capture(&mut self) -> Result<Frame, CaptureError> {
            std::future::pending().await
        }
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            interval: Duration::from_millis(200),
            capture_timeout: Duration::from_millis(500),
            resolution: Resolution {
                width: 120,
                height: 90,
            },
            rotate_180: false,
            min_contour_area: 10,
            jpeg_quality: 80,
        }
    }

    fn build<S: FrameSource>(
        source: S,
        snapshots: Option<SnapshotStore>,
    ) -> (CaptureLoop<S>, preview::PreviewReader, Arc<PipelineStats>) {
        let (publisher, reader) = preview::channel();
        let stats = Arc::new(PipelineStats::default());
        let capture = CaptureLoop::new(
            source,
            publisher,
            snapshots,
            BlurKernel::new(1).unwrap(),
            Arc::clone(&stats),
            settings(),
        );
        (capture, reader, stats)
    }

    fn background() -> Frame {
        Frame::solid_bgr(120, 90, [128, 128, 128])
    }

    #[tokio::test]
    async fn failed_capture_leaves_preview_untouched() {
        let source = ScriptedSource {
            script: VecDeque::from([Err(CaptureError::HttpStatus(503)), Ok(background())]),
        };
        let (mut capture, reader, _) = build(source, None);

        assert!(matches!(capture.run_cycle().await, Err(CycleError::Capture(_))));
        assert_eq!(reader.read().sequence, 0);

        let outcome = capture.run_cycle().await.unwrap();
        assert_eq!(outcome.sequence, 1);
        assert!(!outcome.motion);
        assert!(reader.read().frame.is_some());
    }

    #[tokio::test]
    async fn motion_writes_numbered_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let moved = background().with_filled_rect(30, 20, 40, 40, [255, 255, 255]);
        let source = ScriptedSource {
            script: VecDeque::from([Ok(background()), Ok(moved.clone()), Ok(moved)]),
        };
        let (mut capture, reader, stats) =
            build(source, Some(SnapshotStore::new(dir.path(), "motion_")));

        assert!(capture.run_cycle().await.unwrap().snapshot.is_none());
        let second = capture.run_cycle().await.unwrap();
        assert!(second.motion);
        let path = second.snapshot.unwrap();
        assert!(path.ends_with("motion_00000.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), reader.read().frame.unwrap().jpeg());

        // Same frame again: no motion, no new file.
        let third = capture.run_cycle().await.unwrap();
        assert!(!third.motion);
        assert!(third.snapshot.is_none());
        assert_eq!(stats.snapshots_written.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_frame_is_skipped_without_losing_history() {
        let source = ScriptedSource {
            script: VecDeque::from([
                Ok(background()),
                Ok(Frame::solid_bgr(0, 0, [0, 0, 0])),
                Ok(background()),
            ]),
        };
        let (mut capture, reader, _) = build(source, None);

        capture.run_cycle().await.unwrap();
        assert!(matches!(capture.run_cycle().await, Err(CycleError::Detect(_))));
        assert_eq!(reader.read().sequence, 1);

        let third = capture.run_cycle().await.unwrap();
        assert!(!third.motion);
        assert_eq!(third.sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_camera_times_out() {
        let (mut capture, reader, _) = build(StalledSource, None);
        let err = capture.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Capture(CaptureError::Timeout(_))));
        assert_eq!(reader.read().sequence, 0);
    }

    #[tokio::test]
    async fn rotation_is_applied_before_publish() {
        let marked = background().with_filled_rect(0, 0, 1, 1, [0, 0, 255]);
        let source = ScriptedSource {
            script: VecDeque::from([Ok(marked)]),
        };
        let (publisher, reader) = preview::channel();
        let mut capture = CaptureLoop::new(
            source,
            publisher,
            None,
            BlurKernel::new(1).unwrap(),
            Arc::new(PipelineStats::default()),
            CaptureSettings {
                rotate_180: true,
                ..settings()
            },
        );
        capture.run_cycle().await.unwrap();
        let snapshot = reader.read();
        let frame = snapshot.frame.unwrap();
        assert_eq!(frame.frame().pixel(119, 89).unwrap(), &[0, 0, 255]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_publishing_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (capture, reader, stats) = build(
            TestPatternSource::new(),
            Some(SnapshotStore::new(dir.path(), "motion_")),
        );
        let (trigger, shutdown) = Shutdown::new();
        let task = tokio::spawn(capture.run(shutdown));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        trigger.send(true).unwrap();
        task.await.unwrap();

        // Ticks at 0, 200, ..., 1000 ms.
        let published = reader.read().sequence;
        assert!((5..=6).contains(&published), "published {published}");
        // The pattern moves every frame, so every frame after the first is motion.
        assert_eq!(stats.snapshots_written.load(Ordering::Relaxed), published - 1);
    }
}
