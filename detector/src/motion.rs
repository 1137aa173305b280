use chrono::{DateTime, Local};
use image::GrayImage;
use motion_preview_common::config::MAX_BLUR_KERNEL;
use motion_preview_common::frame::{Frame, FrameError};
use tracing::debug;

use crate::contours::{external_regions, BoundingBox};
use crate::imgproc::{abs_diff, dilate, gaussian_blur, threshold, to_gray};
use crate::overlay::{line_height, text_scale, Canvas, GREEN, RED};

/// Intensity change (0..255) above which a pixel counts as moving.
pub const DIFF_THRESHOLD: u8 = 25;
/// Dilation passes merging adjacent motion blobs.
pub const DILATE_ITERATIONS: u8 = 2;
const BOX_THICKNESS: u32 = 2;
const TEXT_MARGIN: i64 = 10;

pub const LABEL_MOTION: &str = "Detected";
pub const LABEL_IDLE: &str = "No Detected";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("blur kernel size must be positive")]
    ZeroKernel,
    #[error("blur kernel size must be odd, got {0}")]
    EvenKernel(u32),
    #[error("blur kernel size {size} exceeds the maximum of {max}")]
    KernelTooLarge { size: u32, max: u32 },
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Outcome of one `detect` call.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub motion: bool,
    /// Input frame with boxes, status label and timestamp drawn on it (BGR).
    pub annotated_frame: Frame,
    /// Boxes that passed the area filter, in the order they were drawn.
    pub boxes: Vec<BoundingBox>,
}

/// Frame-differencing motion detector with one frame of history.
///
/// Algorithm per call:
/// 1. Grayscale + Gaussian blur of the incoming frame
/// 2. |blurred - previous blurred|, thresholded at [`DIFF_THRESHOLD`]
/// 3. Dilation to merge nearby blobs, then external region extraction
/// 4. Regions whose boundary encloses at least `min_contour_area` square
///    pixels are boxed on the output
///
/// The blurred frame always replaces the history afterwards, so feeding the
/// same frame twice never reports motion on the second call.
pub struct MotionDetector {
    history: Option<GrayImage>,
    min_contour_area: u32,
}

impl MotionDetector {
    pub fn new(min_contour_area: u32) -> Self {
        Self {
            history: None,
            min_contour_area,
        }
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    /// The blurred grayscale frame from the last successful call.
    pub fn history(&self) -> Option<&GrayImage> {
        self.history.as_ref()
    }

    pub fn detect(&mut self, frame: &Frame, blur_kernel_size: u32) -> Result<DetectionResult, DetectError> {
        self.detect_at(frame, blur_kernel_size, Local::now())
    }

    /// Same as [`detect`](Self::detect) with an explicit overlay timestamp.
    pub fn detect_at(
        &mut self,
        frame: &Frame,
        blur_kernel_size: u32,
        now: DateTime<Local>,
    ) -> Result<DetectionResult, DetectError> {
        validate_kernel(blur_kernel_size)?;
        if frame.is_empty() {
            return Err(DetectError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let current = gaussian_blur(&to_gray(frame), blur_kernel_size);

        let boxes = match self.history.take() {
            Some(prev) if prev.dimensions() == current.dimensions() => {
                self.motion_boxes(&prev, &current)
            }
            Some(prev) => {
                debug!(
                    prev = ?prev.dimensions(),
                    current = ?current.dimensions(),
                    "frame size changed, restarting history"
                );
                Vec::new()
            }
            None => {
                debug!("first frame, storing history");
                Vec::new()
            }
        };
        self.history = Some(current);

        let motion = !boxes.is_empty();
        let annotated_frame = annotate(frame, &boxes, motion, &now.format(TIMESTAMP_FORMAT).to_string())?;

        debug!(motion, boxes = boxes.len(), kernel = blur_kernel_size, "motion check");

        Ok(DetectionResult {
            motion,
            annotated_frame,
            boxes,
        })
    }

    fn motion_boxes(&self, prev: &GrayImage, current: &GrayImage) -> Vec<BoundingBox> {
        let delta = abs_diff(current, prev);
        let mask = dilate(&threshold(&delta, DIFF_THRESHOLD), DILATE_ITERATIONS);
        external_regions(&mask)
            .into_iter()
            .filter(|r| r.area >= f64::from(self.min_contour_area))
            .map(|r| r.bbox)
            .collect()
    }
}

/// Reject kernel sizes the blur cannot use.
pub fn validate_kernel(blur_kernel_size: u32) -> Result<(), DetectError> {
    if blur_kernel_size == 0 {
        return Err(DetectError::ZeroKernel);
    }
    if blur_kernel_size % 2 == 0 {
        return Err(DetectError::EvenKernel(blur_kernel_size));
    }
    if blur_kernel_size > MAX_BLUR_KERNEL {
        return Err(DetectError::KernelTooLarge {
            size: blur_kernel_size,
            max: MAX_BLUR_KERNEL,
        });
    }
    Ok(())
}

fn annotate(
    frame: &Frame,
    boxes: &[BoundingBox],
    motion: bool,
    timestamp: &str,
) -> Result<Frame, FrameError> {
    let mut canvas = Canvas::from_frame(frame);
    for bbox in boxes {
        canvas.draw_box(bbox, GREEN, BOX_THICKNESS);
    }

    let scale = text_scale(canvas.width());
    let label = if motion { LABEL_MOTION } else { LABEL_IDLE };
    canvas.draw_text(label, TEXT_MARGIN, TEXT_MARGIN, RED, scale);
    let bottom = canvas.height() as i64 - TEXT_MARGIN - line_height(scale) as i64;
    canvas.draw_text(timestamp, TEXT_MARGIN, bottom, RED, scale);

    canvas.into_frame()
}
