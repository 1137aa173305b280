pub mod contours;
pub mod encode;
mod font;
pub mod imgproc;
pub mod motion;
pub mod overlay;

pub use contours::BoundingBox;
pub use encode::{decode_bgr, encode_jpeg, DecodeError, EncodeError};
pub use motion::{validate_kernel, DetectError, DetectionResult, MotionDetector};
