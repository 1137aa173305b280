use motion_preview_common::frame::Frame;

use super::{CaptureError, FrameSource, Resolution};

const BACKGROUND: [u8; 3] = [96, 96, 96];
const SQUARE: [u8; 3] = [40, 200, 240];
const STEP: i64 = 8;

/// Synthetic camera: a bright square bouncing across a flat background.
///
/// Every capture moves the square, so the detector sees motion on each frame
/// after the first. Useful for running the service without hardware.
pub struct TestPatternSource {
    resolution: Resolution,
    started: bool,
    pos: (i64, i64),
    vel: (i64, i64),
}

impl TestPatternSource {
    pub fn new() -> Self {
        Self {
            resolution: Resolution {
                width: 640,
                height: 480,
            },
            started: false,
            pos: (0, 0),
            vel: (STEP, STEP / 2),
        }
    }

    fn square_size(&self) -> i64 {
        (self.resolution.width.min(self.resolution.height) as i64 / 6).max(1)
    }

    fn advance(&mut self) {
        let size = self.square_size();
        let max_x = (self.resolution.width as i64 - size).max(0);
        let max_y = (self.resolution.height as i64 - size).max(0);

        let (mut x, mut y) = (self.pos.0 + self.vel.0, self.pos.1 + self.vel.1);
        if x < 0 || x > max_x {
            self.vel.0 = -self.vel.0;
            x = x.clamp(0, max_x);
        }
        if y < 0 || y > max_y {
            self.vel.1 = -self.vel.1;
            y = y.clamp(0, max_y);
        }
        self.pos = (x, y);
    }

    /// Top-left corner of the square in the next frame.
    pub fn position(&self) -> (u32, u32) {
        (self.pos.0 as u32, self.pos.1 as u32)
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &'static str {
        "test-pattern"
    }

    fn configure(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.pos = (0, 0);
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted("test-pattern"));
        }
        let size = self.square_size() as u32;
        let (x, y) = self.position();
        let frame = Frame::solid_bgr(self.resolution.width, self.resolution.height, BACKGROUND)
            .with_filled_rect(x, y, size, size, SQUARE);
        self.advance();
        Ok(frame)
    }

    fn stop(&mut self) {
        self.started = false;
    }
}
