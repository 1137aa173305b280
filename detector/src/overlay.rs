//! Drawing onto BGR pixel buffers.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use motion_preview_common::frame::{Frame, FrameError, PixelFormat};

use crate::contours::BoundingBox;
use crate::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

pub const GREEN: [u8; 3] = [0, 255, 0];
pub const RED: [u8; 3] = [0, 0, 255];

/// Mutable canvas built from a frame. Drawing outside the bounds is clipped.
///
/// Pixels are stored in BGR order; the `Rgb` wrapper is only a container.
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    /// Copy `frame` into a BGR canvas, expanding grayscale to three channels.
    pub fn from_frame(frame: &Frame) -> Self {
        let mut image = RgbImage::new(frame.width(), frame.height());
        match frame.format() {
            PixelFormat::Bgr8 => {
                for (dst, src) in image.chunks_exact_mut(3).zip(frame.data().chunks_exact(3)) {
                    dst.copy_from_slice(src);
                }
            }
            PixelFormat::Gray8 => {
                for (dst, &v) in image.chunks_exact_mut(3).zip(frame.data()) {
                    dst.fill(v);
                }
            }
        }
        Self { image }
    }

    pub fn into_frame(self) -> Result<Frame, FrameError> {
        let (width, height) = self.image.dimensions();
        Frame::new(width, height, PixelFormat::Bgr8, self.image.into_raw())
    }

    fn fill(&mut self, x: i64, y: i64, w: u32, h: u32, bgr: [u8; 3]) {
        if w == 0 || h == 0 {
            return;
        }
        let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
            return;
        };
        draw_filled_rect_mut(&mut self.image, Rect::at(x, y).of_size(w, h), Rgb(bgr));
    }

    /// Rectangle outline of the given thickness, drawn inward from the box edge.
    pub fn draw_box(&mut self, bbox: &BoundingBox, bgr: [u8; 3], thickness: u32) {
        let t = thickness.min(bbox.width).min(bbox.height).max(1);
        for inset in 0..t {
            let (w, h) = (
                bbox.width.saturating_sub(2 * inset),
                bbox.height.saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let (Ok(x), Ok(y)) = (i32::try_from(bbox.x + inset), i32::try_from(bbox.y + inset)) else {
                return;
            };
            draw_hollow_rect_mut(&mut self.image, Rect::at(x, y).of_size(w, h), Rgb(bgr));
        }
    }

    /// Render `text` with its top-left corner at (x, y), each glyph pixel
    /// scaled to a `scale`x`scale` block.
    pub fn draw_text(&mut self, text: &str, x: i64, y: i64, bgr: [u8; 3], scale: u32) {
        let s = scale.max(1);
        let mut pen_x = x;
        for c in text.chars() {
            let rows = font::glyph(c);
            for (row_idx, row) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if font::lit(*row, col) {
                        let px = pen_x + (col * s) as i64;
                        let py = y + row_idx as i64 * s as i64;
                        self.fill(px, py, s, s, bgr);
                    }
                }
            }
            pen_x += (ADVANCE * s) as i64;
        }
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }
}

/// Glyph scale that keeps the label readable on the given frame width.
pub fn text_scale(width: u32) -> u32 {
    match width {
        0..=319 => 1,
        320..=959 => 2,
        _ => 3,
    }
}

/// Height in pixels of one rendered text line at `scale`.
pub fn line_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale
}
