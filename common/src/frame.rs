/// Pixel layout of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 3 bytes per pixel, blue-green-red order (what the camera produces).
    Bgr8,
    /// 1 byte per pixel luma.
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A decoded raster image.
///
/// Pixels are stored row-major, tightly packed:
///   offset(x, y) = (y * width + x) * channels
///
/// Frames are never mutated in place once handed to another component;
/// processing steps produce a new frame instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing pixel buffer. The buffer length must match the
    /// dimensions exactly.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                channels: format.channels(),
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A BGR frame where every pixel has the same color.
    pub fn solid_bgr(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            format: PixelFormat::Bgr8,
            data,
        }
    }

    // -- Accessors --------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if the frame has no pixels (zero width or height).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the channel bytes of the pixel at (x, y), or None when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * c;
        Some(&self.data[start..start + c])
    }

    // -- Transforms -------------------------------------------------------------

    /// Rotate by 180 degrees (flip both axes).
    pub fn rotate_180(&self) -> Self {
        let c = self.channels();
        let mut data = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(c).rev() {
            data.extend_from_slice(px);
        }
        Self {
            width: self.width,
            height: self.height,
            format: self.format,
            data,
        }
    }

    /// Copy of this BGR frame with an axis-aligned rectangle filled with `bgr`.
    /// The rectangle is clipped to the frame bounds.
    pub fn with_filled_rect(&self, x: u32, y: u32, w: u32, h: u32, bgr: [u8; 3]) -> Self {
        let mut out = self.clone();
        if self.format != PixelFormat::Bgr8 {
            return out;
        }
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let i = (row as usize * self.width as usize + col as usize) * 3;
                out.data[i..i + 3].copy_from_slice(&bgr);
            }
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("pixel buffer is {got} bytes, expected {expected} for {width}x{height}x{channels}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: usize,
        got: usize,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_short_buffer() {
        let err = Frame::new(4, 4, PixelFormat::Bgr8, vec![0; 47]).unwrap_err();
        assert!(matches!(err, FrameError::BufferSize { got: 47, expected: 48, .. }));
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        let frame = Frame::new(0, 10, PixelFormat::Gray8, vec![]).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn rotate_180_moves_corner() {
        let frame = Frame::solid_bgr(3, 2, [0, 0, 0]).with_filled_rect(0, 0, 1, 1, [1, 2, 3]);
        let rotated = frame.rotate_180();
        assert_eq!(rotated.pixel(2, 1).unwrap(), &[1, 2, 3]);
        assert_eq!(rotated.pixel(0, 0).unwrap(), &[0, 0, 0]);
    }

    #[test]
    fn filled_rect_is_clipped() {
        let frame = Frame::solid_bgr(4, 4, [0, 0, 0]).with_filled_rect(2, 2, 10, 10, [9, 9, 9]);
        assert_eq!(frame.pixel(3, 3).unwrap(), &[9, 9, 9]);
        assert_eq!(frame.pixel(1, 1).unwrap(), &[0, 0, 0]);
        assert!(frame.pixel(4, 0).is_none());
    }
}
