use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageReader};
use motion_preview_common::frame::{Frame, FrameError, PixelFormat};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode empty {width}x{height} frame")]
    Empty { width: u32, height: u32 },
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read image header: {0}")]
    Header(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Compress a frame to JPEG. BGR frames are reordered to RGB first.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if frame.is_empty() {
        return Err(EncodeError::Empty {
            width: frame.width(),
            height: frame.height(),
        });
    }

    let mut out = Vec::with_capacity(frame.data().len() / 8);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        match frame.format() {
            PixelFormat::Bgr8 => {
                let rgb: Vec<u8> = frame
                    .data()
                    .chunks_exact(3)
                    .flat_map(|px| [px[2], px[1], px[0]])
                    .collect();
                encoder.encode(&rgb, frame.width(), frame.height(), ExtendedColorType::Rgb8)?;
            }
            PixelFormat::Gray8 => {
                encoder.encode(frame.data(), frame.width(), frame.height(), ExtendedColorType::L8)?;
            }
        }
    }
    Ok(out)
}

/// Decode a compressed image (format sniffed from the bytes) into a BGR frame.
/// When `size` is given and differs from the decoded size, the image is
/// resized to it.
pub fn decode_bgr(data: &[u8], size: Option<(u32, u32)>) -> Result<Frame, DecodeError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;

    let mut rgb = img.to_rgb8();
    if let Some((w, h)) = size {
        if rgb.dimensions() != (w, h) {
            rgb = image::imageops::resize(&rgb, w, h, FilterType::Triangle);
        }
    }

    let (w, h) = rgb.dimensions();
    let bgr: Vec<u8> = rgb
        .as_raw()
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    Ok(Frame::new(w, h, PixelFormat::Bgr8, bgr)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUALITY: u8 = 80;

    #[test]
    fn encodes_valid_jpeg_markers() {
        let frame = Frame::solid_bgr(32, 16, [10, 200, 30]);
        let jpeg = encode_jpeg(&frame, QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn empty_frame_is_encode_error() {
        let frame = Frame::solid_bgr(0, 8, [0, 0, 0]);
        assert!(matches!(
            encode_jpeg(&frame, QUALITY),
            Err(EncodeError::Empty { .. })
        ));
    }

    #[test]
    fn decode_keeps_channel_order_and_resizes() {
        // Pure blue in BGR order survives an encode/decode cycle approximately.
        let frame = Frame::solid_bgr(16, 16, [255, 0, 0]);
        let jpeg = encode_jpeg(&frame, 95).unwrap();

        let decoded = decode_bgr(&jpeg, Some((8, 4))).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
        let px = decoded.pixel(3, 2).unwrap();
        assert!(px[0] > 200 && px[2] < 60, "expected blue-dominant pixel, got {px:?}");
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_bgr(b"not an image", None).is_err());
    }
}
