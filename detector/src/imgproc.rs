//! Grayscale image primitives used by the motion detector.
//!
//! All functions take and return `image::GrayImage` and never modify their
//! input.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use motion_preview_common::frame::{Frame, PixelFormat};

/// BT.601 luma, 8-bit fixed point (weights sum to 256).
const R_WEIGHT: u32 = 77;
const G_WEIGHT: u32 = 150;
const B_WEIGHT: u32 = 29;

/// Convert a frame to single-channel grayscale.
pub fn to_gray(frame: &Frame) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    match frame.format() {
        PixelFormat::Gray8 => {
            for (dst, &v) in out.iter_mut().zip(frame.data()) {
                *dst = v;
            }
        }
        PixelFormat::Bgr8 => {
            for (dst, px) in out.iter_mut().zip(frame.data().chunks_exact(3)) {
                let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
                *dst = ((r * R_WEIGHT + g * G_WEIGHT + b * B_WEIGHT + 128) >> 8) as u8;
            }
        }
    }
    out
}

/// Sigma used for a given kernel size when none is specified explicitly.
fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    let sigma = sigma_for_kernel(ksize);
    let half = (ksize / 2) as i32;
    let mut weights: Vec<f32> = (-half..=half)
        .map(|i| {
            let d = i as f32;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Mirror an out-of-range index back into `0..len` without repeating the
/// edge sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(mut i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * len - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur. `ksize` must be odd; callers validate it.
pub fn gaussian_blur(src: &GrayImage, ksize: u32) -> GrayImage {
    let (w, h) = src.dimensions();
    if ksize <= 1 || w == 0 || h == 0 {
        return src.clone();
    }
    let kernel = gaussian_kernel(ksize);
    let half = (ksize / 2) as i64;
    let raw = src.as_raw();

    // Horizontal pass into f32 scratch.
    let mut tmp = vec![0f32; raw.len()];
    for y in 0..h as usize {
        let row = &raw[y * w as usize..(y + 1) * w as usize];
        for x in 0..w as i64 {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x + k as i64 - half, w as i64);
                acc += row[sx] as f32 * weight;
            }
            tmp[y * w as usize + x as usize] = acc;
        }
    }

    // Vertical pass.
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as usize {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y + k as i64 - half, h as i64);
                acc += tmp[sy * w as usize + x] * weight;
            }
            out.put_pixel(x as u32, y as u32, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Per-pixel |a - b|. Both images must share dimensions.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (p, &q) in out.iter_mut().zip(b.iter()) {
        *p = p.abs_diff(q);
    }
    out
}

/// Binary threshold: pixels strictly above `thresh` become 255, the rest 0.
pub fn threshold(src: &GrayImage, thresh: u8) -> GrayImage {
    let mut out = src.clone();
    for p in out.iter_mut() {
        *p = if *p > thresh { 255 } else { 0 };
    }
    out
}

/// Morphological dilation with a 3x3 rectangular element, repeated
/// `iterations` times. Pixels outside the image never contribute.
pub fn dilate(src: &GrayImage, iterations: u8) -> GrayImage {
    // k passes of a 3x3 square equal one pass of a (2k+1)-square.
    morphology::dilate(src, Norm::LInf, iterations)
}
