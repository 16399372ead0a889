//! Pixel-level primitives for ROI frame differencing.
//!
//! The arithmetic follows the usual 8-bit computer-vision conventions so that
//! thresholds tuned against a reference pipeline carry over:
//! - bilinear resize with half-pixel centres
//! - fixed-point BT.601 luma (14-bit coefficients, rounded)
//! - 5x5 Gaussian with the binomial kernel [1 4 6 4 1] / 16, reflect-101 borders

use crate::frame::{Frame, GrayFrame};

use super::roi::Roi;

const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

const GAUSS_5: [u32; 5] = [1, 4, 6, 4, 1];

/// Resize `frame` to `width x height` and convert to intensity in one pass.
pub fn to_process_gray(frame: &Frame, width: u32, height: u32) -> GrayFrame {
    let resized = resize_bilinear(frame, width, height);
    let mut gray = Vec::with_capacity((width as usize) * (height as usize));
    for px in resized.chunks_exact(3) {
        gray.push(luma(px[0], px[1], px[2]));
    }
    GrayFrame::from_parts(gray, width, height)
}

/// BT.601 luma from RGB with rounding.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (r as u32) * LUMA_R + (g as u32) * LUMA_G + (b as u32) * LUMA_B;
    ((y + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT).min(255) as u8
}

/// Bilinear resize of an RGB24 frame. Returns interleaved RGB bytes.
pub fn resize_bilinear(frame: &Frame, width: u32, height: u32) -> Vec<u8> {
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;
    let dst_w = width as usize;
    let dst_h = height as usize;
    let src = frame.as_bytes();

    if src_w == dst_w && src_h == dst_h {
        return src.to_vec();
    }

    let xs: Vec<(usize, usize, f32)> = (0..dst_w)
        .map(|dx| sample_axis(dx, src_w, dst_w))
        .collect();
    let mut out = Vec::with_capacity(dst_w * dst_h * 3);

    for dy in 0..dst_h {
        let (y0, y1, fy) = sample_axis(dy, src_h, dst_h);
        let row0 = y0 * src_w * 3;
        let row1 = y1 * src_w * 3;
        for &(x0, x1, fx) in &xs {
            for c in 0..3 {
                let p00 = src[row0 + x0 * 3 + c] as f32;
                let p01 = src[row0 + x1 * 3 + c] as f32;
                let p10 = src[row1 + x0 * 3 + c] as f32;
                let p11 = src[row1 + x1 * 3 + c] as f32;
                let top = p00 + (p01 - p00) * fx;
                let bottom = p10 + (p11 - p10) * fx;
                let value = top + (bottom - top) * fy;
                out.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Source indices and weight for destination coordinate `d`.
fn sample_axis(d: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let f = (d as f32 + 0.5) * scale - 0.5;
    let mut s = f.floor();
    let mut frac = f - s;
    if s < 0.0 {
        s = 0.0;
        frac = 0.0;
    }
    let mut i0 = s as usize;
    if i0 >= src_len - 1 {
        i0 = src_len - 1;
        frac = 0.0;
    }
    let i1 = (i0 + 1).min(src_len - 1);
    (i0, i1, frac)
}

/// Copy the ROI window out of a gray frame.
pub fn crop(gray: &GrayFrame, roi: &Roi) -> Vec<u8> {
    let mut out = Vec::with_capacity(roi.area());
    let stride = gray.width() as usize;
    let src = gray.as_bytes();
    for y in roi.y1..roi.y2 {
        let start = (y as usize) * stride + roi.x1 as usize;
        let end = (y as usize) * stride + roi.x2 as usize;
        out.extend_from_slice(&src[start..end]);
    }
    out
}

/// Per-pixel |a - b|.
pub fn abs_diff(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y)).collect()
}

/// Separable 5x5 Gaussian blur (zero sigma) with reflect-101 borders.
pub fn gaussian_blur_5x5(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut horizontal = vec![0u32; width * height];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0u32;
            for (k, weight) in GAUSS_5.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - 2, width);
                acc += weight * row[sx] as u32;
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for (k, weight) in GAUSS_5.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - 2, height);
                acc += weight * horizontal[sy * width + x];
            }
            out[y * width + x] = ((acc + 128) >> 8).min(255) as u8;
        }
    }
    out
}

/// Mirror an out-of-range index without repeating the edge sample
/// (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Binary threshold in place: `> threshold` becomes 255, everything else 0.
pub fn threshold_binary(map: &mut [u8], threshold: u8) {
    for px in map.iter_mut() {
        *px = if *px > threshold { 255 } else { 0 };
    }
}

/// Number of pixels set in a binary map.
pub fn count_set(map: &[u8]) -> u32 {
    map.iter().filter(|&&px| px == 255).count() as u32
}
