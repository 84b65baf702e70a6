//! Pixel-level primitives used by feature extraction and view scoring.
//!
//! Buffers are flat row-major `f32` squares of side `2·r + 1`; callers own
//! and reuse them.

pub mod transform;

pub use transform::{resize_bilinear, rotate_bilinear};

use crate::errors::FprError;

/// Zeroed work buffer; a failed reservation is reported instead of aborting.
pub fn alloc_buffer(buffer: &'static str, len: usize) -> Result<Vec<f32>, FprError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FprError::memory(buffer, len))?;
    v.resize(len, 0.0);
    Ok(v)
}

/// Side length of a square crop with the given radius.
#[inline]
pub fn crop_side(radius: usize) -> usize {
    2 * radius + 1
}

/// Cuts a `(2r+1)²` square centered on `(cx, cy)` out of a 16-bit slice.
/// Pixels falling outside the slice are zero.
pub fn crop_u16(
    slice: &[u16],
    width: usize,
    height: usize,
    cx: i64,
    cy: i64,
    radius: usize,
    out: &mut [f32],
) {
    let side = crop_side(radius);
    debug_assert_eq!(out.len(), side * side);
    let r = radius as i64;
    for dy in 0..side {
        let sy = cy - r + dy as i64;
        let row = &mut out[dy * side..(dy + 1) * side];
        if sy < 0 || sy >= height as i64 {
            row.fill(0.0);
            continue;
        }
        let base = sy as usize * width;
        for (dx, px) in row.iter_mut().enumerate() {
            let sx = cx - r + dx as i64;
            *px = if sx < 0 || sx >= width as i64 {
                0.0
            } else {
                f32::from(slice[base + sx as usize])
            };
        }
    }
}

/// Same as [`crop_u16`] for a float image.
pub fn crop_f32(
    src: &[f32],
    width: usize,
    height: usize,
    cx: i64,
    cy: i64,
    radius: usize,
    out: &mut [f32],
) {
    let side = crop_side(radius);
    debug_assert_eq!(out.len(), side * side);
    let r = radius as i64;
    for dy in 0..side {
        let sy = cy - r + dy as i64;
        for dx in 0..side {
            let sx = cx - r + dx as i64;
            out[dy * side + dx] =
                if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                    0.0
                } else {
                    src[sy as usize * width + sx as usize]
                };
        }
    }
}

pub fn scale_in_place(buf: &mut [f32], factor: f32) {
    for v in buf.iter_mut() {
        *v *= factor;
    }
}

/// Per-feature z-score clipped to `±n_sigma`. Features with zero deviation map to 0.
pub fn whiten(src: &[f32], dst: &mut [f32], n_sigma: f32, mean: &[f32], std: &[f32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (i, (s, d)) in src.iter().zip(dst.iter_mut()).enumerate() {
        let m = mean.get(i).copied().unwrap_or(0.0);
        let sd = std.get(i).copied().unwrap_or(0.0);
        *d = if sd > 0.0 {
            ((s - m) / sd).clamp(-n_sigma, n_sigma)
        } else {
            0.0
        };
    }
}
