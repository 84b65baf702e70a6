//! Stage-1 object features: size, slant, brightness.

use nalgebra::{distance, Point2};
use std::f32::consts::PI;
use tracing::debug;

use crate::errors::FprError;
use crate::imaging::{alloc_buffer, crop_side, crop_u16};
use crate::io::{Candidate3D, Detection2D, SliceStack};

/// Abscissa step between consecutive members in the slant fit.
pub const Z_STEP: f32 = 3.0;

/// Pixels at or below this value are background and excluded from gray levels.
pub const GL_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectFeatures {
    pub length: usize,
    pub max_radius_mm: f32,
    pub mean_gl: f32,
    pub volume: f32,
    pub angle_deg: f32,
}

/// Largest member radius in mm; member-less regions use their own radius.
pub fn max_radius_mm(cand: &Candidate3D, pixel_spacing: f32) -> f32 {
    if cand.members.is_empty() {
        return cand.region.radius * pixel_spacing;
    }
    cand.members
        .iter()
        .map(|m| m.radius * pixel_spacing)
        .fold(0.0, f32::max)
}

/// Σ (radius · spacing)² over the members.
pub fn volume(cand: &Candidate3D, pixel_spacing: f32) -> f32 {
    cand.members
        .iter()
        .map(|m| (m.radius * pixel_spacing).powi(2))
        .sum()
}

/// Least-squares `y = slope·x + intercept`.
fn polyfit_linear(x: &[f32], y: &[f32]) -> (f32, f32) {
    let n = x.len() as f32;
    let sx: f32 = x.iter().sum();
    let sy: f32 = y.iter().sum();
    let sxx: f32 = x.iter().map(|v| v * v).sum();
    let sxy: f32 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let denom = n * sxx - sx * sx;
    if denom.abs() < f32::EPSILON {
        return (0.0, sy / n);
    }
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;
    (slope, intercept)
}

#[inline]
fn polyval_linear(slope: f32, intercept: f32, x: f32) -> f32 {
    slope * x + intercept
}

/// Slant of the member centroids with respect to the slice axis.
///
/// x(z) and y(z) are fitted separately with `z_i = Z_STEP·i`; `d` is the
/// planar distance between the fitted endpoints at `z = 0` and `z = z_max`,
/// and the angle is `2·atan(d / L) / π · calibration`.
pub fn slant_angle(cand: &Candidate3D, calibration: f32) -> f32 {
    let length = cand.length();
    if length < 2 {
        return 0.0;
    }
    let z: Vec<f32> = (0..length).map(|i| Z_STEP * i as f32).collect();
    let xs: Vec<f32> = cand.members.iter().map(|m| m.x).collect();
    let ys: Vec<f32> = cand.members.iter().map(|m| m.y).collect();

    let (ax, bx) = polyfit_linear(&z, &xs);
    let (ay, by) = polyfit_linear(&z, &ys);
    let z_max = z[length - 1];

    let start = Point2::new(polyval_linear(ax, bx, 0.0), polyval_linear(ay, by, 0.0));
    let end = Point2::new(polyval_linear(ax, bx, z_max), polyval_linear(ay, by, z_max));
    let d = distance(&start, &end);

    2.0 * (d / length as f32).atan() / PI * calibration
}

/// Mean of the non-background pixels in a square crop around the detection.
///
/// The crop half-side is `radius·2` rounded. A crop with no foreground pixel
/// (or a detection on a missing slice) has mean gray level 0.
pub fn member_mean_gl(det: &Detection2D, stack: &SliceStack) -> Result<f32, FprError> {
    let Some(slice) = stack.slice(det.slice) else {
        debug!("slice {} not in stack, gray level taken as 0", det.slice);
        return Ok(0.0);
    };
    let radius = (det.radius * 2.0 + 0.5) as usize;
    let side = crop_side(radius);
    let mut crop = alloc_buffer("gray level crop", side * side)?;
    crop_u16(
        slice,
        stack.width(),
        stack.height(),
        det.x as i64,
        det.y as i64,
        radius,
        &mut crop,
    );

    let (sum, count) = crop
        .iter()
        .filter(|&&v| v > GL_EPSILON)
        .fold((0.0f64, 0usize), |(s, c), &v| (s + v as f64, c + 1));
    if count == 0 {
        debug!(
            "no foreground around ({}, {}) on slice {}, gray level taken as 0",
            det.x, det.y, det.slice
        );
        return Ok(0.0);
    }
    Ok((sum / count as f64) as f32)
}

/// Average of the members' gray levels.
pub fn mean_gl(cand: &Candidate3D, stack: &SliceStack) -> Result<f32, FprError> {
    if cand.members.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for member in &cand.members {
        total += member_mean_gl(member, stack)?;
    }
    Ok(total / cand.length() as f32)
}
