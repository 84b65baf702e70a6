//! Scoring of one rotated 2D view of a detection.
//!
//! A view is produced by cropping a wide square around the detection,
//! rotating it, cutting the central region that stays populated under any
//! rotation, resizing it to the classifier's input size and whitening it.

use std::f32::consts::SQRT_2;
use tracing::debug;

use crate::config::Fpr2Config;
use crate::errors::FprError;
use crate::imaging::{
    alloc_buffer, crop_f32, crop_side, crop_u16, resize_bilinear, rotate_bilinear,
    scale_in_place, whiten,
};
use crate::io::{Detection2D, SliceStack};
use crate::svm::{Classifier, ScaleParams};

/// Crop radii for a detection: `(r_full, r_valid)`.
///
/// `r_full` is wide enough that the `r_valid` square stays inside the
/// rotated crop at every angle.
pub fn view_radii(radius: f32) -> (usize, usize) {
    let base = 2.0 * radius + 0.5;
    ((2.0 * SQRT_2 * base) as usize, (2.0 * base) as usize)
}

/// Work buffers for one detection, reused across its rotations.
#[derive(Debug)]
pub struct PreparedView {
    r_full: usize,
    r_valid: usize,
    /// Intensity-scaled crop, never modified after preparation.
    crop: Vec<f32>,
    rotated: Vec<f32>,
    cut: Vec<f32>,
    resized: Vec<f32>,
    whitened: Vec<f32>,
}

impl PreparedView {
    pub fn radii(&self) -> (usize, usize) {
        (self.r_full, self.r_valid)
    }

    pub fn crop(&self) -> &[f32] {
        &self.crop
    }

    /// Last vector handed to the classifier.
    pub fn features(&self) -> &[f32] {
        &self.whitened
    }
}

pub struct ViewClassifier<'a, C> {
    config: &'a Fpr2Config,
    stack: &'a SliceStack,
    classifier: &'a C,
    scales: &'a ScaleParams,
}

impl<'a, C: Classifier> ViewClassifier<'a, C> {
    pub fn new(
        config: &'a Fpr2Config,
        stack: &'a SliceStack,
        classifier: &'a C,
        scales: &'a ScaleParams,
    ) -> Self {
        ViewClassifier {
            config,
            stack,
            classifier,
            scales,
        }
    }

    pub fn num_rotations(&self) -> usize {
        self.config.num_rotations
    }

    /// Crops and rescales the detection's neighbourhood and reserves the
    /// buffers every rotation needs.
    pub fn prepare(&self, det: &Detection2D) -> Result<PreparedView, FprError> {
        let (r_full, r_valid) = view_radii(det.radius);
        let full = crop_side(r_full);
        let valid = crop_side(r_valid);
        let out = self.config.feature_len();

        let mut view = PreparedView {
            r_full,
            r_valid,
            crop: alloc_buffer("view crop", full * full)?,
            rotated: alloc_buffer("rotated view", full * full)?,
            cut: alloc_buffer("valid view", valid * valid)?,
            resized: alloc_buffer("resized view", out)?,
            whitened: alloc_buffer("whitened view", out)?,
        };

        match self.stack.slice(det.slice) {
            Some(slice) => crop_u16(
                slice,
                self.stack.width(),
                self.stack.height(),
                det.x as i64,
                det.y as i64,
                r_full,
                &mut view.crop,
            ),
            None => debug!("slice {} not in stack, view left blank", det.slice),
        }
        scale_in_place(&mut view.crop, self.config.intensity_scale);
        Ok(view)
    }

    /// Scores `view` rotated by `angle_deg`. `true` means nodule.
    pub fn classify(&self, view: &mut PreparedView, angle_deg: f32) -> Result<bool, FprError> {
        let full = crop_side(view.r_full);
        rotate_bilinear(&view.crop, &mut view.rotated, full, angle_deg);
        crop_f32(
            &view.rotated,
            full,
            full,
            view.r_full as i64,
            view.r_full as i64,
            view.r_valid,
            &mut view.cut,
        );
        resize_bilinear(
            &view.cut,
            crop_side(view.r_valid),
            &mut view.resized,
            self.config.resized_len,
        );
        whiten(
            &view.resized,
            &mut view.whitened,
            self.config.sigma_clip,
            &self.scales.mean,
            &self.scales.std,
        );
        self.classifier.predict(&view.whitened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{fpr2_config, paint_disk, CountingClassifier};

    #[test]
    fn test_view_radii_truncate() {
        // 2r + 0.5 = 6.5 -> full 18.38, valid 13
        assert_eq!(view_radii(3.0), (18, 13));
        assert_eq!(view_radii(0.0), (1, 1));
    }

    #[test]
    fn test_valid_square_fits_inside_rotated_crop() {
        for r in [1.0f32, 2.5, 4.0, 7.3, 12.0] {
            let (full, valid) = view_radii(r);
            // the corner of the valid square must stay within the full radius
            assert!(valid as f32 * SQRT_2 <= full as f32 + 1.0);
        }
    }

    #[test]
    fn test_prepare_scales_intensity() {
        let cfg = fpr2_config();
        let mut stack = SliceStack::zeros(80, 80, 2, 0.7);
        paint_disk(&mut stack, 1, 40.0, 40.0, 3.0, 65535);
        let scales = ScaleParams::identity(cfg.feature_len());
        let classifier = CountingClassifier::always(true);
        let views = ViewClassifier::new(&cfg, &stack, &classifier, &scales);

        let view = views.prepare(&Detection2D::new(1, 40.0, 40.0, 3.0)).unwrap();
        let (r_full, _) = view.radii();
        let side = crop_side(r_full);
        let center = view.crop()[r_full * side + r_full];
        approx::assert_relative_eq!(center, 65535.0 * cfg.intensity_scale, epsilon = 1e-2);
    }

    #[test]
    fn test_classify_feeds_whitened_vector_of_configured_size() {
        let cfg = fpr2_config();
        let mut stack = SliceStack::zeros(80, 80, 1, 0.7);
        paint_disk(&mut stack, 0, 40.0, 40.0, 3.0, 20000);
        let scales = ScaleParams::identity(cfg.feature_len());
        let classifier = CountingClassifier::always(false);
        let views = ViewClassifier::new(&cfg, &stack, &classifier, &scales);

        let mut view = views.prepare(&Detection2D::new(0, 40.0, 40.0, 3.0)).unwrap();
        for k in 0..4 {
            assert!(!views.classify(&mut view, 90.0 * k as f32).unwrap());
        }
        assert_eq!(classifier.calls(), 4);
        assert_eq!(view.features().len(), cfg.feature_len());
        // the disk center saturates the sigma clip
        let mid = cfg.resized_len / 2;
        approx::assert_relative_eq!(
            view.features()[mid * cfg.resized_len + mid],
            cfg.sigma_clip,
            epsilon = 1e-4
        );
        assert!(view.features().iter().all(|v| v.abs() <= cfg.sigma_clip));
    }

    #[test]
    fn test_detection_on_missing_slice_gives_blank_view() {
        let cfg = fpr2_config();
        let stack = SliceStack::zeros(32, 32, 1, 0.7);
        let scales = ScaleParams::identity(cfg.feature_len());
        let classifier = CountingClassifier::always(true);
        let views = ViewClassifier::new(&cfg, &stack, &classifier, &scales);

        let mut view = views.prepare(&Detection2D::new(9, 16.0, 16.0, 2.0)).unwrap();
        assert!(view.crop().iter().all(|&v| v == 0.0));
        assert!(views.classify(&mut view, 15.0).unwrap());
    }
}
