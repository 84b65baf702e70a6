use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{
    CaseIdentity, Fpr1Config, Fpr2Config, ThresholdRow, ThresholdTable, VoteRow, VoteTable,
    UI16_TO_UI8,
};
use crate::errors::FprError;
use crate::io::{Candidate3D, Detection2D, SliceStack};
use crate::svm::Classifier;

pub fn case_identity() -> CaseIdentity {
    CaseIdentity {
        patient_id: "P001".to_string(),
        study_uid: "1.2.3".to_string(),
        series_uid: "4.5.6".to_string(),
    }
}

/// Candidate with one member per radius on consecutive slices, all at `(x, y)`.
pub fn chain(start_slice: usize, x: f32, y: f32, radii: &[f32]) -> Candidate3D {
    let members = radii
        .iter()
        .enumerate()
        .map(|(i, &r)| Detection2D::new(start_slice + i, x, y, r))
        .collect();
    Candidate3D::from_members(members).unwrap()
}

/// Fills a disk of `value` pixels on one slice of the stack.
pub fn paint_disk(stack: &mut SliceStack, slice: usize, cx: f32, cy: f32, radius: f32, value: u16) {
    let width = stack.width();
    let height = stack.height();
    let plane = stack.slice_mut(slice).unwrap();
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= radius * radius {
                plane[y * width + x] = value;
            }
        }
    }
}

/// Every length 2..=10: max angle 15°, volume within [30, 90].
pub fn threshold_table() -> ThresholdTable {
    let rows = (2..=10)
        .map(|length| ThresholdRow {
            length,
            max_angle: 15.0,
            volume_low: 30.0,
            volume_high: 90.0,
        })
        .collect();
    ThresholdTable::new(rows).unwrap()
}

/// Same thresholds for every length 2..=15.
pub fn vote_table(min_rot_pos: usize, min_pos_views: usize) -> VoteTable {
    let rows = (2..=15)
        .map(|length| VoteRow {
            length,
            min_rot_pos,
            min_pos_views,
        })
        .collect();
    VoteTable::new(rows).unwrap()
}

pub fn fpr1_config() -> Fpr1Config {
    Fpr1Config {
        delta_tol: 3.0,
        max_scan_dist: 1.0,
        max_obj_length: 10,
        only_radius: false,
        skip_build: false,
        min_max_radius: 3.0,
        max_max_radius: 6.0,
        min_mean_gl: 80.0,
        max_mean_gl: 200.0,
        angle_calibration: 90.0,
        thresholds: threshold_table(),
    }
}

pub fn fpr2_config() -> Fpr2Config {
    Fpr2Config {
        model_file: PathBuf::from("model.json"),
        scale_file: PathBuf::from("scales.json"),
        num_rotations: 24,
        resized_len: 19,
        sigma_clip: 3.0,
        intensity_scale: UI16_TO_UI8,
        votes: vote_table(5, 2),
    }
}

/// Returns a fixed label and counts how often it was asked.
#[derive(Debug, Default)]
pub struct CountingClassifier {
    label: bool,
    calls: AtomicUsize,
}

impl CountingClassifier {
    pub fn always(label: bool) -> Self {
        CountingClassifier {
            label,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for CountingClassifier {
    fn predict(&self, _features: &[f32]) -> Result<bool, FprError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.label)
    }
}

/// Positive when any feature exceeds `threshold`; counts calls.
#[derive(Debug, Default)]
pub struct BrightSpotClassifier {
    threshold: f32,
    calls: AtomicUsize,
}

impl BrightSpotClassifier {
    pub fn new(threshold: f32) -> Self {
        BrightSpotClassifier {
            threshold,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for BrightSpotClassifier {
    fn predict(&self, features: &[f32]) -> Result<bool, FprError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(features.iter().any(|&v| v > self.threshold))
    }
}
