pub mod tables;

pub use tables::{ThresholdRow, ThresholdTable, VoteRow, VoteTable};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::svm::{ScaleParams, SvmModel};

/// Maps the 16-bit CT range onto the 8-bit range the classifier was trained on.
pub const UI16_TO_UI8: f32 = 0.003_891_050_6;

/// Identifies the CT series a set of results belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct CaseIdentity {
    pub patient_id: String,
    pub study_uid: String,
    pub series_uid: String,
}

/// Everything the cascade needs, resolved once before any worker starts.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    pub fpr1: Fpr1Config,
    pub fpr2: Fpr2Config,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fpr1Config {
    /// Maximum in-plane centroid distance, pixels.
    pub delta_tol: f32,
    /// Maximum distance along z, slices.
    pub max_scan_dist: f32,
    pub max_obj_length: usize,
    #[serde(default)]
    pub only_radius: bool,
    #[serde(default)]
    pub skip_build: bool,
    pub min_max_radius: f32,
    pub max_max_radius: f32,
    pub min_mean_gl: f32,
    pub max_mean_gl: f32,
    /// Scale applied to `2·atan(d/L)/π` to obtain the slant angle.
    #[serde(default = "default_angle_calibration")]
    pub angle_calibration: f32,
    pub thresholds: ThresholdTable,
}

fn default_angle_calibration() -> f32 {
    90.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fpr2Config {
    pub model_file: PathBuf,
    pub scale_file: PathBuf,
    #[serde(default = "default_num_rotations")]
    pub num_rotations: usize,
    #[serde(default = "default_resized_len")]
    pub resized_len: usize,
    #[serde(default = "default_sigma_clip")]
    pub sigma_clip: f32,
    #[serde(default = "default_intensity_scale")]
    pub intensity_scale: f32,
    pub votes: VoteTable,
}

fn default_num_rotations() -> usize {
    24
}

fn default_resized_len() -> usize {
    19
}

fn default_sigma_clip() -> f32 {
    3.0
}

fn default_intensity_scale() -> f32 {
    UI16_TO_UI8
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.fpr1.validate().context("invalid [fpr1] section")?;
        config.fpr2.validate().context("invalid [fpr2] section")?;
        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        info!(
            delta_tol = self.fpr1.delta_tol,
            max_scan_dist = self.fpr1.max_scan_dist,
            max_obj_length = self.fpr1.max_obj_length,
            only_radius = self.fpr1.only_radius,
            "FPR1 3D object building parameters"
        );
        for row in self.fpr1.thresholds.rows() {
            info!(
                length = row.length,
                max_angle = row.max_angle,
                volume_low = row.volume_low,
                volume_high = row.volume_high,
                "FPR1 cutting thresholds"
            );
        }
        info!(
            model = ?self.fpr2.model_file,
            scales = ?self.fpr2.scale_file,
            num_rotations = self.fpr2.num_rotations,
            resized_len = self.fpr2.resized_len,
            "FPR2 parameters"
        );
    }
}

impl Fpr1Config {
    pub fn validate(&self) -> Result<()> {
        if self.delta_tol < 0.0 || self.max_scan_dist < 0.0 {
            bail!("distance tolerances must be non-negative");
        }
        if self.max_obj_length == 0 {
            bail!("max_obj_length must be at least 1");
        }
        if self.min_max_radius > self.max_max_radius {
            bail!(
                "radius bounds inverted: {} > {}",
                self.min_max_radius,
                self.max_max_radius
            );
        }
        if self.min_mean_gl > self.max_mean_gl {
            bail!(
                "gray level bounds inverted: {} > {}",
                self.min_mean_gl,
                self.max_mean_gl
            );
        }
        Ok(())
    }
}

impl Fpr2Config {
    pub fn validate(&self) -> Result<()> {
        if self.num_rotations == 0 {
            bail!("num_rotations must be at least 1");
        }
        if self.resized_len == 0 {
            bail!("resized_len must be at least 1");
        }
        if self.sigma_clip <= 0.0 {
            bail!("sigma_clip must be positive");
        }
        Ok(())
    }

    /// Number of features the classifier sees per view.
    pub fn feature_len(&self) -> usize {
        self.resized_len * self.resized_len
    }

    /// Loads the SVM model and whitening parameters named in the config.
    pub fn load_classifier(&self) -> Result<(SvmModel, ScaleParams)> {
        let scales = ScaleParams::load(&self.scale_file)
            .with_context(|| format!("Could not load scales file: {:?}", self.scale_file))?;
        if scales.len() != self.feature_len() {
            bail!(
                "scales file {:?} has {} features, resized crops have {}",
                self.scale_file,
                scales.len(),
                self.feature_len()
            );
        }
        let model = SvmModel::load(&self.model_file)
            .with_context(|| format!("Could not load model file: {:?}", self.model_file))?;
        if model.dimension() != self.feature_len() {
            bail!(
                "model file {:?} expects {} features, resized crops have {}",
                self.model_file,
                model.dimension(),
                self.feature_len()
            );
        }
        Ok((model, scales))
    }
}
