//! SVM predictor seam and the kernel model used in production.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::errors::FprError;

/// Binary classifier over a flat feature vector. `true` means nodule.
pub trait Classifier: Sync {
    fn predict(&self, features: &[f32]) -> Result<bool, FprError>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn predict(&self, features: &[f32]) -> Result<bool, FprError> {
        (**self).predict(features)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f32 },
}

impl Kernel {
    fn eval(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Kernel::Linear => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Kernel::Rbf { gamma } => {
                let d2: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * d2).exp()
            }
        }
    }
}

/// Two-class kernel SVM: `sign(Σ coef_i · K(sv_i, x) − rho)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SvmModel {
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f32>>,
    pub coefficients: Vec<f32>,
    pub rho: f32,
}

impl SvmModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .with_context(|| format!("failed to open model file {:?}", path.as_ref()))?;
        let model: SvmModel = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse model file {:?}", path.as_ref()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let dim = self
            .support_vectors
            .first()
            .map(|sv| sv.len())
            .ok_or_else(|| anyhow!("model has no support vectors"))?;
        if self.support_vectors.iter().any(|sv| sv.len() != dim) {
            return Err(anyhow!("support vectors have inconsistent dimensions"));
        }
        if self.coefficients.len() != self.support_vectors.len() {
            return Err(anyhow!(
                "{} coefficients for {} support vectors",
                self.coefficients.len(),
                self.support_vectors.len()
            ));
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.support_vectors.first().map_or(0, |sv| sv.len())
    }

    pub fn decision_value(&self, x: &[f32]) -> f32 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, c)| c * self.kernel.eval(sv, x))
            .sum::<f32>()
            - self.rho
    }
}

impl Classifier for SvmModel {
    fn predict(&self, features: &[f32]) -> Result<bool, FprError> {
        if features.len() != self.dimension() {
            return Err(FprError::Classifier(format!(
                "expected {} features, got {}",
                self.dimension(),
                features.len()
            )));
        }
        Ok(self.decision_value(features) > 0.0)
    }
}

/// Per-feature whitening statistics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScaleParams {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ScaleParams {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .with_context(|| format!("failed to open scales file {:?}", path.as_ref()))?;
        let scales: ScaleParams = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse scales file {:?}", path.as_ref()))?;
        if scales.mean.len() != scales.std.len() {
            return Err(anyhow!(
                "scales file has {} means but {} deviations",
                scales.mean.len(),
                scales.std.len()
            ));
        }
        Ok(scales)
    }

    pub fn identity(len: usize) -> Self {
        ScaleParams {
            mean: vec![0.0; len],
            std: vec![1.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}
