use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use crate::config::{CaseIdentity, Fpr1Config, Fpr2Config, PipelineConfig};
use crate::errors::StageFailure;
use crate::io::{Candidate3D, Detection2D, DiskCache, ResultCache, SidePair, SliceStack, Stage};
use crate::processing::{classify_side, prune_side, DualLungScheduler, StageOutput};
use crate::svm::{Classifier, ScaleParams};

/// One CT series: who it belongs to and its raw slices.
#[derive(Debug, Clone)]
pub struct CaseData {
    pub identity: CaseIdentity,
    pub stack: SliceStack,
}

/// Stage 1: link each side's detections into 3D objects and prune them.
pub fn run_fpr1(
    case: &CaseData,
    config: &Fpr1Config,
    detections: SidePair<Vec<Detection2D>>,
    cache: &dyn ResultCache,
) -> Result<StageOutput, StageFailure> {
    info!(
        "fpr1 for {}: {} right / {} left detections",
        case.identity.patient_id,
        detections.right.len(),
        detections.left.len()
    );
    DualLungScheduler::new(&case.identity, Stage::Fpr1, cache).run(detections, |side, dets| {
        prune_side(side, dets, config, &case.stack)
    })
}

/// Stage 2: rotation-ensemble voting over the stage-1 survivors.
pub fn run_fpr2<C: Classifier>(
    case: &CaseData,
    config: &Fpr2Config,
    classifier: &C,
    scales: &ScaleParams,
    candidates: SidePair<Vec<Candidate3D>>,
    cache: &dyn ResultCache,
) -> Result<StageOutput, StageFailure> {
    info!(
        "fpr2 for {}: {} right / {} left objects",
        case.identity.patient_id,
        candidates.right.len(),
        candidates.left.len()
    );
    DualLungScheduler::new(&case.identity, Stage::Fpr2, cache).run(candidates, |side, cands| {
        classify_side(side, cands, config, &case.stack, classifier, scales)
    })
}

/// Both stages back to back, sharing one cache.
pub fn run_cascade<C: Classifier>(
    case: &CaseData,
    config: &PipelineConfig,
    classifier: &C,
    scales: &ScaleParams,
    detections: SidePair<Vec<Detection2D>>,
    cache: &dyn ResultCache,
) -> Result<SidePair<Vec<Candidate3D>>, StageFailure> {
    let stage1 = run_fpr1(case, &config.fpr1, detections, cache)?;
    let stage2 = run_fpr2(
        case,
        &config.fpr2,
        classifier,
        scales,
        stage1.survivors,
        cache,
    )?;
    info!(
        "{} final candidates: {} right, {} left",
        case.identity.patient_id,
        stage2.survivors.right.len(),
        stage2.survivors.left.len()
    );
    Ok(stage2.survivors)
}

/// Loads the classifier named in `config` and runs the cascade with results
/// cached under `config.results_dir`.
pub fn run_case(
    config: &PipelineConfig,
    case: &CaseData,
    detections: SidePair<Vec<Detection2D>>,
) -> Result<SidePair<Vec<Candidate3D>>> {
    let (model, scales) = config
        .fpr2
        .load_classifier()
        .context("loading fpr2 classifier failed")?;
    fs::create_dir_all(&config.results_dir).with_context(|| {
        format!("could not create results directory {:?}", config.results_dir)
    })?;
    let cache = DiskCache::new(&config.results_dir);

    run_cascade(case, config, &model, &scales, detections, &cache)
        .with_context(|| format!("cascade for {} failed", case.identity.patient_id))
}
