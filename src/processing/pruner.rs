//! Stage-1 accept/reject policy and the per-side stage-1 worker.

use std::convert::Infallible;
use tracing::{debug, info};

use super::features::{max_radius_mm, mean_gl, slant_angle, volume, ObjectFeatures};
use super::linker::{build_candidates, RegionLinker};
use super::scheduler::WorkerOutcome;
use crate::config::Fpr1Config;
use crate::errors::FprError;
use crate::io::{Candidate3D, Detection2D, LungSide, SliceStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SingleSlice,
    UnsupportedLength,
    Radius,
    GrayLevel,
    Angle,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

pub struct GeometricPruner<'a> {
    config: &'a Fpr1Config,
    stack: &'a SliceStack,
}

impl<'a> GeometricPruner<'a> {
    pub fn new(config: &'a Fpr1Config, stack: &'a SliceStack) -> Self {
        GeometricPruner { config, stack }
    }

    /// Decision on precomputed features.
    pub fn decide(&self, f: &ObjectFeatures) -> Verdict {
        let verdict = self.verdict(
            f.length,
            f.max_radius_mm,
            || Ok::<f32, Infallible>(f.mean_gl),
            || f.angle_deg,
            || f.volume,
        );
        match verdict {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Decision on a candidate. Gray levels are only read from the stack
    /// when the cheaper checks pass.
    pub fn evaluate(&self, cand: &Candidate3D) -> Result<Verdict, FprError> {
        let spacing = self.stack.pixel_spacing();
        self.verdict(
            cand.length(),
            max_radius_mm(cand, spacing),
            || mean_gl(cand, self.stack),
            || slant_angle(cand, self.config.angle_calibration),
            || volume(cand, spacing),
        )
    }

    fn verdict<E, G, A, V>(
        &self,
        length: usize,
        max_radius: f32,
        gray_level: G,
        angle: A,
        volume: V,
    ) -> Result<Verdict, E>
    where
        G: FnOnce() -> Result<f32, E>,
        A: FnOnce() -> f32,
        V: FnOnce() -> f32,
    {
        use RejectReason::*;
        let cfg = self.config;

        // pre-built regions carry no members: only the radius can be judged
        if length == 0 {
            if max_radius < cfg.min_max_radius || max_radius > cfg.max_max_radius {
                return Ok(Verdict::Reject(Radius));
            }
            return Ok(if cfg.only_radius {
                Verdict::Accept
            } else {
                Verdict::Reject(UnsupportedLength)
            });
        }
        if length == 1 {
            return Ok(Verdict::Reject(SingleSlice));
        }
        let Some(row) = cfg.thresholds.row(length) else {
            return Ok(Verdict::Reject(UnsupportedLength));
        };
        if max_radius < cfg.min_max_radius || max_radius > cfg.max_max_radius {
            return Ok(Verdict::Reject(Radius));
        }
        if cfg.only_radius {
            return Ok(Verdict::Accept);
        }
        let gl = gray_level()?;
        if gl < cfg.min_mean_gl || gl > cfg.max_mean_gl {
            return Ok(Verdict::Reject(GrayLevel));
        }
        if angle() > row.max_angle {
            return Ok(Verdict::Reject(Angle));
        }
        let vol = volume();
        if vol < row.volume_low || vol > row.volume_high {
            return Ok(Verdict::Reject(Volume));
        }
        Ok(Verdict::Accept)
    }
}

/// Stage-1 routine for one side: link detections into 3D candidates and keep
/// those the pruner accepts, in build order.
pub fn prune_side(
    side: LungSide,
    detections: Vec<Detection2D>,
    config: &Fpr1Config,
    stack: &SliceStack,
) -> WorkerOutcome {
    debug!("fpr1 worker started for {} lung", side);
    let linker = RegionLinker::from_config(config);
    let candidates = build_candidates(detections, &linker, config.max_obj_length, config.skip_build);
    let built = candidates.len();
    let pruner = GeometricPruner::new(config, stack);

    let mut survivors = Vec::new();
    for cand in candidates {
        match pruner.evaluate(&cand) {
            Ok(Verdict::Accept) => survivors.push(cand),
            Ok(Verdict::Reject(reason)) => {
                debug!(?reason, length = cand.length(), "{} lung: candidate released", side);
            }
            Err(e) => return WorkerOutcome::failed(survivors, e),
        }
    }

    info!(
        "{} lung: {} of {} 3D regions kept after fpr1",
        side,
        survivors.len(),
        built
    );
    WorkerOutcome::completed(survivors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{chain, fpr1_config, paint_disk};

    fn scenario_a() -> ObjectFeatures {
        ObjectFeatures {
            length: 3,
            max_radius_mm: 4.2,
            mean_gl: 120.0,
            volume: 55.0,
            angle_deg: 10.0,
        }
    }

    fn stack() -> SliceStack {
        SliceStack::zeros(8, 8, 1, 1.0)
    }

    #[test]
    fn test_scenario_a_is_accepted() {
        let cfg = fpr1_config();
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        assert_eq!(pruner.decide(&scenario_a()), Verdict::Accept);
    }

    #[test]
    fn test_scenario_b_steep_angle_is_rejected() {
        let cfg = fpr1_config();
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        let f = ObjectFeatures {
            angle_deg: 20.0,
            ..scenario_a()
        };
        assert_eq!(pruner.decide(&f), Verdict::Reject(RejectReason::Angle));

        // regardless of the other (in-range) values
        for (vol, radius, gl) in [(31.0, 3.1, 81.0), (89.0, 5.9, 199.0)] {
            let f = ObjectFeatures {
                volume: vol,
                max_radius_mm: radius,
                mean_gl: gl,
                ..f
            };
            assert_eq!(pruner.decide(&f), Verdict::Reject(RejectReason::Angle));
        }
    }

    #[test]
    fn test_single_slice_always_rejected() {
        let mut cfg = fpr1_config();
        cfg.only_radius = true;
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        let f = ObjectFeatures {
            length: 1,
            ..scenario_a()
        };
        assert_eq!(pruner.decide(&f), Verdict::Reject(RejectReason::SingleSlice));
    }

    #[test]
    fn test_lengths_without_row_always_rejected() {
        let mut cfg = fpr1_config();
        cfg.only_radius = true;
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        for length in [11, 12, 40] {
            let f = ObjectFeatures {
                length,
                ..scenario_a()
            };
            assert_eq!(
                pruner.decide(&f),
                Verdict::Reject(RejectReason::UnsupportedLength)
            );
        }
    }

    #[test]
    fn test_accept_iff_all_bounds_hold_for_supported_lengths() {
        let cfg = fpr1_config();
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        for length in 2..=10 {
            for radius in [2.9, 3.0, 4.5, 6.0, 6.1] {
                for gl in [79.0, 80.0, 150.0, 200.0, 201.0] {
                    for angle in [0.0, 15.0, 15.5] {
                        for vol in [29.0, 30.0, 60.0, 90.0, 91.0] {
                            let f = ObjectFeatures {
                                length,
                                max_radius_mm: radius,
                                mean_gl: gl,
                                volume: vol,
                                angle_deg: angle,
                            };
                            let expected = (3.0..=6.0).contains(&radius)
                                && (80.0..=200.0).contains(&gl)
                                && angle <= 15.0
                                && (30.0..=90.0).contains(&vol);
                            assert_eq!(pruner.decide(&f).is_accept(), expected, "{:?}", f);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_memberless_region_is_judged_on_radius_only() {
        let mut cfg = fpr1_config();
        let stack = stack();
        let region = ObjectFeatures {
            length: 0,
            ..scenario_a()
        };

        let pruner = GeometricPruner::new(&cfg, &stack);
        assert_eq!(
            pruner.decide(&region),
            Verdict::Reject(RejectReason::UnsupportedLength)
        );

        cfg.only_radius = true;
        let pruner = GeometricPruner::new(&cfg, &stack);
        assert_eq!(pruner.decide(&region), Verdict::Accept);
        let wide = ObjectFeatures {
            max_radius_mm: 7.0,
            ..region
        };
        assert_eq!(pruner.decide(&wide), Verdict::Reject(RejectReason::Radius));
    }

    #[test]
    fn test_prune_side_skip_build_keeps_regions_in_radius_bounds() {
        let mut cfg = fpr1_config();
        cfg.skip_build = true;
        cfg.only_radius = true;
        let stack = SliceStack::zeros(32, 32, 3, 1.0);
        let dets = vec![
            Detection2D::new(0, 10.0, 10.0, 4.0),
            Detection2D::new(1, 10.0, 10.0, 4.0),
            // 8 mm, above the 6 mm bound
            Detection2D::new(2, 20.0, 20.0, 8.0),
        ];

        let outcome = prune_side(LungSide::Right, dets.clone(), &cfg, &stack);
        assert!(outcome.status.is_ok());
        assert_eq!(outcome.survivors.len(), 2);
        assert!(outcome.survivors.iter().all(|c| c.members.is_empty()));
        assert_eq!(outcome.survivors[1].region.slice, 1);

        // without only-radius mode nothing else can be checked
        cfg.only_radius = false;
        let outcome = prune_side(LungSide::Right, dets, &cfg, &stack);
        assert!(outcome.survivors.is_empty());
    }

    #[test]
    fn test_only_radius_mode_skips_remaining_checks() {
        let mut cfg = fpr1_config();
        cfg.only_radius = true;
        let stack = stack();
        let pruner = GeometricPruner::new(&cfg, &stack);
        let f = ObjectFeatures {
            mean_gl: 0.0,
            angle_deg: 80.0,
            volume: 1000.0,
            ..scenario_a()
        };
        assert_eq!(pruner.decide(&f), Verdict::Accept);

        let f = ObjectFeatures {
            max_radius_mm: 9.0,
            ..f
        };
        assert_eq!(pruner.decide(&f), Verdict::Reject(RejectReason::Radius));
    }

    #[test]
    fn test_evaluate_reads_pixels_for_gray_level() {
        let cfg = fpr1_config();
        // spacing 1.0, radii 3.5/4/3.5 -> max 4.0 mm, volume 40.5
        let mut stack = SliceStack::zeros(64, 64, 3, 1.0);
        for z in 0..3 {
            paint_disk(&mut stack, z, 30.0, 30.0, 4.0, 120);
        }
        let cand = chain(0, 30.0, 30.0, &[3.5, 4.0, 3.5]);
        let pruner = GeometricPruner::new(&cfg, &stack);
        assert_eq!(pruner.evaluate(&cand).unwrap(), Verdict::Accept);

        let dark = SliceStack::zeros(64, 64, 3, 1.0);
        let pruner = GeometricPruner::new(&cfg, &dark);
        assert_eq!(
            pruner.evaluate(&cand).unwrap(),
            Verdict::Reject(RejectReason::GrayLevel)
        );
    }

    #[test]
    fn test_prune_side_keeps_build_order() {
        let cfg = fpr1_config();
        let mut stack = SliceStack::zeros(96, 96, 6, 1.0);
        for z in 0..3 {
            paint_disk(&mut stack, z, 20.0, 20.0, 4.0, 120);
            paint_disk(&mut stack, z + 3, 70.0, 70.0, 4.0, 150);
        }
        let mut dets = Vec::new();
        for z in 0..3 {
            dets.push(Detection2D::new(z, 20.0, 20.0, 4.0));
            dets.push(Detection2D::new(z + 3, 70.0, 70.0, 4.0));
        }
        // a lone detection that can only form a singleton
        dets.push(Detection2D::new(1, 80.0, 10.0, 4.0));

        let outcome = prune_side(LungSide::Right, dets, &cfg, &stack);
        assert!(outcome.status.is_ok());
        assert_eq!(outcome.survivors.len(), 2);
        assert_eq!(outcome.survivors[0].members[0].slice, 0);
        assert_eq!(outcome.survivors[1].members[0].slice, 3);
    }
}
