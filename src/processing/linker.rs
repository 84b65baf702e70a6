use tracing::debug;

use crate::config::Fpr1Config;
use crate::io::{Candidate3D, Detection2D};

/// Adjacency rule between two 2D detections on nearby slices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionLinker {
    /// Maximum in-plane centroid distance, pixels.
    pub delta_tol: f32,
    /// Maximum distance along z.
    pub max_scan_dist: f32,
}

impl RegionLinker {
    pub fn new(delta_tol: f32, max_scan_dist: f32) -> Self {
        RegionLinker {
            delta_tol,
            max_scan_dist,
        }
    }

    pub fn from_config(config: &Fpr1Config) -> Self {
        Self::new(config.delta_tol, config.max_scan_dist)
    }

    /// Symmetric: `adjacent(a, b) == adjacent(b, a)`.
    pub fn adjacent(&self, a: &Detection2D, b: &Detection2D) -> bool {
        if (a.z - b.z).abs() > self.max_scan_dist {
            return false;
        }
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        dx * dx + dy * dy <= self.delta_tol * self.delta_tol
    }
}

/// Groups detections into 3D candidates by chaining adjacent detections
/// slice after slice.
///
/// Detections are visited in slice order. Each one extends the first open
/// chain whose tail sits on an earlier slice and is adjacent to it; otherwise
/// it starts a new chain. A chain stops growing at `max_obj_length` members.
/// With `skip_build`, each detection is taken as an already-built region.
pub fn build_candidates(
    mut detections: Vec<Detection2D>,
    linker: &RegionLinker,
    max_obj_length: usize,
    skip_build: bool,
) -> Vec<Candidate3D> {
    if skip_build {
        return detections.into_iter().map(Candidate3D::from_region).collect();
    }

    detections.sort_by(|a, b| {
        a.slice
            .cmp(&b.slice)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });

    let mut chains: Vec<Candidate3D> = Vec::new();
    for det in detections {
        let open = chains.iter_mut().find(|c| {
            c.length() < max_obj_length
                && c
                    .members
                    .last()
                    .is_some_and(|tail| tail.slice < det.slice && linker.adjacent(tail, &det))
        });
        match open {
            Some(chain) => chain.push_member(det),
            None => chains.push(Candidate3D::single(det)),
        }
    }

    debug!("built {} 3D candidates", chains.len());
    chains
}
