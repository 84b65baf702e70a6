//! False-positive reduction for lung-nodule candidates.
//!
//! Per-slice 2D detections are linked into 3D objects, pruned on geometric
//! and gray-level bounds (stage 1), then classified by rotation-ensemble SVM
//! voting (stage 2). Each stage runs the two lung sides on separate threads
//! and can be short-circuited by a per-case result cache.

pub mod config;
pub mod entry;
pub mod errors;
pub mod imaging;
pub mod io;
pub mod processing;
pub mod svm;

#[cfg(test)]
mod utils;

pub use config::{CaseIdentity, PipelineConfig};
pub use entry::{run_cascade, run_case, run_fpr1, run_fpr2, CaseData};
pub use errors::{FprError, StageFailure};
pub use io::{Candidate3D, Detection2D, LungSide, SidePair, SliceStack};
