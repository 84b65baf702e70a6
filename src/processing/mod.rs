pub mod features;
pub mod linker;
pub mod pruner;
pub mod scheduler;
pub mod view;
pub mod vote;

pub use features::ObjectFeatures;
pub use linker::{build_candidates, RegionLinker};
pub use pruner::{prune_side, GeometricPruner, RejectReason, Verdict};
pub use scheduler::{DualLungScheduler, StageOutput, WorkerOutcome};
pub use view::{view_radii, PreparedView, ViewClassifier};
pub use vote::{classify_side, sequential_vote, vote_decision, VoteAggregator, VoteDecision, VoteOutcome};
