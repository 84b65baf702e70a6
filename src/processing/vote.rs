//! Hierarchical early-exit voting: rotations vote on a 2D view, views vote on
//! the 3D object.

use tracing::{debug, info};

use super::scheduler::WorkerOutcome;
use super::view::ViewClassifier;
use crate::config::{Fpr2Config, VoteTable};
use crate::errors::FprError;
use crate::io::{Candidate3D, Detection2D, LungSide, SliceStack};
use crate::svm::{Classifier, ScaleParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDecision {
    Undecided,
    Positive,
    Negative,
}

/// State of a vote after `pos + neg` of `total` ballots.
///
/// Positive once `pos` reaches `threshold`; negative as soon as the remaining
/// ballots can no longer get there (`neg > total - threshold`).
pub fn vote_decision(pos: usize, neg: usize, total: usize, threshold: usize) -> VoteDecision {
    if pos >= threshold {
        return VoteDecision::Positive;
    }
    if neg as i64 > total as i64 - threshold as i64 {
        return VoteDecision::Negative;
    }
    VoteDecision::Undecided
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub positive: bool,
    /// Ballots actually cast before the decision.
    pub votes_cast: usize,
}

/// Casts ballots `0..total` in order until [`vote_decision`] settles.
///
/// A vote that never settles (threshold above `total`) ends negative.
pub fn sequential_vote<F>(total: usize, threshold: usize, mut ballot: F) -> Result<VoteOutcome, FprError>
where
    F: FnMut(usize) -> Result<bool, FprError>,
{
    let (mut pos, mut neg) = (0, 0);
    for i in 0..total {
        if ballot(i)? {
            pos += 1;
        } else {
            neg += 1;
        }
        match vote_decision(pos, neg, total, threshold) {
            VoteDecision::Positive => {
                return Ok(VoteOutcome {
                    positive: true,
                    votes_cast: i + 1,
                })
            }
            VoteDecision::Negative => {
                return Ok(VoteOutcome {
                    positive: false,
                    votes_cast: i + 1,
                })
            }
            VoteDecision::Undecided => {}
        }
    }
    Ok(VoteOutcome {
        positive: vote_decision(pos, neg, total, threshold) == VoteDecision::Positive,
        votes_cast: total,
    })
}

pub struct VoteAggregator<'a, C> {
    votes: &'a VoteTable,
    views: ViewClassifier<'a, C>,
}

impl<'a, C: Classifier> VoteAggregator<'a, C> {
    pub fn new(votes: &'a VoteTable, views: ViewClassifier<'a, C>) -> Self {
        VoteAggregator { votes, views }
    }

    pub fn from_config(
        config: &'a Fpr2Config,
        stack: &'a SliceStack,
        classifier: &'a C,
        scales: &'a ScaleParams,
    ) -> Self {
        Self::new(
            &config.votes,
            ViewClassifier::new(config, stack, classifier, scales),
        )
    }

    /// Level A: rotations of one member of an object of `length` members.
    pub fn label_view(&self, det: &Detection2D, length: usize) -> Result<VoteOutcome, FprError> {
        let hitfor = self.votes.min_rot_pos(length)?;
        let total = self.views.num_rotations();
        let step = 360.0 / total as f32;
        let mut view = self.views.prepare(det)?;
        sequential_vote(total, hitfor, |i| {
            self.views.classify(&mut view, step * i as f32)
        })
    }

    /// Level B: members in slice order, each labelled through Level A.
    pub fn label_object(&self, cand: &Candidate3D) -> Result<VoteOutcome, FprError> {
        let length = cand.length();
        let min_views = self.votes.min_pos_views(length)?;
        sequential_vote(length, min_views, |i| {
            self.label_view(&cand.members[i], length).map(|o| o.positive)
        })
    }
}

/// Stage-2 routine for one side: keeps, in order, the objects voted positive.
///
/// An error stops the worker; objects already kept are returned with it.
pub fn classify_side<C: Classifier>(
    side: LungSide,
    candidates: Vec<Candidate3D>,
    config: &Fpr2Config,
    stack: &SliceStack,
    classifier: &C,
    scales: &ScaleParams,
) -> WorkerOutcome {
    debug!("fpr2 worker started for {} lung", side);
    let aggregator = VoteAggregator::from_config(config, stack, classifier, scales);
    let total = candidates.len();

    let mut survivors = Vec::new();
    for cand in candidates {
        match aggregator.label_object(&cand) {
            Ok(outcome) if outcome.positive => survivors.push(cand),
            Ok(outcome) => {
                debug!(
                    length = cand.length(),
                    views = outcome.votes_cast,
                    "{} lung: object voted negative, released",
                    side
                );
            }
            Err(e) => return WorkerOutcome::failed(survivors, e),
        }
    }

    info!(
        "{} lung: {} of {} objects kept after fpr2",
        side,
        survivors.len(),
        total
    );
    WorkerOutcome::completed(survivors)
}
