//! Runs one stage over both lung sides in parallel, with an all-or-nothing
//! result cache in front of it.

use crossbeam::thread;
use std::any::Any;
use tracing::{error, info, warn};

use crate::config::CaseIdentity;
use crate::errors::{FprError, StageFailure};
use crate::io::{CacheKey, Candidate3D, LungSide, ResultCache, SidePair, Stage};

/// What a worker hands back when it ends, cleanly or not.
///
/// On failure `survivors` holds the objects accepted before the failure.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub survivors: Vec<Candidate3D>,
    pub status: Result<(), FprError>,
}

impl WorkerOutcome {
    pub fn completed(survivors: Vec<Candidate3D>) -> Self {
        WorkerOutcome {
            survivors,
            status: Ok(()),
        }
    }

    pub fn failed(survivors: Vec<Candidate3D>, error: FprError) -> Self {
        WorkerOutcome {
            survivors,
            status: Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub survivors: SidePair<Vec<Candidate3D>>,
    pub from_cache: bool,
}

pub struct DualLungScheduler<'a> {
    identity: &'a CaseIdentity,
    stage: Stage,
    cache: &'a dyn ResultCache,
}

impl<'a> DualLungScheduler<'a> {
    pub fn new(identity: &'a CaseIdentity, stage: Stage, cache: &'a dyn ResultCache) -> Self {
        DualLungScheduler {
            identity,
            stage,
            cache,
        }
    }

    fn key(&self, side: LungSide) -> CacheKey {
        CacheKey::new(self.identity, self.stage, side)
    }

    /// Runs `worker` once per side, or returns the cached results when both
    /// sides are available.
    ///
    /// Each worker owns its side's input. Both started workers are always
    /// joined before the first failure (right side first) is reported.
    pub fn run<I, W>(
        &self,
        input: SidePair<Vec<I>>,
        worker: W,
    ) -> Result<StageOutput, StageFailure>
    where
        I: Send,
        W: Fn(LungSide, Vec<I>) -> WorkerOutcome + Sync,
    {
        if let Some(survivors) = self.load_both() {
            return Ok(StageOutput {
                survivors,
                from_cache: true,
            });
        }

        let outcomes = self.fork_join(input, &worker)?;

        let mut first_failure = None;
        let mut survivors = SidePair::<Vec<Candidate3D>>::default();
        for (side, outcome) in [
            (LungSide::Right, outcomes.right),
            (LungSide::Left, outcomes.left),
        ] {
            if let Err(e) = outcome.status {
                error!("fpr{} {} lung worker aborted: {}", self.stage.number(), side, e);
                first_failure.get_or_insert((side, e));
            }
            match side {
                LungSide::Right => survivors.right = outcome.survivors,
                LungSide::Left => survivors.left = outcome.survivors,
            }
        }

        if let Some((side, error)) = first_failure {
            return Err(StageFailure {
                side,
                error,
                partial: survivors,
            });
        }

        self.save_both(&survivors);
        Ok(StageOutput {
            survivors,
            from_cache: false,
        })
    }

    fn load_both(&self) -> Option<SidePair<Vec<Candidate3D>>> {
        let stage = self.stage.number();
        let load = |side: LungSide| {
            let key = self.key(side);
            info!("trying to load fpr{} {} results from cache", stage, side);
            match self.cache.load(&key) {
                Ok(Some(list)) => Some(list),
                Ok(None) => {
                    info!("no cached fpr{} {} results", stage, side);
                    None
                }
                Err(e) => {
                    info!("cached fpr{} {} results unusable: {}", stage, side, e);
                    None
                }
            }
        };
        // both sides are always looked up, even after a miss
        let right = load(LungSide::Right);
        let left = load(LungSide::Left);
        match (right, left) {
            (Some(right), Some(left)) => {
                info!(
                    "fpr{} results loaded from cache ({} right, {} left)",
                    stage,
                    right.len(),
                    left.len()
                );
                Some(SidePair::new(right, left))
            }
            (None, None) => None,
            _ => {
                info!("partial fpr{} cache hit discarded, recomputing both sides", stage);
                None
            }
        }
    }

    fn save_both(&self, survivors: &SidePair<Vec<Candidate3D>>) {
        for side in LungSide::BOTH {
            if let Err(e) = self.cache.save(&self.key(side), survivors.get(side)) {
                warn!(
                    "could not save fpr{} {} results: {}",
                    self.stage.number(),
                    side,
                    e
                );
            }
        }
    }

    fn fork_join<I, W>(
        &self,
        input: SidePair<Vec<I>>,
        worker: &W,
    ) -> Result<SidePair<WorkerOutcome>, StageFailure>
    where
        I: Send,
        W: Fn(LungSide, Vec<I>) -> WorkerOutcome + Sync,
    {
        let stage = self.stage.number();
        let SidePair { right, left } = input;

        let scoped = thread::scope(|s| -> Result<SidePair<WorkerOutcome>, StageFailure> {
            let right_handle = s
                .builder()
                .name(format!("fpr{}-right", stage))
                .spawn(move |_| worker(LungSide::Right, right))
                .map_err(|source| StageFailure {
                    side: LungSide::Right,
                    error: FprError::Thread {
                        side: LungSide::Right,
                        source,
                    },
                    partial: SidePair::default(),
                })?;

            let left_handle = match s
                .builder()
                .name(format!("fpr{}-left", stage))
                .spawn(move |_| worker(LungSide::Left, left))
            {
                Ok(handle) => handle,
                Err(source) => {
                    let right = collect(LungSide::Right, right_handle.join());
                    return Err(StageFailure {
                        side: LungSide::Left,
                        error: FprError::Thread {
                            side: LungSide::Left,
                            source,
                        },
                        partial: SidePair::new(right.survivors, Vec::new()),
                    });
                }
            };

            let right = collect(LungSide::Right, right_handle.join());
            let left = collect(LungSide::Left, left_handle.join());
            Ok(SidePair::new(right, left))
        });

        match scoped {
            Ok(result) => result,
            // handles are joined inside the scope; only reached if that changes
            Err(payload) => Err(StageFailure {
                side: LungSide::Right,
                error: FprError::Panicked {
                    side: LungSide::Right,
                    message: panic_message(payload.as_ref()),
                },
                partial: SidePair::default(),
            }),
        }
    }
}

fn collect(side: LungSide, joined: std::thread::Result<WorkerOutcome>) -> WorkerOutcome {
    joined.unwrap_or_else(|payload| {
        WorkerOutcome::failed(
            Vec::new(),
            FprError::Panicked {
                side,
                message: panic_message(payload.as_ref()),
            },
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
