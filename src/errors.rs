use thiserror::Error;

use crate::io::{Candidate3D, LungSide, SidePair};

/// Failure kinds raised inside a stage worker.
#[derive(Debug, Error)]
pub enum FprError {
    #[error("could not reserve {requested} floats for {buffer}")]
    Memory {
        buffer: &'static str,
        requested: usize,
    },

    #[error("object length {length} is not covered by the {table} table")]
    Parameter { length: usize, table: &'static str },

    #[error("could not start {side} worker: {source}")]
    Thread {
        side: LungSide,
        #[source]
        source: std::io::Error,
    },

    #[error("classifier rejected input: {0}")]
    Classifier(String),

    #[error("result cache: {0}")]
    Cache(String),

    #[error("{side} worker panicked: {message}")]
    Panicked { side: LungSide, message: String },
}

impl FprError {
    pub(crate) fn memory(buffer: &'static str, requested: usize) -> Self {
        FprError::Memory { buffer, requested }
    }
}

/// A stage that did not finish cleanly.
///
/// `partial` holds whatever each side had already accepted when the first
/// failure was observed. Objects a worker already released are not restored.
#[derive(Debug, Error)]
#[error("{side} lung worker failed: {error}")]
pub struct StageFailure {
    pub side: LungSide,
    #[source]
    pub error: FprError,
    pub partial: SidePair<Vec<Candidate3D>>,
}
