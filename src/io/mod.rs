pub mod cache;
pub mod input;

pub use cache::{CacheKey, DiskCache, MemoryCache, NoCache, ResultCache, Stage};
pub use input::{read_detections, Candidate3D, Detection2D, SliceStack};

use std::fmt;

/// Anatomical side. The two sides are processed as fully independent sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LungSide {
    Right,
    Left,
}

impl LungSide {
    pub const BOTH: [LungSide; 2] = [LungSide::Right, LungSide::Left];

    /// Single-letter tag used in result file names.
    pub fn tag(&self) -> char {
        match self {
            LungSide::Right => 'r',
            LungSide::Left => 'l',
        }
    }
}

impl fmt::Display for LungSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LungSide::Right => "right",
                LungSide::Left => "left",
            }
        )
    }
}

/// One value per lung side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidePair<T> {
    pub right: T,
    pub left: T,
}

impl<T> SidePair<T> {
    pub fn new(right: T, left: T) -> Self {
        SidePair { right, left }
    }

    pub fn get(&self, side: LungSide) -> &T {
        match side {
            LungSide::Right => &self.right,
            LungSide::Left => &self.left,
        }
    }
}
