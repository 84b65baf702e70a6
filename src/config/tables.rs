//! Length-indexed decision tables.
//!
//! Each table holds exactly one row per supported object length. Looking up
//! a length outside the table is reported explicitly rather than folded into
//! a default rejection.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::ops::RangeInclusive;

use crate::errors::FprError;

pub const THRESHOLD_LENGTHS: RangeInclusive<usize> = 2..=10;
pub const VOTE_LENGTHS: RangeInclusive<usize> = 2..=15;

pub trait LengthKeyed {
    fn length(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LengthTable<R> {
    lengths: RangeInclusive<usize>,
    rows: Vec<R>,
}

impl<R: LengthKeyed> LengthTable<R> {
    /// Requires one row for every length in `lengths`, in any order.
    pub fn from_rows(mut rows: Vec<R>, lengths: RangeInclusive<usize>, name: &str) -> Result<Self> {
        rows.sort_by_key(|r| r.length());
        for (expected, row) in lengths.clone().zip(rows.iter()) {
            if row.length() != expected {
                return Err(anyhow!(
                    "{} table: expected a row for length {}, found length {}",
                    name,
                    expected,
                    row.length()
                ));
            }
        }
        let wanted = lengths.end() + 1 - lengths.start();
        if rows.len() != wanted {
            return Err(anyhow!(
                "{} table: expected {} rows for lengths {}..={}, got {}",
                name,
                wanted,
                lengths.start(),
                lengths.end(),
                rows.len()
            ));
        }
        Ok(LengthTable { lengths, rows })
    }

    pub fn get(&self, length: usize) -> Option<&R> {
        if self.lengths.contains(&length) {
            self.rows.get(length - self.lengths.start())
        } else {
            None
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }
}

/// Stage-1 acceptance bounds for one object length.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdRow {
    pub length: usize,
    /// Maximum slant angle in degrees.
    pub max_angle: f32,
    pub volume_low: f32,
    pub volume_high: f32,
}

impl LengthKeyed for ThresholdRow {
    fn length(&self) -> usize {
        self.length
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<ThresholdRow>")]
pub struct ThresholdTable(LengthTable<ThresholdRow>);

impl ThresholdTable {
    pub fn new(rows: Vec<ThresholdRow>) -> Result<Self> {
        for row in &rows {
            if row.volume_low > row.volume_high {
                return Err(anyhow!(
                    "threshold table: length {} has volume_low {} above volume_high {}",
                    row.length,
                    row.volume_low,
                    row.volume_high
                ));
            }
        }
        LengthTable::from_rows(rows, THRESHOLD_LENGTHS, "threshold").map(ThresholdTable)
    }

    /// `None` for lengths without a row; such objects are always rejected.
    pub fn row(&self, length: usize) -> Option<&ThresholdRow> {
        self.0.get(length)
    }

    pub fn rows(&self) -> &[ThresholdRow] {
        self.0.rows()
    }
}

impl TryFrom<Vec<ThresholdRow>> for ThresholdTable {
    type Error = anyhow::Error;

    fn try_from(rows: Vec<ThresholdRow>) -> Result<Self> {
        ThresholdTable::new(rows)
    }
}

/// Stage-2 voting thresholds for one object length.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VoteRow {
    pub length: usize,
    /// Positive rotations needed to call a 2D view positive.
    pub min_rot_pos: usize,
    /// Positive 2D views needed to call the 3D object positive.
    pub min_pos_views: usize,
}

impl LengthKeyed for VoteRow {
    fn length(&self) -> usize {
        self.length
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<VoteRow>")]
pub struct VoteTable(LengthTable<VoteRow>);

impl VoteTable {
    pub fn new(rows: Vec<VoteRow>) -> Result<Self> {
        LengthTable::from_rows(rows, VOTE_LENGTHS, "vote").map(VoteTable)
    }

    pub fn min_rot_pos(&self, length: usize) -> Result<usize, FprError> {
        self.0
            .get(length)
            .map(|r| r.min_rot_pos)
            .ok_or(FprError::Parameter {
                length,
                table: "min_rot_pos",
            })
    }

    pub fn min_pos_views(&self, length: usize) -> Result<usize, FprError> {
        self.0
            .get(length)
            .map(|r| r.min_pos_views)
            .ok_or(FprError::Parameter {
                length,
                table: "min_pos_views",
            })
    }

    pub fn rows(&self) -> &[VoteRow] {
        self.0.rows()
    }
}

impl TryFrom<Vec<VoteRow>> for VoteTable {
    type Error = anyhow::Error;

    fn try_from(rows: Vec<VoteRow>) -> Result<Self> {
        VoteTable::new(rows)
    }
}
