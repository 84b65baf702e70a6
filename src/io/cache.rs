//! Persistence of per-side stage results, keyed by case identity.
//!
//! The stage runners consult a [`ResultCache`] before computing and store
//! fresh results afterwards. [`DiskCache`] writes one CSV file per side and
//! stage under the results directory; [`MemoryCache`] keeps everything in
//! process and counts its calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::input::{Candidate3D, Detection2D};
use super::LungSide;
use crate::config::CaseIdentity;
use crate::errors::FprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 3D building and geometric pruning.
    Fpr1,
    /// Rotation-ensemble classification.
    Fpr2,
}

impl Stage {
    pub fn number(&self) -> u8 {
        match self {
            Stage::Fpr1 => 1,
            Stage::Fpr2 => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: CaseIdentity,
    pub stage: Stage,
    pub side: LungSide,
}

impl CacheKey {
    pub fn new(identity: &CaseIdentity, stage: Stage, side: LungSide) -> Self {
        CacheKey {
            identity: identity.clone(),
            stage,
            side,
        }
    }

    /// `<patient>_<study>_<series>_fpr<stage>_<side>.txt`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_fpr{}_{}.txt",
            self.identity.patient_id,
            self.identity.study_uid,
            self.identity.series_uid,
            self.stage.number(),
            self.side.tag()
        )
    }
}

pub trait ResultCache {
    /// `Ok(None)` means nothing was stored for `key`.
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Candidate3D>>, FprError>;

    fn save(&self, key: &CacheKey, candidates: &[Candidate3D]) -> Result<(), FprError>;
}

/// Never hits, silently drops writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResultCache for NoCache {
    fn load(&self, _key: &CacheKey) -> Result<Option<Vec<Candidate3D>>, FprError> {
        Ok(None)
    }

    fn save(&self, _key: &CacheKey, _candidates: &[Candidate3D]) -> Result<(), FprError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowKind {
    Region,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRow {
    object: usize,
    kind: RowKind,
    slice: usize,
    x: f32,
    y: f32,
    z: f32,
    radius: f32,
}

impl CacheRow {
    fn new(object: usize, kind: RowKind, det: &Detection2D) -> Self {
        CacheRow {
            object,
            kind,
            slice: det.slice,
            x: det.x,
            y: det.y,
            z: det.z,
            radius: det.radius,
        }
    }

    fn detection(&self) -> Detection2D {
        Detection2D {
            slice: self.slice,
            x: self.x,
            y: self.y,
            z: self.z,
            radius: self.radius,
        }
    }
}

/// CSV files under a results directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    results_dir: PathBuf,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(results_dir: P) -> Self {
        DiskCache {
            results_dir: results_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.results_dir.join(key.file_name())
    }
}

fn cache_err<E: std::fmt::Display>(path: &Path, e: E) -> FprError {
    FprError::Cache(format!("{:?}: {}", path, e))
}

impl ResultCache for DiskCache {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Candidate3D>>, FprError> {
        let path = self.path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| cache_err(&path, e))?;

        let mut candidates: Vec<Candidate3D> = Vec::new();
        for result in rdr.deserialize::<CacheRow>() {
            let row = result.map_err(|e| cache_err(&path, e))?;
            let open = candidates.len();
            match row.kind {
                RowKind::Region => {
                    if row.object != candidates.len() {
                        return Err(cache_err(
                            &path,
                            format!("region {} out of sequence", row.object),
                        ));
                    }
                    candidates.push(Candidate3D::from_region(row.detection()));
                }
                RowKind::Member => match candidates.last_mut() {
                    Some(cand) if row.object + 1 == open => cand.members.push(row.detection()),
                    _ => {
                        return Err(cache_err(
                            &path,
                            format!("member row for unknown object {}", row.object),
                        ))
                    }
                },
            }
        }
        Ok(Some(candidates))
    }

    fn save(&self, key: &CacheKey, candidates: &[Candidate3D]) -> Result<(), FprError> {
        std::fs::create_dir_all(&self.results_dir).map_err(|e| cache_err(&self.results_dir, e))?;
        let path = self.path(key);
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| cache_err(&path, e))?;

        for (idx, cand) in candidates.iter().enumerate() {
            wtr.serialize(CacheRow::new(idx, RowKind::Region, &cand.region))
                .map_err(|e| cache_err(&path, e))?;
            for member in &cand.members {
                wtr.serialize(CacheRow::new(idx, RowKind::Member, member))
                    .map_err(|e| cache_err(&path, e))?;
            }
        }
        // an empty side still needs its header so the file counts as a hit
        if candidates.is_empty() {
            wtr.write_record(["object", "kind", "slice", "x", "y", "z", "radius"])
                .map_err(|e| cache_err(&path, e))?;
        }
        wtr.flush().map_err(|e| cache_err(&path, e))?;
        Ok(())
    }
}

/// In-process cache, mostly for tests and for chaining stages without disk IO.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Vec<Candidate3D>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    reject_saves: bool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose writes always fail.
    pub fn read_only() -> Self {
        MemoryCache {
            reject_saves: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: CacheKey, candidates: Vec<Candidate3D>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, candidates);
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ResultCache for MemoryCache {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Candidate3D>>, FprError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .entries
            .lock()
            .map_err(|_| FprError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &CacheKey, candidates: &[Candidate3D]) -> Result<(), FprError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.reject_saves {
            return Err(FprError::Cache(format!("{} is read-only", key.file_name())));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| FprError::Cache("memory cache lock poisoned".to_string()))?;
        entries.insert(key.clone(), candidates.to_vec());
        Ok(())
    }
}
