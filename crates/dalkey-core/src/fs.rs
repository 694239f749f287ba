//! Filesystem probe.
//!
//! All filesystem questions asked during resolution go through [`FsProbe`]:
//! `stat`, `is_file`, `is_dir`, `read_to_string`. Each answer is memoized per
//! absolute path for the lifetime of one build pass; [`FsProbe::reset`] clears
//! the memo between passes (watch mode rewrites files under us).
//!
//! Every query also records a [`FileStamp`] into the caller's [`StampSet`],
//! which the resolution cache later re-checks to decide whether a cached
//! outcome is still trustworthy. Not-found is a cached answer like any other;
//! only real I/O failures propagate.

use crate::error::ResolveError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Metadata for one path, captured at first probe.
#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub is_file: bool,
    pub is_dir: bool,
    /// Modification time in millis since epoch, if the platform reports one.
    pub mtime_ms: Option<u64>,
    pub size: u64,
}

impl FileMeta {
    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);
        Self {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            mtime_ms,
            size: meta.len(),
        }
    }

    /// The freshness stamp for this observation.
    #[must_use]
    pub fn stamp(&self) -> FileStamp {
        FileStamp::Present {
            mtime_ms: self.mtime_ms,
            size: self.size,
        }
    }
}

/// One recorded filesystem observation, used for cache freshness checks.
///
/// `Missing` is as much a witness as `Present`: a cached outcome that relied
/// on a file being absent must be recomputed once that file appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStamp {
    Present { mtime_ms: Option<u64>, size: u64 },
    Missing,
}

/// Every path touched while computing one resolution, with its stamp.
#[derive(Debug, Clone, Default)]
pub struct StampSet {
    entries: HashMap<PathBuf, FileStamp>,
}

impl StampSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &Path, stamp: FileStamp) {
        self.entries.insert(path.to_path_buf(), stamp);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileStamp)> {
        self.entries.iter()
    }
}

/// Probe cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct ProbeStats {
    pub stat_entries: usize,
    pub read_entries: usize,
}

/// Memoizing filesystem probe.
///
/// Shared maps hold one async cell per path so that concurrent resolutions
/// asking the same question share a single I/O operation. A cell abandoned
/// mid-initialization (cancelled build) stays unset and the next caller
/// re-runs the I/O.
#[derive(Debug, Default)]
pub struct FsProbe {
    stats: DashMap<PathBuf, Arc<OnceCell<Option<FileMeta>>>>,
    reads: DashMap<PathBuf, Arc<OnceCell<Option<Arc<str>>>>>,
}

impl FsProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stat a path, memoized. `None` means the path does not exist.
    ///
    /// Records a stamp for the path in `stamps`. Errors other than not-found
    /// propagate and leave the memo entry unset.
    pub async fn stat(
        &self,
        path: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<FileMeta>, ResolveError> {
        let meta = self.stat_memo(path).await?;
        match meta {
            Some(m) => stamps.record(path, m.stamp()),
            None => stamps.record(path, FileStamp::Missing),
        }
        Ok(meta)
    }

    /// Whether the path is an existing regular file.
    pub async fn is_file(&self, path: &Path, stamps: &mut StampSet) -> Result<bool, ResolveError> {
        Ok(self.stat(path, stamps).await?.is_some_and(|m| m.is_file))
    }

    /// Whether the path is an existing directory.
    pub async fn is_dir(&self, path: &Path, stamps: &mut StampSet) -> Result<bool, ResolveError> {
        Ok(self.stat(path, stamps).await?.is_some_and(|m| m.is_dir))
    }

    /// Read a file as UTF-8, memoized. `None` when the path is missing or not
    /// a regular file.
    pub async fn read_to_string(
        &self,
        path: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<Arc<str>>, ResolveError> {
        let Some(meta) = self.stat(path, stamps).await? else {
            return Ok(None);
        };
        if !meta.is_file {
            return Ok(None);
        }

        let cell = self
            .reads
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let content = cell
            .get_or_try_init(|| async {
                match tokio::fs::read_to_string(path).await {
                    Ok(s) => Ok(Some(Arc::<str>::from(s))),
                    // Deleted between stat and read; the stamp catches it next pass
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(ResolveError::io(path, e)),
                }
            })
            .await?;
        Ok(content.clone())
    }

    /// Re-check every stamp in `set` against the current filesystem state.
    ///
    /// Returns `false` as soon as any path's stamp no longer matches. Uses
    /// the same memo as the original computation, so within one build pass a
    /// set recorded by that pass always validates.
    pub async fn stamps_valid(&self, set: &StampSet) -> Result<bool, ResolveError> {
        for (path, recorded) in set.iter() {
            let current = match self.stat_memo(path).await? {
                Some(m) => m.stamp(),
                None => FileStamp::Missing,
            };
            if current != *recorded {
                debug!(path = %path.display(), "stamp mismatch, cached resolution is stale");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Clear the memo. Invoked between build passes.
    pub fn reset(&self) {
        let stats = self.stats.len();
        let reads = self.reads.len();
        self.stats.clear();
        self.reads.clear();
        debug!(stats, reads, "filesystem probe memo cleared");
    }

    /// Probe cache statistics.
    #[must_use]
    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            stat_entries: self.stats.len(),
            read_entries: self.reads.len(),
        }
    }

    async fn stat_memo(&self, path: &Path) -> Result<Option<FileMeta>, ResolveError> {
        let cell = self
            .stats
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let meta = cell
            .get_or_try_init(|| async {
                match tokio::fs::metadata(path).await {
                    Ok(m) => Ok(Some(FileMeta::from_metadata(&m))),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(ResolveError::io(path, e)),
                }
            })
            .await?;
        Ok(*meta)
    }
}
