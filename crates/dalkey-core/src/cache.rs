//! Resolution cache.
//!
//! Memoizes final outcomes per (specifier, importer) pair. Each entry carries
//! the stamps of every path its computation touched; a lookup re-checks those
//! stamps and recomputes when any of them no longer matches, so the cache
//! stays observationally transparent to filesystem changes without blanket
//! invalidation.
//!
//! Concurrent requests for the same key share one in-flight computation: the
//! per-key cell admits a single initializer, everyone else awaits it. A
//! computation abandoned mid-flight (cancelled build) leaves the cell unset.

use crate::error::ResolveError;
use crate::fs::{FsProbe, StampSet};
use crate::resolver::Resolution;
use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// One resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub specifier: String,
    pub importer: PathBuf,
}

/// Cached outcome plus the stamps proving it current.
#[derive(Debug)]
pub struct CacheEntry {
    pub outcome: Resolution,
    pub stamps: StampSet,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entry_count: usize,
}

/// Stamp-validated resolution cache.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: DashMap<CacheKey, Arc<OnceCell<Arc<CacheEntry>>>>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `key`, computing it if absent or stale.
    ///
    /// `compute` must return the outcome together with the stamps of every
    /// path touched while producing it. It may run more than once only when
    /// a previously cached entry was found stale.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        probe: &FsProbe,
        compute: F,
    ) -> Result<Resolution, ResolveError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(Resolution, StampSet), ResolveError>>,
    {
        loop {
            let cell = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let entry = cell
                .get_or_try_init(|| async {
                    let (outcome, stamps) = compute().await?;
                    Ok::<_, ResolveError>(Arc::new(CacheEntry { outcome, stamps }))
                })
                .await?
                .clone();

            // A fresh entry validates against the same probe memo it was
            // computed from; only an entry from an earlier pass can fail here.
            if probe.stamps_valid(&entry.stamps).await? {
                return Ok(entry.outcome.clone());
            }

            debug!(
                specifier = %key.specifier,
                importer = %key.importer.display(),
                "cached resolution is stale, recomputing"
            );
            self.entries.remove_if(&key, |_, v| Arc::ptr_eq(v, &cell));
        }
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
        }
    }

    /// Drop every entry. Stamp validation keeps entries honest across passes,
    /// so hosts only need this for a full teardown.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(specifier: &str, importer: &std::path::Path) -> CacheKey {
        CacheKey {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dep.js");
        std::fs::write(&file, "var d = 1;\n").unwrap();

        let probe = FsProbe::new();
        let cache = ResolutionCache::new();
        let computed = AtomicUsize::new(0);

        let importer = dir.path().join("main.js");
        for _ in 0..2 {
            let outcome = cache
                .get_or_compute(key("./dep", &importer), &probe, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    let mut stamps = StampSet::new();
                    probe.stat(&file, &mut stamps).await?;
                    Ok((Resolution::Found(file.clone()), stamps))
                })
                .await
                .unwrap();
            assert_eq!(outcome, Resolution::Found(file.clone()));
        }
        assert_eq!(computed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_stale_entry_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dep.js");
        std::fs::write(&file, "var d = 1;\n").unwrap();

        let probe = FsProbe::new();
        let cache = ResolutionCache::new();
        let computed = AtomicUsize::new(0);
        let importer = dir.path().join("main.js");

        let run = || {
            let cache = &cache;
            let probe = &probe;
            let file = file.clone();
            let computed = &computed;
            let k = key("./dep", &importer);
            async move {
                cache
                    .get_or_compute(k, probe, || async {
                        computed.fetch_add(1, Ordering::SeqCst);
                        let mut stamps = StampSet::new();
                        probe.stat(&file, &mut stamps).await?;
                        Ok((Resolution::Found(file.clone()), stamps))
                    })
                    .await
                    .unwrap()
            }
        };

        run().await;
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        // File grows between passes
        std::fs::write(&file, "var d = 1;\nvar e = 2;\n").unwrap();
        probe.reset();
        run().await;
        assert_eq!(computed.load(Ordering::SeqCst), 2);

        // Unchanged afterwards: cached again
        probe.reset();
        run().await;
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_computation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dep.js");
        std::fs::write(&file, "var d = 1;\n").unwrap();

        let probe = FsProbe::new();
        let cache = ResolutionCache::new();
        let computed = AtomicUsize::new(0);
        let importer = dir.path().join("main.js");

        let compute = || async {
            computed.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let mut stamps = StampSet::new();
            probe.stat(&file, &mut stamps).await?;
            Ok((Resolution::Found(file.clone()), stamps))
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute(key("./dep", &importer), &probe, compute),
            cache.get_or_compute(key("./dep", &importer), &probe, compute),
        );
        assert_eq!(a.unwrap(), Resolution::Found(file.clone()));
        assert_eq!(b.unwrap(), Resolution::Found(file));
        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FsProbe::new();
        let cache = ResolutionCache::new();
        let importer = dir.path().join("main.js");

        cache
            .get_or_compute(key("x", &importer), &probe, || async {
                Ok((Resolution::Unresolved, StampSet::new()))
            })
            .await
            .unwrap();
        assert_eq!(cache.stats().entry_count, 1);
        cache.clear();
        assert_eq!(cache.stats().entry_count, 0);
    }
}
