//! Resolver orchestration.
//!
//! Composes the classifier, probe, manifest loading, browser maps, builtin
//! policy, jail confinement and the resolution cache into the end-to-end
//! algorithm:
//!
//! 1. Foreign ids and entry modules (no importer) are not handled.
//! 2. The cache answers repeat requests whose stamps still validate.
//! 3. The importer's browser map rewrites the raw specifier.
//! 4. The specifier is classified; the `only` allow-list is checked.
//! 5. Relative/absolute ids probe the filesystem directly; bare and scoped
//!    ids walk `node_modules`-style directories upward and select a package
//!    entry field.
//! 6. A concrete path is canonicalized unless symlinks are preserved.
//! 7. Builtin preference and the jail may downgrade the result to external.
//! 8. The modules-only policy reads the file and checks for module syntax.
//! 9. The outcome is cached under every path stamp the probe touched.

use crate::browser::{BrowserMap, BrowserMapRegistry, MapTarget};
use crate::builtins;
use crate::cache::{CacheKey, CacheStats, ResolutionCache};
use crate::error::{ConfigError, ResolveError};
use crate::esm::has_module_syntax;
use crate::fs::{FsProbe, ProbeStats, StampSet};
use crate::options::ResolverOptions;
use crate::package::{
    select_entry, EntrySelection, ManifestOutcome, PackageCache, PackageDescriptor,
};
use crate::specifier::{self, SpecifierKind};
use dashmap::DashSet;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

const MANIFEST_NAME: &str = "package.json";

/// Browser-map redirects followed per resolution before giving up.
const REDIRECT_LIMIT: u32 = 16;

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A concrete file to bundle.
    Found(PathBuf),
    /// The inert empty module: resolved to nothing, intentionally.
    Empty,
    /// Known module deliberately kept out of the bundle (builtin, escaped
    /// jail, disregarded entry, failed modules-only policy).
    External,
    /// Nothing here claimed the specifier; other resolution stages may.
    Unresolved,
}

/// Sink for advisory warnings. Warnings inform the caller, they never change
/// a resolution outcome.
pub trait WarningSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Forwards advisory warnings to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Package search result, before canonicalization and policy checks.
enum PackageOutcome {
    Found {
        path: PathBuf,
        map: Option<Arc<BrowserMap>>,
    },
    NotFound,
    External,
}

/// Node-style import resolver.
///
/// All session state (probe memo, descriptors, browser maps, resolution
/// cache) is owned by the instance; nothing is ambient. [`Resolver::reset`]
/// clears the per-pass state and belongs in the host's build-finalization
/// hook; the resolution cache itself survives passes and is policed by its
/// file stamps.
pub struct Resolver {
    options: ResolverOptions,
    /// Effective field order, browser field prepended when applicable.
    main_fields: Vec<String>,
    /// Normalized confinement root.
    jail: Option<PathBuf>,
    probe: FsProbe,
    packages: PackageCache,
    browser_maps: BrowserMapRegistry,
    cache: ResolutionCache,
    warned_builtins: DashSet<String>,
    warnings: Arc<dyn WarningSink>,
    preserve_symlinks: AtomicBool,
}

impl Resolver {
    /// Build a resolver, validating the configuration once.
    pub fn new(options: ResolverOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let main_fields = options.effective_main_fields();
        let jail = options.jail.as_ref().map(|j| {
            if j.is_absolute() {
                j.clean()
            } else {
                options.root.join(j).clean()
            }
        });
        Ok(Self {
            options,
            main_fields,
            jail,
            probe: FsProbe::new(),
            packages: PackageCache::new(),
            browser_maps: BrowserMapRegistry::new(),
            cache: ResolutionCache::new(),
            warned_builtins: DashSet::new(),
            warnings: Arc::new(TracingWarnings),
            preserve_symlinks: AtomicBool::new(false),
        })
    }

    /// Replace the advisory warning sink.
    #[must_use]
    pub fn with_warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.warnings = sink;
        self
    }

    /// Capture the host's symlink policy. Called once at build setup.
    pub fn set_preserve_symlinks(&self, preserve: bool) {
        self.preserve_symlinks.store(preserve, Ordering::Relaxed);
    }

    /// Clear per-pass session state: probe memo, descriptors, browser maps.
    ///
    /// The resolution cache is kept; its entries revalidate against the
    /// filesystem through their stamps.
    pub fn reset(&self) {
        self.probe.reset();
        self.packages.reset();
        self.browser_maps.reset();
        debug!("resolver session state cleared");
    }

    /// Resolution cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Filesystem probe statistics.
    #[must_use]
    pub fn probe_stats(&self) -> ProbeStats {
        self.probe.stats()
    }

    /// Resolve `specifier` as imported from `importer`.
    ///
    /// `Ok` covers every answer the host can act on, including "external"
    /// and "not handled"; `Err` is reserved for fatal conditions (broken or
    /// missing manifests of matched packages, I/O failures).
    pub async fn resolve(
        &self,
        specifier: &str,
        importer: Option<&Path>,
    ) -> Result<Resolution, ResolveError> {
        if specifier::is_foreign(specifier) {
            return Ok(Resolution::Unresolved);
        }
        let Some(importer) = importer else {
            // Entry modules belong to the host
            return Ok(Resolution::Unresolved);
        };

        let key = CacheKey {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        };
        self.cache
            .get_or_compute(key, &self.probe, || {
                self.resolve_uncached(specifier, importer)
            })
            .await
    }

    async fn resolve_uncached(
        &self,
        specifier: &str,
        importer: &Path,
    ) -> Result<(Resolution, StampSet), ResolveError> {
        let mut stamps = StampSet::new();
        let outcome = self.resolve_steps(specifier, importer, &mut stamps).await?;
        debug!(
            specifier,
            importer = %importer.display(),
            ?outcome,
            stamps = stamps.len(),
            "resolved"
        );
        Ok((outcome, stamps))
    }

    async fn resolve_steps(
        &self,
        specifier: &str,
        importer: &Path,
        stamps: &mut StampSet,
    ) -> Result<Resolution, ResolveError> {
        let importer_dir = importer.parent().unwrap_or(importer);
        let mut current = specifier.to_string();

        // The importer's browser map rewrites the raw specifier first
        let importer_map = if self.options.browser {
            self.browser_maps.get(importer)
        } else {
            None
        };
        if let Some(map) = &importer_map {
            self.probe.stat(&map.manifest_path, stamps).await?;
            match map.lookup(&current, importer_dir, &self.options.extensions) {
                Some(MapTarget::Stub) => return Ok(Resolution::Empty),
                Some(MapTarget::Redirect(target)) => current.clone_from(target),
                None => {}
            }
        }

        // Allow-list check on the package id; relative and absolute ids are
        // matched under their absolutized spelling
        if let Some(only) = &self.options.only {
            let id_owned;
            let id = match specifier::classify(&current) {
                SpecifierKind::Relative => {
                    let absolute = importer_dir.join(&current).clean();
                    id_owned = absolute.to_string_lossy().into_owned();
                    id_owned.as_str()
                }
                SpecifierKind::Absolute => current.as_str(),
                SpecifierKind::Scoped | SpecifierKind::Bare => {
                    specifier::split_package(&current).0
                }
            };
            if !only.iter().any(|entry| entry.matches(id)) {
                return Ok(Resolution::Unresolved);
            }
        }

        let mut redirects = 0u32;
        let (kind, candidate, map) = loop {
            if current.is_empty() || redirects > REDIRECT_LIMIT {
                return Ok(Resolution::Unresolved);
            }

            let kind = specifier::classify(&current);
            let (candidate, map) = match kind {
                SpecifierKind::Relative => {
                    let base = importer_dir.join(&current).clean();
                    let (path, descriptor) = self
                        .probe_target(&base, current.ends_with('/'), stamps)
                        .await?;
                    let map = self
                        .map_for(descriptor.as_deref())
                        .or_else(|| importer_map.clone());
                    (path, map)
                }
                SpecifierKind::Absolute => {
                    let base = PathBuf::from(&current).clean();
                    let (path, descriptor) = self
                        .probe_target(&base, current.ends_with('/'), stamps)
                        .await?;
                    let map = self
                        .map_for(descriptor.as_deref())
                        .or_else(|| importer_map.clone());
                    (path, map)
                }
                SpecifierKind::Scoped | SpecifierKind::Bare => {
                    match self.resolve_package(&current, importer_dir, stamps).await? {
                        PackageOutcome::Found { path, map } => (Some(path), map),
                        PackageOutcome::NotFound => (None, None),
                        PackageOutcome::External => return Ok(Resolution::External),
                    }
                }
            };

            // The governing map may rewrite the probed path once more
            if let (Some(path), Some(map_ref)) = (&candidate, &map) {
                self.probe.stat(&map_ref.manifest_path, stamps).await?;
                match map_ref.lookup_resolved(path) {
                    Some(MapTarget::Stub) => return Ok(Resolution::Empty),
                    Some(MapTarget::Redirect(target)) => {
                        current.clone_from(target);
                        redirects += 1;
                        continue;
                    }
                    None => {}
                }
            }
            break (kind, candidate, map);
        };

        let builtin = builtins::is_builtin(&current);
        let Some(path) = candidate else {
            if builtin {
                // The platform provides it; nothing local shadows it
                return Ok(Resolution::External);
            }
            return Ok(Resolution::Unresolved);
        };

        let path = if self.preserve_symlinks.load(Ordering::Relaxed) {
            path
        } else {
            match tokio::fs::canonicalize(&path).await {
                Ok(canonical) => dunce::simplified(&canonical).to_path_buf(),
                Err(_) => path,
            }
        };

        // A local package shadows the builtin only under an explicit
        // `prefer_builtins: false`; an unset preference keeps the builtin and
        // flags the bypassed file.
        if builtin && self.options.prefer_builtins.unwrap_or(true) {
            if self.options.prefer_builtins.is_none() {
                self.warn_builtin_preference(&current, &path);
            }
            return Ok(Resolution::External);
        }

        if kind != SpecifierKind::Relative {
            if let Some(jail) = &self.jail {
                if !path.starts_with(jail) {
                    debug!(
                        path = %path.display(),
                        jail = %jail.display(),
                        "resolution escapes the jail"
                    );
                    return Ok(Resolution::External);
                }
            }
        }

        if self.options.modules_only {
            let content = self.probe.read_to_string(&path, stamps).await?;
            if !content.as_deref().is_some_and(has_module_syntax) {
                return Ok(Resolution::External);
            }
        }

        if let Some(map) = map {
            self.browser_maps.register(&path, &map);
        }

        Ok(Resolution::Found(path))
    }

    /// Resolve a bare or scoped specifier through the directory walk.
    async fn resolve_package(
        &self,
        specifier: &str,
        importer_dir: &Path,
        stamps: &mut StampSet,
    ) -> Result<PackageOutcome, ResolveError> {
        let (id, subpath) = specifier::split_package(specifier);
        let search_base = if self.options.dedupe.iter().any(|d| d == id) {
            self.options.root.as_path()
        } else {
            importer_dir
        };

        let Some(pkg_dir) = self.find_package_dir(id, search_base, stamps).await? else {
            return Ok(PackageOutcome::NotFound);
        };

        // A directory-walk match makes the manifest mandatory
        let manifest_path = pkg_dir.join(MANIFEST_NAME);
        let descriptor = match self.packages.load(&manifest_path, &self.probe, stamps).await? {
            ManifestOutcome::Loaded(d) => d,
            ManifestOutcome::Missing => {
                return Err(ResolveError::ManifestMissing {
                    dir: pkg_dir,
                    specifier: specifier.to_string(),
                })
            }
            ManifestOutcome::Invalid(source) => {
                return Err(ResolveError::ManifestParse {
                    path: manifest_path,
                    source,
                })
            }
        };
        let map = self.map_for(Some(&descriptor));

        if let Some(sub) = subpath {
            let target = pkg_dir.join(sub);
            let (path, nested) = self.probe_target(&target, sub.ends_with('/'), stamps).await?;
            let map = map.or_else(|| self.map_for(nested.as_deref()));
            return Ok(match path {
                Some(path) => PackageOutcome::Found { path, map },
                None => PackageOutcome::NotFound,
            });
        }

        match select_entry(&descriptor, &self.main_fields, self.options.browser) {
            EntrySelection::Main { value, .. } => {
                let entry = pkg_dir.join(value).clean();
                let path = match self.probe_entry(&entry, stamps).await? {
                    Some(p) => Some(p),
                    None => self.probe_index(&pkg_dir, stamps).await?,
                };
                Ok(match path {
                    Some(path) => PackageOutcome::Found { path, map },
                    None => PackageOutcome::NotFound,
                })
            }
            EntrySelection::Disregard => {
                debug!(
                    dir = %pkg_dir.display(),
                    "no usable entry field under the configured policy"
                );
                Ok(PackageOutcome::External)
            }
        }
    }

    /// Walk upward from `from_dir` looking for a package directory.
    async fn find_package_dir(
        &self,
        id: &str,
        from_dir: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<PathBuf>, ResolveError> {
        for dir in from_dir.ancestors() {
            for modules_dir in &self.options.search.module_directories {
                let candidate = dir.join(modules_dir).join(id);
                if self.probe.is_dir(&candidate, stamps).await? {
                    return Ok(Some(candidate));
                }
            }
        }
        for fallback in &self.options.search.fallback_paths {
            let candidate = fallback.join(id);
            if self.probe.is_dir(&candidate, stamps).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Probe a path as a file or directory, honoring a manifest when the
    /// directory carries one. Returns the consulted descriptor alongside the
    /// hit so the caller can pick up its browser map.
    async fn probe_target(
        &self,
        base: &Path,
        want_dir: bool,
        stamps: &mut StampSet,
    ) -> Result<(Option<PathBuf>, Option<Arc<PackageDescriptor>>), ResolveError> {
        if !want_dir {
            if let Some(f) = self.probe_file(base, stamps).await? {
                return Ok((Some(f), None));
            }
        }
        if !self.probe.is_dir(base, stamps).await? {
            return Ok((None, None));
        }

        let manifest_path = base.join(MANIFEST_NAME);
        match self.packages.load(&manifest_path, &self.probe, stamps).await? {
            ManifestOutcome::Loaded(descriptor) => {
                if let EntrySelection::Main { value, .. } =
                    select_entry(&descriptor, &self.main_fields, self.options.browser)
                {
                    let entry = base.join(value).clean();
                    if let Some(f) = self.probe_entry(&entry, stamps).await? {
                        return Ok((Some(f), Some(descriptor)));
                    }
                }
                let index = self.probe_index(base, stamps).await?;
                Ok((index, Some(descriptor)))
            }
            ManifestOutcome::Missing => Ok((self.probe_index(base, stamps).await?, None)),
            ManifestOutcome::Invalid(e) => {
                debug!(
                    path = %manifest_path.display(),
                    error = %e,
                    "unparsable manifest in plain directory"
                );
                Ok((None, None))
            }
        }
    }

    /// Probe an entry value: exact file, extension probing, then an index
    /// file when the entry names a directory.
    async fn probe_entry(
        &self,
        entry: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<PathBuf>, ResolveError> {
        if let Some(f) = self.probe_file(entry, stamps).await? {
            return Ok(Some(f));
        }
        if self.probe.is_dir(entry, stamps).await? {
            return self.probe_index(entry, stamps).await;
        }
        Ok(None)
    }

    /// Exact path, then each configured extension appended.
    async fn probe_file(
        &self,
        base: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<PathBuf>, ResolveError> {
        if self.probe.is_file(base, stamps).await? {
            return Ok(Some(base.to_path_buf()));
        }
        for ext in &self.options.extensions {
            let mut candidate = base.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if self.probe.is_file(&candidate, stamps).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// `index.<ext>` inside a directory, in extension order.
    async fn probe_index(
        &self,
        dir: &Path,
        stamps: &mut StampSet,
    ) -> Result<Option<PathBuf>, ResolveError> {
        for ext in &self.options.extensions {
            let candidate = dir.join(format!("index{ext}"));
            if self.probe.is_file(&candidate, stamps).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn map_for(&self, descriptor: Option<&PackageDescriptor>) -> Option<Arc<BrowserMap>> {
        if !self.options.browser {
            return None;
        }
        descriptor.and_then(|d| self.browser_maps.obtain(d, &self.options.extensions))
    }

    /// Advisory notice, once per specifier: a builtin shadowed a local file.
    fn warn_builtin_preference(&self, specifier: &str, local: &Path) {
        if self.warned_builtins.insert(specifier.to_string()) {
            self.warnings.warn(&format!(
                "preferring built-in module '{specifier}' over local alternative at '{}', \
                 pass 'preferBuiltins: false' to disable this behavior or \
                 'preferBuiltins: true' to disable this warning",
                local.display()
            ));
        }
    }
}
