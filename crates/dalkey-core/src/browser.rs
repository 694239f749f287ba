//! Browser-field override maps.
//!
//! A package manifest with an object-valued browser field rewires imports
//! for browser targets: relative keys remap files inside the package, bare
//! keys remap (or stub out) whole dependencies, and a `false` value means
//! "replace with the inert empty module".
//!
//! One map is built per package and registered against every module path
//! resolved from that package, so later imports from those modules consult
//! the same map. The registry is session state, cleared between build passes.

use crate::package::PackageDescriptor;
use dashmap::DashMap;
use path_clean::PathClean;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Override target for one map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTarget {
    /// Resolve to the inert empty module.
    Stub,
    /// Replace with another specifier: an absolute path (from a relative
    /// value) or a bare package id.
    Redirect(String),
}

/// Override map from one package's browser field.
#[derive(Debug)]
pub struct BrowserMap {
    /// Manifest the map came from. Consulting the map makes this manifest a
    /// freshness witness of the resolution.
    pub manifest_path: PathBuf,
    entries: HashMap<String, MapTarget>,
}

impl BrowserMap {
    /// Build the map for a package, or `None` when the manifest has no
    /// object-valued browser field.
    ///
    /// Relative keys are registered literally and in absolute form; keys
    /// without an extension are additionally registered with each configured
    /// extension so extension-less overrides still match extension-bearing
    /// imports. Relative values are absolutized against the package root.
    #[must_use]
    pub fn build(descriptor: &PackageDescriptor, extensions: &[String]) -> Option<Self> {
        let object = descriptor.browser_object()?;
        let mut entries = HashMap::new();

        for (key, value) in object {
            let target = match value {
                serde_json::Value::Bool(false) => MapTarget::Stub,
                serde_json::Value::String(s) if s.is_empty() => continue,
                serde_json::Value::String(s) if s.starts_with('.') => {
                    let absolute = descriptor.dir.join(s).clean();
                    MapTarget::Redirect(absolute.to_string_lossy().into_owned())
                }
                serde_json::Value::String(s) => MapTarget::Redirect(s.clone()),
                _ => continue,
            };

            entries.insert(key.clone(), target.clone());

            if key.starts_with('.') {
                let absolute_key = descriptor.dir.join(key).clean();
                let absolute_key = absolute_key.to_string_lossy().into_owned();
                if Path::new(key).extension().is_none() {
                    for ext in extensions {
                        entries.insert(format!("{key}{ext}"), target.clone());
                        entries.insert(format!("{absolute_key}{ext}"), target.clone());
                    }
                }
                entries.insert(absolute_key, target);
            }
        }

        Some(Self {
            manifest_path: descriptor.path.clone(),
            entries,
        })
    }

    /// Look up an override for `specifier` imported from `importer_dir`.
    ///
    /// Tries the raw specifier, its absolutized form, and the absolutized
    /// form with each configured extension appended (an extension-less import
    /// may be overridden under its extension-bearing key).
    #[must_use]
    pub fn lookup(
        &self,
        specifier: &str,
        importer_dir: &Path,
        extensions: &[String],
    ) -> Option<&MapTarget> {
        if let Some(target) = self.entries.get(specifier) {
            return Some(target);
        }

        let absolute = importer_dir.join(specifier).clean();
        let absolute = absolute.to_string_lossy();
        if let Some(target) = self.entries.get(absolute.as_ref()) {
            return Some(target);
        }
        for ext in extensions {
            if let Some(target) = self.entries.get(&format!("{absolute}{ext}")) {
                return Some(target);
            }
        }
        None
    }

    /// Look up an override for an already-resolved absolute path.
    #[must_use]
    pub fn lookup_resolved(&self, resolved: &Path) -> Option<&MapTarget> {
        self.entries.get(resolved.to_string_lossy().as_ref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps in effect, keyed by the resolved module paths of their packages.
///
/// Also memoizes map construction per manifest, so resolving ten modules of
/// one package builds its map once.
#[derive(Debug, Default)]
pub struct BrowserMapRegistry {
    maps: DashMap<PathBuf, Arc<BrowserMap>>,
    by_manifest: DashMap<PathBuf, Option<Arc<BrowserMap>>>,
}

impl BrowserMapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map governing imports written in `importer`, if any.
    #[must_use]
    pub fn get(&self, importer: &Path) -> Option<Arc<BrowserMap>> {
        self.maps.get(importer).map(|m| m.clone())
    }

    /// Build (or reuse) the map for a loaded package.
    #[must_use]
    pub fn obtain(
        &self,
        descriptor: &PackageDescriptor,
        extensions: &[String],
    ) -> Option<Arc<BrowserMap>> {
        self.by_manifest
            .entry(descriptor.path.clone())
            .or_insert_with(|| BrowserMap::build(descriptor, extensions).map(Arc::new))
            .clone()
    }

    /// Associate a resolved module path with its package's map.
    pub fn register(&self, module_path: &Path, map: &Arc<BrowserMap>) {
        self.maps.insert(module_path.to_path_buf(), map.clone());
    }

    /// Number of registered module paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Drop all registrations. Invoked between build passes.
    pub fn reset(&self) {
        self.maps.clear();
        self.by_manifest.clear();
    }
}
