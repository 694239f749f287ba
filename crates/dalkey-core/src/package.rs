//! Package manifests: loading, caching, entry-point field selection.

use crate::error::ResolveError;
use crate::fs::{FsProbe, StampSet};
use crate::options::BROWSER_FIELD;
use dashmap::DashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A parsed `package.json`.
#[derive(Debug)]
pub struct PackageDescriptor {
    /// Manifest path.
    pub path: PathBuf,
    /// Package root directory.
    pub dir: PathBuf,
    /// Raw manifest value.
    pub manifest: Value,
}

impl PackageDescriptor {
    /// Package name, if declared.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.manifest.get("name").and_then(Value::as_str)
    }

    /// String value of a top-level manifest field.
    #[must_use]
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.manifest.get(field).and_then(Value::as_str)
    }

    /// Object value of the browser field, when it is a per-file map.
    #[must_use]
    pub fn browser_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.manifest.get(BROWSER_FIELD).and_then(Value::as_object)
    }
}

/// Outcome of loading a manifest. Parse failures are reported to the caller,
/// which decides whether they are fatal for the directory at hand.
#[derive(Debug)]
pub enum ManifestOutcome {
    Loaded(Arc<PackageDescriptor>),
    Missing,
    Invalid(serde_json::Error),
}

/// Descriptor cache, keyed by manifest path.
///
/// Only successfully parsed manifests are cached; a broken manifest is
/// re-reported from the (memoized) file content on every attempt. Selection
/// reads from the shared descriptor, it never rewrites it.
#[derive(Debug, Default)]
pub struct PackageCache {
    descriptors: DashMap<PathBuf, Arc<PackageDescriptor>>,
}

impl PackageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the manifest at `manifest_path` through the probe.
    ///
    /// The manifest is stamped even on a cache hit, so every resolution that
    /// consulted it carries it as a freshness witness.
    pub async fn load(
        &self,
        manifest_path: &Path,
        probe: &FsProbe,
        stamps: &mut StampSet,
    ) -> Result<ManifestOutcome, ResolveError> {
        if let Some(descriptor) = self.descriptors.get(manifest_path).map(|d| d.clone()) {
            probe.stat(manifest_path, stamps).await?;
            return Ok(ManifestOutcome::Loaded(descriptor));
        }

        let Some(content) = probe.read_to_string(manifest_path, stamps).await? else {
            return Ok(ManifestOutcome::Missing);
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(manifest) => {
                let dir = manifest_path
                    .parent()
                    .map_or_else(PathBuf::new, Path::to_path_buf);
                let descriptor = Arc::new(PackageDescriptor {
                    path: manifest_path.to_path_buf(),
                    dir,
                    manifest,
                });
                self.descriptors
                    .insert(manifest_path.to_path_buf(), descriptor.clone());
                Ok(ManifestOutcome::Loaded(descriptor))
            }
            Err(e) => Ok(ManifestOutcome::Invalid(e)),
        }
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Drop all descriptors. Invoked between build passes.
    pub fn reset(&self) {
        self.descriptors.clear();
    }
}

/// Entry-point choice for a package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelection<'a> {
    /// First usable field, with its relative entry value.
    Main { field: &'a str, value: &'a str },
    /// No configured field carries a usable value; the package directory
    /// cannot provide an entry point under this policy.
    Disregard,
}

/// Select the effective entry point for `descriptor` under `fields` order.
///
/// In browser mode a string-valued browser field wins outright, wherever
/// the browser field sits in the configured order: the string form is the
/// package author's single-entry override for browser targets.
#[must_use]
pub fn select_entry<'a>(
    descriptor: &'a PackageDescriptor,
    fields: &'a [String],
    browser_mode: bool,
) -> EntrySelection<'a> {
    if browser_mode {
        if let Some(value) = descriptor.field_str(BROWSER_FIELD) {
            if !value.is_empty() {
                return EntrySelection::Main {
                    field: BROWSER_FIELD,
                    value,
                };
            }
        }
    }

    for field in fields {
        if let Some(value) = descriptor.field_str(field) {
            if !value.is_empty() {
                return EntrySelection::Main { field, value };
            }
        }
    }
    EntrySelection::Disregard
}
