//! Bundler-facing node-resolve plugin.
//!
//! Thin adapter between a bundler's plugin hooks and the resolution engine in
//! `dalkey-core`. The bundler's graph walker calls [`NodeResolve::resolve_id`]
//! once per (specifier, importer) pair; `Ok(None)` means "not handled here,
//! treat as external", `Err` aborts the build. Two lifecycle hooks carry the
//! rest of the contract: [`NodeResolve::build_start`] captures the host's
//! symlink policy, [`NodeResolve::build_end`] clears per-pass session state.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod options;

pub use options::{CustomResolveOptions, NodeResolveOptions};

use dalkey_core::{ConfigError, Resolution, ResolveError, Resolver, WarningSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Module id handed to the host for imports stubbed out by a browser map.
///
/// The leading control character keeps it out of every other resolver's way;
/// the host's load stage materializes it through [`NodeResolve::load`].
pub const EMPTY_MODULE_ID: &str = "\0node-resolve:empty.js";

/// Source of the inert empty module.
pub const EMPTY_MODULE_SOURCE: &str = "export default {};\n";

/// Global build options delivered by the host at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Keep symlinked paths as written instead of canonicalizing them.
    pub preserve_symlinks: bool,
}

/// The node-resolve plugin.
pub struct NodeResolve {
    resolver: Resolver,
}

impl NodeResolve {
    /// Build the plugin for a project rooted at `root`.
    ///
    /// The option bag is normalized and validated here; a constructed plugin
    /// never reports a configuration problem mid-build.
    pub fn new(root: impl Into<PathBuf>, options: NodeResolveOptions) -> Result<Self, ConfigError> {
        let resolver_options = options.into_resolver_options(&root.into())?;
        Ok(Self {
            resolver: Resolver::new(resolver_options)?,
        })
    }

    /// Route advisory warnings somewhere other than the `tracing` subscriber.
    #[must_use]
    pub fn with_warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.resolver = self.resolver.with_warning_sink(sink);
        self
    }

    /// Plugin name, for the host's diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        "node-resolve"
    }

    /// Startup hook: capture global build options.
    pub fn build_start(&self, build: &BuildOptions) {
        self.resolver.set_preserve_symlinks(build.preserve_symlinks);
        debug!(preserve_symlinks = build.preserve_symlinks, "build started");
    }

    /// Resolve `specifier` as imported from `importer`.
    ///
    /// Folds the core's tagged outcome to the host contract: a concrete path
    /// or the empty-module id bundles, external and unhandled ids surface as
    /// `None`, fatal conditions as `Err`.
    pub async fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> Result<Option<String>, ResolveError> {
        let importer = importer.map(Path::new);
        let outcome = self.resolver.resolve(specifier, importer).await?;
        Ok(match outcome {
            Resolution::Found(path) => Some(path.to_string_lossy().into_owned()),
            Resolution::Empty => Some(EMPTY_MODULE_ID.to_string()),
            Resolution::External | Resolution::Unresolved => None,
        })
    }

    /// Load hook: materialize the empty module; everything else belongs to
    /// other loaders.
    #[must_use]
    pub fn load(&self, id: &str) -> Option<&'static str> {
        (id == EMPTY_MODULE_ID).then_some(EMPTY_MODULE_SOURCE)
    }

    /// Finalization hook: clear per-pass session state before the next pass.
    pub fn build_end(&self) {
        self.resolver.reset();
    }

    /// The underlying resolver, for cache introspection.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn canonical_root(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().canonicalize().unwrap()
    }

    fn plugin(root: &Path, options: NodeResolveOptions) -> NodeResolve {
        NodeResolve::new(root, options).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_package_to_path_string() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        write(
            &root.join("node_modules/dep/package.json"),
            r#"{"name": "dep", "main": "index.js"}"#,
        );
        write(&root.join("node_modules/dep/index.js"), "var d = 1;\n");
        let importer = root.join("main.js");

        let p = plugin(&root, NodeResolveOptions::default());
        let resolved = p
            .resolve_id("dep", Some(importer.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(
            resolved.as_deref(),
            root.join("node_modules/dep/index.js").to_str()
        );
    }

    #[tokio::test]
    async fn test_unhandled_and_external_fold_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        let importer = root.join("main.js");
        let importer = importer.to_str().unwrap();

        let p = plugin(&root, NodeResolveOptions::default());
        // Builtin: external
        assert_eq!(p.resolve_id("fs", Some(importer)).await.unwrap(), None);
        // Unknown package: unresolved
        assert_eq!(
            p.resolve_id("no-such-pkg", Some(importer)).await.unwrap(),
            None
        );
        // Entry module: belongs to the host
        assert_eq!(p.resolve_id("./main", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_browser_stub_loads_empty_module() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        write(
            &root.join("node_modules/pkg/package.json"),
            r#"{"name": "pkg", "main": "index.js", "browser": {"net": false}}"#,
        );
        write(&root.join("node_modules/pkg/index.js"), "import 'net';\n");
        let importer = root.join("main.js");

        let options: NodeResolveOptions =
            serde_json::from_str(r#"{"browser": true}"#).unwrap();
        let p = plugin(&root, options);

        let entry = p
            .resolve_id("pkg", Some(importer.to_str().unwrap()))
            .await
            .unwrap()
            .unwrap();
        let stubbed = p.resolve_id("net", Some(&entry)).await.unwrap().unwrap();
        assert_eq!(stubbed, EMPTY_MODULE_ID);

        assert_eq!(p.load(&stubbed), Some(EMPTY_MODULE_SOURCE));
        assert_eq!(p.load(&entry), None);
    }

    #[tokio::test]
    async fn test_manifest_errors_abort_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        write(&root.join("node_modules/dep/package.json"), "{ not json");
        let importer = root.join("main.js");

        let p = plugin(&root, NodeResolveOptions::default());
        let err = p
            .resolve_id("dep", Some(importer.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::ManifestParse { .. }));
    }

    #[tokio::test]
    async fn test_build_end_picks_up_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        write(
            &root.join("node_modules/dep/package.json"),
            r#"{"name": "dep", "main": "one.js"}"#,
        );
        write(&root.join("node_modules/dep/one.js"), "var one = 1;\n");
        write(&root.join("node_modules/dep/two.js"), "var two = 22;\n");
        let importer = root.join("main.js");
        let importer = importer.to_str().unwrap();

        let p = plugin(&root, NodeResolveOptions::default());
        let first = p.resolve_id("dep", Some(importer)).await.unwrap().unwrap();
        assert!(first.ends_with("one.js"));

        write(
            &root.join("node_modules/dep/package.json"),
            r#"{"name": "dep", "main": "two.js"}"#,
        );
        p.build_end();
        let second = p.resolve_id("dep", Some(importer)).await.unwrap().unwrap();
        assert!(second.ends_with("two.js"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_start_captures_symlink_policy() {
        let dir = tempfile::tempdir().unwrap();
        let root = canonical_root(&dir);
        write(&root.join("real.js"), "var r = 1;\n");
        std::os::unix::fs::symlink(root.join("real.js"), root.join("link.js")).unwrap();
        let importer = root.join("main.js");
        let importer = importer.to_str().unwrap();

        let p = plugin(&root, NodeResolveOptions::default());
        p.build_start(&BuildOptions {
            preserve_symlinks: true,
        });
        let resolved = p
            .resolve_id("./link.js", Some(importer))
            .await
            .unwrap()
            .unwrap();
        assert!(resolved.ends_with("link.js"));
    }

    #[test]
    fn test_bad_configuration_fails_construction() {
        let options: NodeResolveOptions =
            serde_json::from_str(r#"{"mainFields": []}"#).unwrap();
        assert!(matches!(
            NodeResolve::new("/proj", options),
            Err(ConfigError::EmptyMainFields)
        ));
    }
}
