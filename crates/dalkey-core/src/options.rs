//! Resolver configuration.
//!
//! [`ResolverOptions`] is the normalized form consumed by the resolver.
//! Host-facing option bags (legacy flag spellings, string patterns) are
//! translated into this structure before construction; validation happens
//! once, in `Resolver::new`, so a constructed resolver never reports a
//! configuration problem mid-resolution.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Default extension probe order. The module-style extension comes before
/// the legacy script extension so dual-distributed packages prefer it.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".mjs", ".js", ".json", ".node"];

/// Default manifest field order for entry-point selection.
pub const DEFAULT_MAIN_FIELDS: &[&str] = &["module", "main"];

/// Manifest field consulted in browser mode, always at the front of the
/// effective field order.
pub const BROWSER_FIELD: &str = "browser";

/// Directory-search knobs.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Directory names probed as package containers during the upward walk.
    pub module_directories: Vec<String>,
    /// Extra roots searched after the walk reaches the filesystem root.
    pub fallback_paths: Vec<PathBuf>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            module_directories: vec!["node_modules".to_string()],
            fallback_paths: Vec::new(),
        }
    }
}

/// One entry of the `only` allow-list.
#[derive(Debug, Clone)]
pub enum OnlySpec {
    /// Exact package id.
    Name(String),
    /// Regex matched against the whole package id.
    Pattern(regex_lite::Regex),
}

impl OnlySpec {
    /// Compile a pattern entry.
    pub fn pattern(source: &str) -> Result<Self, ConfigError> {
        let anchored = format!("^(?:{source})$");
        let re = regex_lite::Regex::new(&anchored).map_err(|e| {
            ConfigError::InvalidOnlyPattern {
                pattern: source.to_string(),
                source: e,
            }
        })?;
        Ok(Self::Pattern(re))
    }

    /// Whether the package id is admitted by this entry.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Name(name) => name == id,
            Self::Pattern(re) => re.is_match(id),
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Project root: base for dedupe resolution and relative jail paths.
    pub root: PathBuf,
    /// Manifest fields tried in order for a package entry point.
    pub main_fields: Vec<String>,
    /// Browser mode: activates the browser field and override maps.
    pub browser: bool,
    /// Extension probe order.
    pub extensions: Vec<String>,
    /// Built-in preference. `None` means "prefer, but warn when it matters".
    pub prefer_builtins: Option<bool>,
    /// Confinement root; resolutions escaping it become external.
    pub jail: Option<PathBuf>,
    /// Allow-list of package ids. `None` resolves everything.
    pub only: Option<Vec<OnlySpec>>,
    /// Package ids always resolved against the project root's tree.
    pub dedupe: Vec<String>,
    /// Accept only files that contain ES-module syntax.
    pub modules_only: bool,
    /// Directory-search knobs.
    pub search: SearchOptions,
}

impl ResolverOptions {
    /// Options with defaults, rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(ToString::to_string).collect(),
            browser: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            prefer_builtins: None,
            jail: None,
            only: None,
            dedupe: Vec::new(),
            modules_only: false,
            search: SearchOptions::default(),
        }
    }

    #[must_use]
    pub fn with_main_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.main_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_browser(mut self, browser: bool) -> Self {
        self.browser = browser;
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, exts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_prefer_builtins(mut self, prefer: bool) -> Self {
        self.prefer_builtins = Some(prefer);
        self
    }

    #[must_use]
    pub fn with_jail(mut self, jail: impl Into<PathBuf>) -> Self {
        self.jail = Some(jail.into());
        self
    }

    #[must_use]
    pub fn with_only(mut self, only: Vec<OnlySpec>) -> Self {
        self.only = Some(only);
        self
    }

    #[must_use]
    pub fn with_dedupe(mut self, dedupe: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dedupe = dedupe.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_modules_only(mut self, modules_only: bool) -> Self {
        self.modules_only = modules_only;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }

    /// Field order actually used: browser mode prepends the browser field.
    #[must_use]
    pub fn effective_main_fields(&self) -> Vec<String> {
        let mut fields = self.main_fields.clone();
        if self.browser && !fields.iter().any(|f| f == BROWSER_FIELD) {
            fields.insert(0, BROWSER_FIELD.to_string());
        }
        fields
    }

    /// Validate invariants that per-resolution code relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_fields.is_empty() {
            return Err(ConfigError::EmptyMainFields);
        }
        for ext in &self.extensions {
            if !ext.starts_with('.') {
                return Err(ConfigError::ExtensionMissingDot(ext.clone()));
            }
        }
        Ok(())
    }
}
