//! The host-facing option bag.
//!
//! [`NodeResolveOptions`] mirrors the loosely-typed configuration object the
//! plugin accepts from bundler configs, camelCase keys and legacy flags
//! included. [`NodeResolveOptions::into_resolver_options`] normalizes it into
//! the validated [`ResolverOptions`] the core consumes; contradictory
//! spellings are rejected there, once, before any resolution runs.

use dalkey_core::{ConfigError, OnlySpec, ResolverOptions, SearchOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default field order the legacy booleans carve out of.
const LEGACY_FIELDS: &[&str] = &["module", "jsnext:main", "main"];

/// Options accepted from the bundler config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeResolveOptions {
    /// Manifest fields tried in order. Mutually exclusive with the legacy
    /// `module`/`jsnext`/`main` booleans.
    pub main_fields: Option<Vec<String>>,

    /// Legacy: consult the `module` field (default true).
    pub module: Option<bool>,
    /// Legacy: consult the `jsnext:main` field (default false).
    pub jsnext: Option<bool>,
    /// Legacy: consult the `main` field (default true).
    pub main: Option<bool>,

    /// Honor browser fields: entry override plus per-file maps.
    #[serde(default)]
    pub browser: bool,

    /// Extension probe order.
    pub extensions: Option<Vec<String>>,

    /// Prefer platform builtins over same-named local packages. Leaving this
    /// unset keeps the preference but warns when it shadows a local file.
    pub prefer_builtins: Option<bool>,

    /// Confinement root; resolutions escaping it are treated as external.
    pub jail: Option<PathBuf>,

    /// Allow-list of package ids: literal names, or `/regex/` patterns.
    pub only: Option<Vec<String>>,

    /// Package ids always resolved against the project root's tree.
    #[serde(default)]
    pub dedupe: Vec<String>,

    /// Accept only files that contain ES-module syntax.
    #[serde(default)]
    pub modules_only: bool,

    /// Directory-search knobs passed through to the walk.
    #[serde(default)]
    pub custom_resolve_options: CustomResolveOptions,
}

/// Directory-search passthrough bag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomResolveOptions {
    /// Directory names probed as package containers (default `node_modules`).
    pub module_directory: Option<Vec<String>>,
    /// Extra roots searched after the upward walk is exhausted.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl NodeResolveOptions {
    /// Normalize into the core's validated configuration, rooted at `root`.
    pub fn into_resolver_options(self, root: &Path) -> Result<ResolverOptions, ConfigError> {
        let main_fields = self.derive_main_fields()?;

        let mut options = ResolverOptions::new(root)
            .with_main_fields(main_fields)
            .with_browser(self.browser)
            .with_dedupe(self.dedupe)
            .with_modules_only(self.modules_only);

        if let Some(extensions) = self.extensions {
            options = options.with_extensions(extensions);
        }
        if let Some(prefer) = self.prefer_builtins {
            options = options.with_prefer_builtins(prefer);
        }
        if let Some(jail) = self.jail {
            options = options.with_jail(jail);
        }
        if let Some(only) = self.only {
            let specs = only
                .iter()
                .map(|entry| parse_only(entry))
                .collect::<Result<Vec<_>, _>>()?;
            options = options.with_only(specs);
        }

        let custom = self.custom_resolve_options;
        if custom.module_directory.is_some() || !custom.paths.is_empty() {
            let defaults = SearchOptions::default();
            options = options.with_search(SearchOptions {
                module_directories: custom
                    .module_directory
                    .unwrap_or(defaults.module_directories),
                fallback_paths: custom.paths,
            });
        }

        Ok(options)
    }

    /// Effective field order: explicit `mainFields`, or the default list
    /// filtered by the legacy booleans. Mixing both spellings is an error.
    fn derive_main_fields(&self) -> Result<Vec<String>, ConfigError> {
        let legacy_used = self.module.is_some() || self.jsnext.is_some() || self.main.is_some();
        if let Some(fields) = &self.main_fields {
            if legacy_used {
                return Err(ConfigError::MainFieldConflict);
            }
            if fields.is_empty() {
                return Err(ConfigError::EmptyMainFields);
            }
            return Ok(fields.clone());
        }

        let fields: Vec<String> = LEGACY_FIELDS
            .iter()
            .filter(|&&field| match field {
                "module" => self.module.unwrap_or(true),
                "jsnext:main" => self.jsnext.unwrap_or(false),
                _ => self.main.unwrap_or(true),
            })
            .map(ToString::to_string)
            .collect();
        if fields.is_empty() {
            // Every legacy flag switched off
            return Err(ConfigError::EmptyMainFields);
        }
        Ok(fields)
    }
}

/// Parse one `only` entry: `/.../` delimits a pattern, anything else is a
/// literal package id.
fn parse_only(entry: &str) -> Result<OnlySpec, ConfigError> {
    if let Some(source) = entry
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    {
        return OnlySpec::pattern(source);
    }
    Ok(OnlySpec::Name(entry.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> NodeResolveOptions {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_empty_bag_uses_defaults() {
        let opts = parse("{}").into_resolver_options(Path::new("/proj")).unwrap();
        assert_eq!(opts.main_fields, vec!["module", "main"]);
        assert_eq!(opts.extensions, vec![".mjs", ".js", ".json", ".node"]);
        assert!(!opts.browser);
        assert!(opts.prefer_builtins.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_legacy_booleans_shape_field_list() {
        let opts = parse(r#"{"jsnext": true}"#)
            .into_resolver_options(Path::new("/proj"))
            .unwrap();
        assert_eq!(opts.main_fields, vec!["module", "jsnext:main", "main"]);

        let opts = parse(r#"{"module": false, "jsnext": true}"#)
            .into_resolver_options(Path::new("/proj"))
            .unwrap();
        assert_eq!(opts.main_fields, vec!["jsnext:main", "main"]);
    }

    #[test]
    fn test_all_legacy_flags_off_is_config_error() {
        let result = parse(r#"{"module": false, "main": false}"#)
            .into_resolver_options(Path::new("/proj"));
        assert!(matches!(result, Err(ConfigError::EmptyMainFields)));
    }

    #[test]
    fn test_main_fields_excludes_legacy_flags() {
        let result = parse(r#"{"mainFields": ["module", "main"], "main": false}"#)
            .into_resolver_options(Path::new("/proj"));
        assert!(matches!(result, Err(ConfigError::MainFieldConflict)));
    }

    #[test]
    fn test_empty_main_fields_rejected() {
        let result = parse(r#"{"mainFields": []}"#).into_resolver_options(Path::new("/proj"));
        assert!(matches!(result, Err(ConfigError::EmptyMainFields)));
    }

    #[test]
    fn test_only_entries_parse_literals_and_patterns() {
        let opts = parse(r#"{"only": ["lodash", "/@scope\/.*/"]}"#)
            .into_resolver_options(Path::new("/proj"))
            .unwrap();
        let only = opts.only.unwrap();
        assert!(only[0].matches("lodash"));
        assert!(!only[0].matches("lodash-es"));
        assert!(only[1].matches("@scope/pkg"));
        assert!(!only[1].matches("other"));
    }

    #[test]
    fn test_bad_only_pattern_is_config_error() {
        let result = parse(r#"{"only": ["/(unclosed/"]}"#)
            .into_resolver_options(Path::new("/proj"));
        assert!(matches!(result, Err(ConfigError::InvalidOnlyPattern { .. })));
    }

    #[test]
    fn test_custom_resolve_options_merge() {
        let opts = parse(
            r#"{"customResolveOptions": {"moduleDirectory": ["web_modules"], "paths": ["/shared"]}}"#,
        )
        .into_resolver_options(Path::new("/proj"))
        .unwrap();
        assert_eq!(opts.search.module_directories, vec!["web_modules"]);
        assert_eq!(opts.search.fallback_paths, vec![PathBuf::from("/shared")]);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<NodeResolveOptions>(r#"{"mainfields": []}"#).is_err());
    }

    #[test]
    fn test_full_bag() {
        let opts = parse(
            r#"{
                "browser": true,
                "preferBuiltins": false,
                "jail": "/proj/src",
                "dedupe": ["react"],
                "modulesOnly": true,
                "extensions": [".mjs", ".js"]
            }"#,
        )
        .into_resolver_options(Path::new("/proj"))
        .unwrap();
        assert!(opts.browser);
        assert_eq!(opts.prefer_builtins, Some(false));
        assert_eq!(opts.jail, Some(PathBuf::from("/proj/src")));
        assert_eq!(opts.dedupe, vec!["react"]);
        assert!(opts.modules_only);
        assert_eq!(
            opts.effective_main_fields(),
            vec!["browser", "module", "main"]
        );
    }
}
