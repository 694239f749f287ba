use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating resolver configuration.
///
/// These surface once, at construction time. A resolver that constructed
/// successfully never reports a configuration problem per resolution.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("main field list is empty; at least one manifest field is required")]
    EmptyMainFields,

    #[error("options `main_fields` and the legacy main-field flags are mutually exclusive")]
    MainFieldConflict,

    #[error("invalid `only` pattern `{pattern}`: {source}")]
    InvalidOnlyPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("extension `{0}` must start with a dot")]
    ExtensionMissingDot(String),
}

/// Errors raised while resolving a specifier.
///
/// Unresolvable specifiers are not errors (they fold to an external/null
/// outcome); these variants cover the cases that must abort the build.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing package.json in {dir} while resolving `{specifier}`")]
    ManifestMissing { dir: PathBuf, specifier: String },

    #[error("failed to parse {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ResolveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
