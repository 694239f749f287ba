//! Node-style import resolution for bundlers.
//!
//! Resolves an import specifier, as written in a source file, to an absolute
//! path on disk: relative and absolute ids probe the filesystem with extension
//! fallback, bare and scoped ids walk `node_modules`-style directories and
//! select a package entry point by a configurable manifest-field order. On top
//! of the walk sit the browser-field override maps, builtin preference, jail
//! confinement and a stamp-validated resolution cache.
//!
//! The entry point is [`Resolver`]; everything it needs is configured through
//! [`ResolverOptions`] and validated once at construction.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

pub mod browser;
pub mod builtins;
pub mod cache;
pub mod error;
pub mod esm;
pub mod fs;
pub mod options;
pub mod package;
pub mod resolver;
pub mod specifier;

pub use cache::CacheStats;
pub use error::{ConfigError, ResolveError};
pub use fs::{FsProbe, ProbeStats, StampSet};
pub use options::{OnlySpec, ResolverOptions, SearchOptions};
pub use resolver::{Resolution, Resolver, TracingWarnings, WarningSink};
pub use specifier::SpecifierKind;
