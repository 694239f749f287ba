//! Specifier classification.
//!
//! Categorizes a raw import specifier before any filesystem work:
//! - Relative: `./`, `../` (and bare `.` / `..`)
//! - Absolute filesystem paths
//! - Scoped packages: `@scope/pkg` or `@scope/pkg/subpath`
//! - Bare packages: `pkg` or `pkg/subpath`
//!
//! Classification is pure: it depends on the specifier string alone.

/// Specifier category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    Relative,
    Absolute,
    Scoped,
    Bare,
}

/// Classify a specifier.
#[must_use]
pub fn classify(specifier: &str) -> SpecifierKind {
    if specifier.starts_with('.') {
        return SpecifierKind::Relative;
    }
    if is_absolute_path(specifier) {
        return SpecifierKind::Absolute;
    }
    if specifier.starts_with('@') {
        return SpecifierKind::Scoped;
    }
    SpecifierKind::Bare
}

/// Whether the specifier belongs to another resolution stage entirely.
///
/// Ids containing control characters (virtual-module markers like `\0`) and
/// URL-style ids are never resolved against the filesystem.
#[must_use]
pub fn is_foreign(specifier: &str) -> bool {
    if specifier.is_empty() || specifier.chars().any(char::is_control) {
        return true;
    }
    specifier.contains("://") || specifier.starts_with("data:")
}

/// Split a bare or scoped specifier into package id and subpath.
///
/// A scoped id keeps its first two segments: `@scope/pkg/sub` yields
/// `("@scope/pkg", Some("sub"))`.
#[must_use]
pub fn split_package(specifier: &str) -> (&str, Option<&str>) {
    // Scoped package: @scope/pkg or @scope/pkg/subpath
    if specifier.starts_with('@') {
        // Find second slash
        let mut slash_count = 0;
        for (i, c) in specifier.char_indices() {
            if c == '/' {
                slash_count += 1;
                if slash_count == 2 {
                    return (&specifier[..i], Some(&specifier[i + 1..]));
                }
            }
        }
        // No subpath
        return (specifier, None);
    }

    // Regular package: pkg or pkg/subpath
    if let Some(pos) = specifier.find('/') {
        (&specifier[..pos], Some(&specifier[pos + 1..]))
    } else {
        (specifier, None)
    }
}

/// Whether the string is an absolute filesystem path.
#[must_use]
pub fn is_absolute_path(spec: &str) -> bool {
    // Unix absolute
    if spec.starts_with('/') {
        return true;
    }

    // Windows absolute: C:\, D:\, etc.
    let mut chars = spec.chars();
    if let (Some(drive), Some(colon), Some(sep)) = (chars.next(), chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() && colon == ':' && (sep == '\\' || sep == '/') {
            return true;
        }
    }

    // UNC path: \\server\share
    spec.starts_with("\\\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_relative() {
        assert_eq!(classify("./foo"), SpecifierKind::Relative);
        assert_eq!(classify("../foo/bar"), SpecifierKind::Relative);
        assert_eq!(classify("."), SpecifierKind::Relative);
        assert_eq!(classify(".."), SpecifierKind::Relative);
    }

    #[test]
    fn test_classify_absolute() {
        assert_eq!(classify("/usr/lib/foo.js"), SpecifierKind::Absolute);
        assert_eq!(classify("C:\\proj\\foo.js"), SpecifierKind::Absolute);
        assert_eq!(classify("c:/proj/foo.js"), SpecifierKind::Absolute);
        assert_eq!(classify("\\\\server\\share\\foo"), SpecifierKind::Absolute);
    }

    #[test]
    fn test_classify_packages() {
        assert_eq!(classify("lodash"), SpecifierKind::Bare);
        assert_eq!(classify("lodash/fp"), SpecifierKind::Bare);
        assert_eq!(classify("@scope/pkg"), SpecifierKind::Scoped);
        assert_eq!(classify("@scope/pkg/sub/path"), SpecifierKind::Scoped);
    }

    #[test]
    fn test_split_package_bare() {
        assert_eq!(split_package("lodash"), ("lodash", None));
        assert_eq!(split_package("lodash/fp/curry"), ("lodash", Some("fp/curry")));
    }

    #[test]
    fn test_split_package_scoped() {
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(
            split_package("@scope/pkg/sub/path"),
            ("@scope/pkg", Some("sub/path"))
        );
        // Malformed but must not panic
        assert_eq!(split_package("@scope"), ("@scope", None));
    }

    #[test]
    fn test_foreign_ids() {
        assert!(is_foreign(""));
        assert!(is_foreign("\0virtual:entry"));
        assert!(is_foreign("https://cdn.example.com/mod.js"));
        assert!(is_foreign("data:text/javascript,export default 1"));
        assert!(!is_foreign("./foo"));
        assert!(!is_foreign("lodash"));
        assert!(!is_foreign("node:fs"));
    }
}
