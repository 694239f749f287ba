//! ES-module syntax detection.
//!
//! Lightweight heuristic used by the modules-only policy: a file counts as an
//! ES module when it contains an `import` or `export` keyword outside of
//! comments and string literals. No full parse.

/// Whether the source contains ES-module syntax.
#[must_use]
pub fn has_module_syntax(source: &str) -> bool {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        // Skip single-line comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Skip block comments
        if i + 1 < len && chars[i] == '/' && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        // Skip string literals
        if chars[i] == '"' || chars[i] == '\'' || chars[i] == '`' {
            let quote = chars[i];
            i += 1;
            while i < len && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < len {
                    i += 2;
                    continue;
                }
                i += 1;
            }
            i += 1;
            continue;
        }

        if matches_keyword(&chars, i, "import") || matches_keyword(&chars, i, "export") {
            return true;
        }

        i += 1;
    }

    false
}

/// Check if chars at position match a keyword (with word boundary).
///
/// A preceding `.` disqualifies the match so property accesses like
/// `module.export` do not count.
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let kw: Vec<char> = keyword.chars().collect();
    let len = kw.len();

    if pos + len > chars.len() {
        return false;
    }

    if pos > 0 && (is_ident_char(chars[pos - 1]) || chars[pos - 1] == '.') {
        return false;
    }

    for (j, &c) in kw.iter().enumerate() {
        if chars[pos + j] != c {
            return false;
        }
    }

    if pos + len < chars.len() && is_ident_char(chars[pos + len]) {
        return false;
    }

    true
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
