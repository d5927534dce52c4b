//! Path normalization shared by the suppression matcher, the result cache and
//! the analyzer-info store.
//!
//! Grounded in `Path::fromNativeSeparators`/`Path::simplifyPath` and
//! `cache.cpp`'s `Normalize`: backslashes become forward slashes and doubled
//! separators collapse, but `.`/`..` segments are left alone (callers that
//! need a canonical filesystem path call [`std::fs::canonicalize`] instead).

/// Converts native path separators to `/` and collapses `//` into `/`,
/// matching cppcheck's `CacheFile::Normalize`.
pub fn to_portable(path: &str) -> String {
    let slashed: String = path
        .chars()
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();
    let mut out = String::with_capacity(slashed.len());
    let mut prev_slash = false;
    for c in slashed.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Base file name without directory components or extension, used to derive
/// the `stem.aN` disambiguation key for `files.txt` (see
/// [`crate::analyzer_info`]).
pub fn stem(path: &str) -> String {
    let portable = to_portable(path);
    let base = portable.rsplit('/').next().unwrap_or(&portable);
    match base.rfind('.') {
        Some(pos) if pos > 0 => base[..pos].to_string(),
        _ => base.to_string(),
    }
}

/// File name without directory components, extension included.
pub fn basename(path: &str) -> String {
    let portable = to_portable(path);
    portable.rsplit('/').next().unwrap_or(&portable).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes() {
        assert_eq!(to_portable(r"a\b\c.cpp"), "a/b/c.cpp");
    }

    #[test]
    fn collapses_double_slashes() {
        assert_eq!(to_portable("a//b///c.cpp"), "a/b/c.cpp");
    }

    #[test]
    fn stem_strips_dir_and_extension() {
        assert_eq!(stem("src/foo/bar.cpp"), "bar");
        assert_eq!(stem("bar.test.cpp"), "bar.test");
        assert_eq!(stem(".hidden"), ".hidden");
    }

    #[test]
    fn basename_keeps_extension() {
        assert_eq!(basename("src/foo/bar.cpp"), "bar.cpp");
    }
}
