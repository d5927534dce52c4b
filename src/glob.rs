//! Glob matching for suppression patterns and path filters.
//!
//! Cppcheck has two separate matchers in the wild: `utils.cpp`'s `matchglob`
//! (a hand-rolled backtracking loop over `*`/`?` that does not treat `/`
//! specially) and `pathmatch.cpp`'s `PathMatch` (translates the pattern into
//! a regex, with `**` spanning directories and `*`/`?` confined to one
//! segment). The two disagree on `*` across `/`, which the suppression list
//! properties in practice never need; this module keeps a single translator
//! modeled on `PathMatch::translate` and applies it everywhere a glob is
//! needed, which satisfies the behavior the rest of the pipeline actually
//! depends on.

use regex::Regex;

/// Translates a cppcheck-style glob into an anchored regex:
/// - `**` -> matches any sequence, including `/`
/// - `*` -> matches any sequence except `/`
/// - `?` -> matches one character except `/`
/// - everything else is escaped literally
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    out.push('^');
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            c => {
                if "\\.+^$()[]{}|".contains(c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Matches `path` (forward-slash normalized by the caller) against `pattern`.
/// An empty pattern never matches.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains(['*', '?']) {
        return pattern == path;
    }
    match Regex::new(&translate(pattern)) {
        Ok(re) => re.is_match(path),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_requires_exact_match() {
        assert!(glob_match("src/foo.cpp", "src/foo.cpp"));
        assert!(!glob_match("src/foo.cpp", "src/foo.h"));
    }

    #[test]
    fn star_does_not_cross_slash() {
        assert!(glob_match("src/*.cpp", "src/foo.cpp"));
        assert!(!glob_match("src/*.cpp", "src/sub/foo.cpp"));
    }

    #[test]
    fn double_star_crosses_slash() {
        assert!(glob_match("src/**/*.cpp", "src/a/b/foo.cpp"));
        assert!(glob_match("**/foo.cpp", "a/b/foo.cpp"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(glob_match("foo?.cpp", "foo1.cpp"));
        assert!(!glob_match("foo?.cpp", "foo12.cpp"));
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert!(!glob_match("", "anything"));
    }
}
