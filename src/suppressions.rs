//! Suppression Store (component B): parses inline and external suppression
//! rules, matches them against findings, and tracks which were ever
//! exercised.
//!
//! Three source forms feed one in-memory table: the line-oriented list
//! file, the XML list file, and inline source comments. Matching follows
//! the tri-state algorithm below, which is why `checked`/`matched` live on
//! the `Suppression` itself rather than being derived after the fact.

use crate::error::{AnalysisError, Result};
use crate::glob::glob_match;
use crate::path_utils::to_portable;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// The five suppression scopes from spec §3.1. `Unique` is a single-line
/// suppression (optionally `this_and_next_line`); `Block`/`BlockBegin`/
/// `BlockEnd` bracket a line range; `File` silences an id everywhere in one
/// file; `Macro` silences findings whose primary location expanded from a
/// named macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuppressionType {
    Unique,
    Block,
    BlockBegin,
    BlockEnd,
    File,
    Macro,
}

/// One suppression record, per spec §3.1. `checked`/`matched` are mutated in
/// place as findings are evaluated against it (§5: guarded by the store's
/// mutex, not by interior mutability on the struct itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suppression {
    #[serde(default)]
    pub error_id_glob: String,
    #[serde(default)]
    pub file_name_glob: String,
    #[serde(default = "default_line")]
    pub line: i32,
    #[serde(default = "default_line")]
    pub line_begin: i32,
    #[serde(default = "default_line")]
    pub line_end: i32,
    #[serde(default)]
    pub symbol_glob: String,
    #[serde(default)]
    pub hash: u64,
    #[serde(rename = "type", default = "default_type")]
    pub suppression_type: SuppressionType,
    #[serde(default)]
    pub macro_name: String,
    #[serde(default)]
    pub this_and_next_line: bool,
    #[serde(default)]
    pub is_inline: bool,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub extra_comment: String,
}

fn default_line() -> i32 {
    -1
}

fn default_type() -> SuppressionType {
    SuppressionType::Unique
}

impl Default for Suppression {
    fn default() -> Self {
        Suppression {
            error_id_glob: String::new(),
            file_name_glob: String::new(),
            line: -1,
            line_begin: -1,
            line_end: -1,
            symbol_glob: String::new(),
            hash: 0,
            suppression_type: SuppressionType::Unique,
            macro_name: String::new(),
            this_and_next_line: false,
            is_inline: false,
            checked: false,
            matched: false,
            extra_comment: String::new(),
        }
    }
}

impl Suppression {
    pub fn for_error_id(error_id_glob: impl Into<String>) -> Self {
        Suppression {
            error_id_glob: error_id_glob.into(),
            ..Default::default()
        }
    }

}

/// Read-only view of a finding, as handed to the suppression matcher. The
/// Finding Sink (`src/sink.rs`) builds this once per finding (spec §4.7
/// step 4).
pub struct SuppressionQuery<'a> {
    pub error_id: &'a str,
    pub file_name: &'a str,
    pub line: i32,
    pub hash: u64,
    pub symbols: Vec<&'a str>,
    pub macro_names: &'a [String],
}

/// Outcome of matching one suppression against one finding, per spec §4.2
/// step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A selector failed before the filter stage; the suppression is
    /// untouched.
    None,
    /// The selector matched but the id/symbol/hash filter failed.
    Checked,
    /// Every filter passed; the finding is suppressed.
    Matched,
}

fn matches_one(s: &mut Suppression, q: &SuppressionQuery<'_>) -> MatchOutcome {
    if s.suppression_type == SuppressionType::Macro {
        if !q.macro_names.iter().any(|m| m == &s.macro_name) {
            return MatchOutcome::None;
        }
    } else {
        if s.line >= 0 && s.suppression_type == SuppressionType::Unique {
            let expected = if s.this_and_next_line {
                q.line == s.line || q.line == s.line + 1
            } else {
                q.line == s.line
            };
            if !expected {
                return MatchOutcome::None;
            }
        }
        if !s.file_name_glob.is_empty() {
            let normalized_file = to_portable(q.file_name);
            if !glob_match(&s.file_name_glob, &normalized_file) {
                return MatchOutcome::None;
            }
        }
        if matches!(
            s.suppression_type,
            SuppressionType::Block | SuppressionType::BlockBegin | SuppressionType::BlockEnd
        ) && !(s.line_begin <= q.line && q.line <= s.line_end)
        {
            return MatchOutcome::None;
        }
    }

    let mut filters_ok = true;
    if s.hash != 0 && s.hash != q.hash {
        filters_ok = false;
    }
    if filters_ok && !s.error_id_glob.is_empty() && !glob_match(&s.error_id_glob, q.error_id) {
        filters_ok = false;
    }
    if filters_ok
        && !s.symbol_glob.is_empty()
        && !q.symbols.iter().any(|sym| glob_match(&s.symbol_glob, sym))
    {
        filters_ok = false;
    }

    s.checked = true;
    if filters_ok {
        s.matched = true;
        MatchOutcome::Matched
    } else {
        MatchOutcome::Checked
    }
}

/// Process-wide suppression table. Interior mutability is confined to a
/// single mutex (spec §5): readers and the rare mutation both go through
/// `is_suppressed`, matching the original's "a single mutex serializes
/// mutation" rule rather than per-field atomics.
#[derive(Default)]
pub struct SuppressionStore {
    inner: Mutex<Vec<Suppression>>,
}

impl SuppressionStore {
    pub fn new() -> Self {
        SuppressionStore {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn from_suppressions(items: Vec<Suppression>) -> Self {
        SuppressionStore {
            inner: Mutex::new(items),
        }
    }

    pub fn add(&self, suppression: Suppression) {
        self.inner.lock().unwrap().push(suppression);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `is_suppressed(finding, global_scope)` per spec §4.2: `global_scope`
    /// restricts matching to non-inline suppressions when true, allowing the
    /// sink to separate "would this have been suppressed by a global rule"
    /// from full suppression including inline comments.
    pub fn is_suppressed(&self, query: &SuppressionQuery<'_>, global_scope: bool) -> bool {
        let mut items = self.inner.lock().unwrap();
        let mut suppressed = false;
        for s in items.iter_mut() {
            if global_scope && s.is_inline {
                continue;
            }
            if matches_one(s, query) == MatchOutcome::Matched {
                suppressed = true;
            }
        }
        suppressed
    }

    /// Matching restricted to suppressions whose `error_id_glob ==
    /// "unmatchedSuppression"`, per spec §4.2's closing rule.
    pub fn is_suppressed_unmatched_suppression_finding(&self, query: &SuppressionQuery<'_>) -> bool {
        let mut items = self.inner.lock().unwrap();
        items
            .iter_mut()
            .filter(|s| s.error_id_glob == "unmatchedSuppression")
            .any(|s| matches_one(s, query) == MatchOutcome::Matched)
    }

    /// Suppressions that were `checked` but never `matched`, scoped to
    /// `file` (inline and file-scoped suppressions), per spec §4.2.
    pub fn get_unmatched_local(&self, file: &str) -> Vec<Suppression> {
        let normalized = to_portable(file);
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                s.checked
                    && !s.matched
                    && (s.is_inline || s.suppression_type == SuppressionType::File)
                    && (s.file_name_glob.is_empty() || glob_match(&s.file_name_glob, &normalized))
            })
            .cloned()
            .collect()
    }

    /// Suppressions that were `checked` but never `matched`, excluding
    /// inline/file-scoped ones (spec §4.2).
    pub fn get_unmatched_global(&self) -> Vec<Suppression> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.checked && !s.matched && !s.is_inline && s.suppression_type != SuppressionType::File)
            .cloned()
            .collect()
    }

    /// Same as [`Self::get_unmatched_local`] but restricted to `is_inline`.
    pub fn get_unmatched_inline(&self, file: &str) -> Vec<Suppression> {
        self.get_unmatched_local(file)
            .into_iter()
            .filter(|s| s.is_inline)
            .collect()
    }

    /// Resolves Open Question 1 (`SPEC_FULL.md` §0 Design Notes): a
    /// suppression becomes `checked` once its selected line was observed
    /// during analysis of `file`, independent of whether any finding landed
    /// there. Called once per file at the end of the File Analyzer's pass
    /// (spec §4.4 step 6), with `reached_lines` the set of lines the token
    /// view actually produced tokens for.
    pub fn mark_unmatched_inline_suppressions_as_checked(&self, file: &str, reached_lines: &[i32]) {
        let normalized = to_portable(file);
        let mut items = self.inner.lock().unwrap();
        for s in items.iter_mut() {
            if !s.is_inline || s.checked {
                continue;
            }
            if !s.file_name_glob.is_empty() && !glob_match(&s.file_name_glob, &normalized) {
                continue;
            }
            let reached = match s.suppression_type {
                SuppressionType::Unique => reached_lines.iter().any(|&l| {
                    l == s.line || (s.this_and_next_line && l == s.line + 1)
                }),
                SuppressionType::Block | SuppressionType::BlockBegin | SuppressionType::BlockEnd => {
                    reached_lines.iter().any(|&l| l >= s.line_begin && l <= s.line_end)
                }
                SuppressionType::File | SuppressionType::Macro => !reached_lines.is_empty(),
            };
            if reached {
                s.checked = true;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Suppression> {
        self.inner.lock().unwrap().clone()
    }
}

/// ID characters per spec §4.2 validation: `[A-Za-z0-9_.*-]`, must not
/// begin with a digit (`*` is allowed as the first character, matching
/// cppcheck's bare-`*` wildcard id).
pub fn is_valid_error_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    let mut chars = id.chars();
    let first = chars.next().unwrap();
    if first.is_ascii_digit() {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '*')
}

/// Parses one line of a suppression list file: `errorId[:file[:line]]` with
/// `#`/`//` trailing comments, per spec §6.
pub fn parse_line(raw: &str) -> std::result::Result<Option<Suppression>, String> {
    let line = strip_comment(raw).trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&str> = line.splitn(3, ':').collect();
    let error_id = parts[0].trim();
    if !is_valid_error_id(error_id) {
        return Err(format!("invalid error id '{error_id}'"));
    }
    let mut suppression = Suppression::for_error_id(error_id);
    if let Some(file) = parts.get(1) {
        suppression.file_name_glob = to_portable(file.trim());
    }
    if let Some(line_str) = parts.get(2) {
        let line_str = line_str.trim();
        suppression.line = line_str
            .parse()
            .map_err(|_| format!("invalid line number '{line_str}'"))?;
        suppression.suppression_type = SuppressionType::Unique;
    }
    Ok(Some(suppression))
}

fn strip_comment(line: &str) -> &str {
    if let Some(pos) = line.find('#') {
        return &line[..pos];
    }
    if let Some(pos) = line.find("//") {
        return &line[..pos];
    }
    line
}

/// Parses a full line-form suppression list file.
pub fn parse_file(text: &str) -> std::result::Result<Vec<Suppression>, String> {
    let mut out = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        match parse_line(raw) {
            Ok(Some(s)) => out.push(s),
            Ok(None) => {}
            Err(e) => return Err(format!("line {}: {e}", lineno + 1)),
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct XmlSuppressions {
    #[serde(rename = "suppress", default)]
    suppress: Vec<XmlSuppress>,
}

#[derive(Debug, Deserialize)]
struct XmlSuppress {
    id: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
    #[serde(rename = "lineNumber")]
    line_number: Option<i32>,
    #[serde(rename = "symbolName")]
    symbol_name: Option<String>,
    hash: Option<u64>,
}

/// Parses the XML suppression form from spec §6. Unlike the sidecar parser,
/// this is strict (Design Notes §9): any unknown structure is an error.
pub fn parse_xml(text: &str) -> Result<Vec<Suppression>> {
    let parsed: XmlSuppressions =
        quick_xml::de::from_str(text).map_err(|e| AnalysisError::Xml(e.to_string()))?;
    Ok(parsed
        .suppress
        .into_iter()
        .map(|x| Suppression {
            error_id_glob: x.id.unwrap_or_default(),
            file_name_glob: x.file_name.map(|f| to_portable(&f)).unwrap_or_default(),
            line: x.line_number.unwrap_or(-1),
            symbol_glob: x.symbol_name.unwrap_or_default(),
            hash: x.hash.unwrap_or(0),
            ..Default::default()
        })
        .collect())
}

/// Parses a single inline `cppcheck-suppress`-family comment, per spec §6.
/// Supports both the single form (`cppcheck-suppress ID [symbolName=X]`) and
/// the bracketed multi-id form (`cppcheck-suppress[ID1, ID2 symbolName=X]`).
/// Returns an error string rather than panicking when an id is malformed,
/// matching the original's "never exceptions" contract.
pub fn parse_inline_comment(comment: &str, line: i32) -> std::result::Result<Vec<Suppression>, String> {
    let trimmed = comment.trim().trim_start_matches('/').trim();
    let rest = trimmed
        .strip_prefix("cppcheck-suppress")
        .ok_or_else(|| "not a suppression comment".to_string())?;

    let (kind, body) = classify_rest(rest);

    let suppression_type = match kind {
        SuppressCommentKind::Plain => SuppressionType::Unique,
        SuppressCommentKind::Begin => SuppressionType::BlockBegin,
        SuppressCommentKind::End => SuppressionType::BlockEnd,
        SuppressCommentKind::File => SuppressionType::File,
        SuppressCommentKind::Macro => SuppressionType::Macro,
    };

    let body = body.trim();
    if let Some(bracket_body) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        return parse_bracketed_ids(bracket_body, suppression_type, line);
    }

    let mut tokens = body.split_whitespace();
    let error_id = tokens
        .next()
        .ok_or_else(|| "missing error id in suppression comment".to_string())?;
    if !is_valid_error_id(error_id) {
        return Err(format!("invalid error id '{error_id}'"));
    }
    let mut suppression = Suppression::for_error_id(error_id);
    suppression.is_inline = true;
    suppression.line = line;
    if suppression_type == SuppressionType::BlockBegin || suppression_type == SuppressionType::BlockEnd {
        suppression.line_begin = line;
        suppression.line_end = line;
    }
    suppression.suppression_type = suppression_type;

    for attr in tokens {
        if let Some(value) = attr.strip_prefix("symbolName=") {
            suppression.symbol_glob = value.to_string();
        } else if suppression_type == SuppressionType::Macro {
            suppression.macro_name = attr.to_string();
        }
    }
    if suppression_type == SuppressionType::Macro && suppression.macro_name.is_empty() {
        suppression.macro_name = error_id.to_string();
        suppression.error_id_glob = "*".to_string();
    }
    Ok(vec![suppression])
}

fn parse_bracketed_ids(
    body: &str,
    suppression_type: SuppressionType,
    line: i32,
) -> std::result::Result<Vec<Suppression>, String> {
    let mut out = Vec::new();
    for entry in body.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut tokens = entry.split_whitespace();
        let error_id = tokens
            .next()
            .ok_or_else(|| "empty suppression entry".to_string())?;
        if !is_valid_error_id(error_id) {
            return Err(format!("invalid error id '{error_id}'"));
        }
        let mut suppression = Suppression::for_error_id(error_id);
        suppression.is_inline = true;
        suppression.line = line;
        suppression.suppression_type = suppression_type;
        for attr in tokens {
            if let Some(value) = attr.strip_prefix("symbolName=") {
                suppression.symbol_glob = value.to_string();
            }
        }
        out.push(suppression);
    }
    if out.is_empty() {
        return Err("bracketed suppression comment has no entries".to_string());
    }
    Ok(out)
}

enum SuppressCommentKind {
    Plain,
    Begin,
    End,
    File,
    Macro,
}

fn classify_rest(rest: &str) -> (SuppressCommentKind, &str) {
    if let Some(b) = rest.strip_prefix("-begin") {
        (SuppressCommentKind::Begin, b)
    } else if let Some(b) = rest.strip_prefix("-end") {
        (SuppressCommentKind::End, b)
    } else if let Some(b) = rest.strip_prefix("-file") {
        (SuppressCommentKind::File, b)
    } else if let Some(b) = rest.strip_prefix("-macro") {
        (SuppressCommentKind::Macro, b)
    } else {
        (SuppressCommentKind::Plain, rest)
    }
}

/// Loads every suppression file configured in `Settings` (line-form `.txt`,
/// XML-form `.xml`) into one store.
pub fn load_configured(paths: &[std::path::PathBuf]) -> Result<SuppressionStore> {
    let mut items = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(AnalysisError::Io)?;
        if path.extension().and_then(|e| e.to_str()) == Some("xml") {
            items.extend(parse_xml(&text)?);
        } else {
            items.extend(parse_file(&text).map_err(AnalysisError::Suppression)?);
        }
    }
    Ok(SuppressionStore::from_suppressions(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query<'a>(error_id: &'a str, file: &'a str, line: i32) -> SuppressionQuery<'a> {
        SuppressionQuery {
            error_id,
            file_name: file,
            line,
            hash: 0,
            symbols: Vec::new(),
            macro_names: &[],
        }
    }

    #[test]
    fn parses_bare_line_form() {
        let s = parse_line("nullPointer").unwrap().unwrap();
        assert_eq!(s.error_id_glob, "nullPointer");
        assert_eq!(s.line, -1);
    }

    #[test]
    fn parses_full_line_form_with_comment() {
        let s = parse_line("nullPointer:src/foo.cpp:10 // known issue")
            .unwrap()
            .unwrap();
        assert_eq!(s.error_id_glob, "nullPointer");
        assert_eq!(s.file_name_glob, "src/foo.cpp");
        assert_eq!(s.line, 10);
    }

    #[test]
    fn rejects_digit_leading_id() {
        assert!(parse_line("1bad").is_err());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("# just a comment").unwrap().is_none());
    }

    #[test]
    fn matches_by_line_and_id() {
        let store = SuppressionStore::new();
        store.add(Suppression {
            line: 10,
            ..Suppression::for_error_id("nullPointer")
        });
        assert!(store.is_suppressed(&query("nullPointer", "foo.cpp", 10), false));
        assert!(!store.is_suppressed(&query("nullPointer", "foo.cpp", 11), false));
    }

    #[test]
    fn unmatched_filter_sets_checked_without_matched() {
        let store = SuppressionStore::new();
        store.add(Suppression::for_error_id("nullPointer"));
        assert!(!store.is_suppressed(&query("otherId", "foo.cpp", 5), false));
        let unmatched = store.get_unmatched_global();
        assert_eq!(unmatched.len(), 1);
    }

    #[test]
    fn matched_suppression_is_not_unmatched() {
        let store = SuppressionStore::new();
        store.add(Suppression::for_error_id("nullPointer"));
        assert!(store.is_suppressed(&query("nullPointer", "foo.cpp", 5), false));
        assert!(store.get_unmatched_global().is_empty());
    }

    #[test]
    fn inline_plain_comment_parses() {
        let result = parse_inline_comment("cppcheck-suppress nullPointer", 3).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].error_id_glob, "nullPointer");
        assert!(result[0].is_inline);
        assert_eq!(result[0].line, 3);
    }

    #[test]
    fn inline_comment_with_symbol_name() {
        let result = parse_inline_comment("cppcheck-suppress nullPointer symbolName=p", 3).unwrap();
        assert_eq!(result[0].symbol_glob, "p");
    }

    #[test]
    fn inline_bracketed_multi_id_form() {
        let result = parse_inline_comment("cppcheck-suppress[nullPointer, uninitvar symbolName=p]", 5).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].error_id_glob, "nullPointer");
        assert_eq!(result[1].error_id_glob, "uninitvar");
        assert_eq!(result[1].symbol_glob, "p");
    }

    #[test]
    fn inline_begin_end_forms_set_block_type() {
        let begin = parse_inline_comment("cppcheck-suppress-begin nullPointer", 10).unwrap();
        assert_eq!(begin[0].suppression_type, SuppressionType::BlockBegin);
        let end = parse_inline_comment("cppcheck-suppress-end nullPointer", 20).unwrap();
        assert_eq!(end[0].suppression_type, SuppressionType::BlockEnd);
    }

    #[test]
    fn non_suppression_comment_is_rejected() {
        assert!(parse_inline_comment("just a normal comment", 1).is_err());
    }

    #[test]
    fn reached_line_marks_checked_per_open_question_one() {
        let store = SuppressionStore::new();
        let mut s = Suppression::for_error_id("nullPointer");
        s.is_inline = true;
        s.line = 7;
        store.add(s);
        store.mark_unmatched_inline_suppressions_as_checked("foo.cpp", &[5, 6, 7, 8]);
        let unmatched = store.get_unmatched_inline("foo.cpp");
        assert_eq!(unmatched.len(), 1);
        assert!(unmatched[0].checked);
        assert!(!unmatched[0].matched);
    }

    #[test]
    fn unreached_line_is_not_marked_checked() {
        let store = SuppressionStore::new();
        let mut s = Suppression::for_error_id("nullPointer");
        s.is_inline = true;
        s.line = 100;
        store.add(s);
        store.mark_unmatched_inline_suppressions_as_checked("foo.cpp", &[5, 6, 7]);
        assert!(store.get_unmatched_inline("foo.cpp").is_empty());
    }

    #[test]
    fn xml_form_parses() {
        let xml = r#"<suppressions><suppress><id>nullPointer</id><fileName>foo.cpp</fileName><lineNumber>3</lineNumber></suppress></suppressions>"#;
        let items = parse_xml(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].error_id_glob, "nullPointer");
        assert_eq!(items[0].line, 3);
    }

    #[test]
    fn glob_file_name_matches_via_shared_glob_module() {
        let store = SuppressionStore::new();
        store.add(Suppression {
            file_name_glob: "src/**/*.cpp".to_string(),
            ..Suppression::for_error_id("nullPointer")
        });
        assert!(store.is_suppressed(&query("nullPointer", "src/a/b/foo.cpp", -1), false));
        assert!(!store.is_suppressed(&query("nullPointer", "other/foo.cpp", -1), false));
    }
}
