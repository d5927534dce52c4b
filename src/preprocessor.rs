//! Preprocessor Adapter (component C): wraps the external tokenizer/
//! preprocessor, enumerates macro configurations, and computes the content
//! fingerprint that gates both the Result Cache (G) and the Analyzer-Info
//! sidecar (F).
//!
//! The actual C/C++ lexer/preprocessor is an external collaborator (spec
//! §1); this module defines the trait boundary the rest of the pipeline
//! depends on and a pass-through default for already-preprocessed input.

use crate::error::{AnalysisError, Result};
use crate::suppressions::Suppression;
use sha3::{Digest, Sha3_256};
use std::collections::BTreeSet;

/// One `#ifdef`-resolved configuration, a semicolon-joined list of
/// `NAME=value` pairs (spec §4.1). The empty string is the "no macros
/// defined" base configuration.
pub type ConfigString = String;

#[derive(Debug, Clone)]
pub struct RawToken {
    pub text: String,
    pub line: i32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub struct Directive {
    pub line: i32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RemarkComment {
    pub file: String,
    pub line: i32,
    pub text: String,
}

/// Everything the File Analyzer needs out of a loaded, not-yet-configured
/// translation unit.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub file_name: String,
    pub raw_tokens: Vec<RawToken>,
    pub directives: Vec<Directive>,
    pub source_text: String,
}

/// The adapter trait (spec §4.1). A production build wires this to the real
/// preprocessor; tests and the default pipeline use [`PassthroughPreprocessor`]
/// for input that needs no macro expansion.
pub trait Preprocessor {
    fn load(&self, file_name: &str, source_text: &str) -> Result<TranslationUnit>;

    /// Deterministic: iteration order of `#ifdef` branches is fixed. When
    /// `forced_config` is set, returns exactly that one configuration
    /// (spec §4.1).
    fn enumerate_configs(
        &self,
        unit: &TranslationUnit,
        forced_config: Option<&str>,
    ) -> Vec<ConfigString>;

    /// Resolves conditional compilation for `config`.
    fn preprocess(&self, unit: &TranslationUnit, config: &str) -> Result<Vec<RawToken>>;

    fn extract_remark_comments(&self, unit: &TranslationUnit) -> Vec<RemarkComment>;

    fn extract_inline_suppressions(&self, unit: &TranslationUnit) -> Vec<(Suppression, Option<String>)>;
}

/// Fingerprint covering raw tokens, enabled severities, user defines, addon
/// names/args, and the suppressions relevant to this file (spec §4.1).
/// Two runs over identical inputs MUST produce identical fingerprints; this
/// is what gates both the sidecar (F) and, indirectly, dedup across runs.
pub struct FingerprintInputs<'a> {
    pub raw_tokens: &'a [RawToken],
    pub enabled_severities: &'a [crate::types::Severity],
    pub defines: &'a std::collections::BTreeMap<String, String>,
    pub addon_names: &'a [String],
    pub relevant_suppressions: &'a [String],
    pub tool_info: &'a str,
}

pub fn fingerprint(inputs: &FingerprintInputs<'_>) -> u64 {
    let mut hasher = Sha3_256::new();
    for tok in inputs.raw_tokens {
        hasher.update(tok.text.as_bytes());
        hasher.update(b"\0");
    }
    let severities: BTreeSet<&str> = inputs.enabled_severities.iter().map(|s| s.as_str()).collect();
    for s in severities {
        hasher.update(s.as_bytes());
    }
    for (k, v) in inputs.defines {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    for addon in inputs.addon_names {
        hasher.update(addon.as_bytes());
    }
    for s in inputs.relevant_suppressions {
        hasher.update(s.as_bytes());
    }
    hasher.update(inputs.tool_info.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// A structural hash of a resolved token list, used by [`crate::file_analyzer`]
/// to detect configurations that simplify to the same token stream (spec
/// §4.1 dedup policy, §4.4 step 4's `purgedConfiguration`).
pub fn structural_hash(tokens: &[RawToken]) -> u64 {
    let mut hasher = Sha3_256::new();
    for tok in tokens {
        hasher.update(tok.text.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// A preprocessor for input that is already free of conditional
/// compilation: `enumerate_configs` always returns a single empty
/// configuration (or the forced one), and `preprocess` is the identity.
pub struct PassthroughPreprocessor;

impl Preprocessor for PassthroughPreprocessor {
    fn load(&self, file_name: &str, source_text: &str) -> Result<TranslationUnit> {
        let mut raw_tokens = Vec::new();
        let mut directives = Vec::new();
        for (idx, line) in source_text.lines().enumerate() {
            let line_no = (idx + 1) as i32;
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                directives.push(Directive {
                    line: line_no,
                    text: trimmed.to_string(),
                });
                continue;
            }
            for (col, word) in line.split_whitespace().enumerate() {
                raw_tokens.push(RawToken {
                    text: word.to_string(),
                    line: line_no,
                    column: (col + 1) as u32,
                });
            }
        }
        Ok(TranslationUnit {
            file_name: file_name.to_string(),
            raw_tokens,
            directives,
            source_text: source_text.to_string(),
        })
    }

    fn enumerate_configs(
        &self,
        _unit: &TranslationUnit,
        forced_config: Option<&str>,
    ) -> Vec<ConfigString> {
        vec![forced_config.unwrap_or("").to_string()]
    }

    fn preprocess(&self, unit: &TranslationUnit, _config: &str) -> Result<Vec<RawToken>> {
        if unit.raw_tokens.is_empty() && !unit.source_text.trim().is_empty() {
            return Err(AnalysisError::Preprocessor {
                file: unit.file_name.clone(),
                message: "no tokens produced from non-empty source".to_string(),
            });
        }
        Ok(unit.raw_tokens.clone())
    }

    fn extract_remark_comments(&self, unit: &TranslationUnit) -> Vec<RemarkComment> {
        let mut out = Vec::new();
        for (idx, line) in unit.source_text.lines().enumerate() {
            if let Some(pos) = line.find("cppcheck-remark") {
                let text = line[pos + "cppcheck-remark".len()..].trim().to_string();
                out.push(RemarkComment {
                    file: unit.file_name.clone(),
                    line: (idx + 1) as i32,
                    text,
                });
            }
        }
        out
    }

    fn extract_inline_suppressions(&self, unit: &TranslationUnit) -> Vec<(Suppression, Option<String>)> {
        use crate::suppressions::SuppressionType;

        let mut out = Vec::new();
        // `-begin`/`-end` markers bracket a range rather than standing
        // alone, so a begin comment is held here (keyed by error id) until
        // its matching end comment closes the range (spec §3.1, §6).
        let mut open_blocks: std::collections::HashMap<String, (Suppression, i32)> = std::collections::HashMap::new();

        for (idx, line) in unit.source_text.lines().enumerate() {
            let Some(pos) = line.find("cppcheck-suppress") else { continue };
            let comment_marker = line[..pos].rfind("//").unwrap_or(0);
            let code_before_comment = line[..comment_marker].trim();
            let this_line = (idx + 1) as i32;
            let standalone = code_before_comment.is_empty();
            // A plain `// cppcheck-suppress ID` comment on a line of its
            // own silences the *next* line of code, matching cppcheck's
            // convention (spec §8 scenario 2); one trailing a statement on
            // the same line silences that statement's own line.
            let next_line_target = if standalone { this_line + 1 } else { this_line };
            let comment = line[pos..].trim_end();

            match crate::suppressions::parse_inline_comment(comment, this_line) {
                Ok(suppressions) => {
                    for mut s in suppressions {
                        match s.suppression_type {
                            SuppressionType::BlockBegin => {
                                // The block covers the code starting right
                                // after this marker.
                                open_blocks.insert(s.error_id_glob.clone(), (s, next_line_target));
                            }
                            SuppressionType::BlockEnd => {
                                if let Some((mut begun, begin_line)) = open_blocks.remove(&s.error_id_glob) {
                                    // The block covers the code up to (but
                                    // not including) a standalone end marker.
                                    let end_line = if standalone { this_line - 1 } else { this_line };
                                    begun.suppression_type = SuppressionType::Block;
                                    begun.line_begin = begin_line;
                                    begun.line_end = end_line;
                                    out.push((begun, None));
                                } else {
                                    out.push((
                                        Suppression::default(),
                                        Some(format!(
                                            "cppcheck-suppress-end '{}' has no matching -begin",
                                            s.error_id_glob
                                        )),
                                    ));
                                }
                            }
                            SuppressionType::Unique => {
                                s.line = next_line_target;
                                out.push((s, None));
                            }
                            _ => out.push((s, None)),
                        }
                    }
                }
                Err(e) => out.push((Suppression::default(), Some(e))),
            }
        }
        for (id, _) in open_blocks {
            out.push((
                Suppression::default(),
                Some(format!("cppcheck-suppress-begin '{id}' has no matching -end")),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_loads_tokens_and_directives() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "#include <a>\nint x = 1;").unwrap();
        assert_eq!(unit.directives.len(), 1);
        assert!(!unit.raw_tokens.is_empty());
    }

    #[test]
    fn enumerate_configs_respects_forced_config() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "int x;").unwrap();
        assert_eq!(pp.enumerate_configs(&unit, Some("DEBUG")), vec!["DEBUG"]);
        assert_eq!(pp.enumerate_configs(&unit, None), vec![""]);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "int x;").unwrap();
        let tokens = pp.preprocess(&unit, "").unwrap();
        let inputs = FingerprintInputs {
            raw_tokens: &tokens,
            enabled_severities: &[crate::types::Severity::Error],
            defines: &Default::default(),
            addon_names: &[],
            relevant_suppressions: &[],
            tool_info: "v1",
        };
        assert_eq!(fingerprint(&inputs), fingerprint(&inputs));
    }

    #[test]
    fn remark_comments_extracted() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "int x; // cppcheck-remark reviewed").unwrap();
        let remarks = pp.extract_remark_comments(&unit);
        assert_eq!(remarks.len(), 1);
        assert_eq!(remarks[0].text, "reviewed");
    }

    #[test]
    fn inline_suppressions_extracted() {
        let pp = PassthroughPreprocessor;
        let unit = pp
            .load("f.cpp", "int *p = 0;\n// cppcheck-suppress nullPointer\n*p = 1;")
            .unwrap();
        let suppressions = pp.extract_inline_suppressions(&unit);
        assert_eq!(suppressions.len(), 1);
        assert!(suppressions[0].1.is_none());
    }

    #[test]
    fn standalone_inline_suppression_targets_the_next_line() {
        let pp = PassthroughPreprocessor;
        let unit = pp
            .load("f.cpp", "int *p = 0;\n// cppcheck-suppress nullPointer\n*p = 1;")
            .unwrap();
        let suppressions = pp.extract_inline_suppressions(&unit);
        assert_eq!(suppressions[0].0.line, 3);
    }

    #[test]
    fn trailing_inline_suppression_targets_its_own_line() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "*p = 1; // cppcheck-suppress nullPointer\n").unwrap();
        let suppressions = pp.extract_inline_suppressions(&unit);
        assert_eq!(suppressions[0].0.line, 1);
    }

    #[test]
    fn begin_end_markers_pair_into_one_block_suppression() {
        use crate::suppressions::SuppressionType;
        let pp = PassthroughPreprocessor;
        let unit = pp
            .load(
                "f.cpp",
                "// cppcheck-suppress-begin nullPointer\nint *p = 0;\n*p = 1;\n// cppcheck-suppress-end nullPointer\n",
            )
            .unwrap();
        let suppressions = pp.extract_inline_suppressions(&unit);
        assert_eq!(suppressions.len(), 1);
        let (s, err) = &suppressions[0];
        assert!(err.is_none());
        assert_eq!(s.suppression_type, SuppressionType::Block);
        assert_eq!(s.line_begin, 2);
        assert_eq!(s.line_end, 3);
    }

    #[test]
    fn unmatched_begin_marker_reports_an_error() {
        let pp = PassthroughPreprocessor;
        let unit = pp.load("f.cpp", "// cppcheck-suppress-begin nullPointer\nint x;\n").unwrap();
        let suppressions = pp.extract_inline_suppressions(&unit);
        assert_eq!(suppressions.len(), 1);
        assert!(suppressions[0].1.is_some());
    }
}
