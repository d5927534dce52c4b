//! File Analyzer (component H): orchestrates one source file end to end —
//! sidecar/cache short-circuiting, configuration enumeration, per-config
//! checker dispatch, and sidecar/suppression bookkeeping (spec §4.4).

use crate::analyzer_info::{self, SidecarWriter};
use crate::cache::ResultCache;
use crate::checkers::FileInfo;
use crate::context::AnalyzerContext;
use crate::error::{AnalysisError, Result};
use crate::preprocessor::{FingerprintInputs, RawToken};
use crate::sink::FindingSink;
use crate::token_view::{FunctionSymbol, Token, TokenKind, TokenView};
use crate::types::{Finding, Severity};
use regex::Regex;
use std::sync::Mutex;

/// Findings + per-checker summaries produced for one file, handed to the
/// Whole-Program Joiner (I) when running in single-job/in-memory mode.
pub struct FileAnalysisOutput {
    pub file_infos: Vec<(&'static str, Box<dyn FileInfo>)>,
}

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "catch"];

/// Best-effort function declaration/call-site extraction over raw source
/// text. The real token/symbol database is an external collaborator (spec
/// §1, component D "consumed, not built, by the core"); this heuristic
/// exists only so the unused-function checker (the one first-class checker
/// in this spec's budget) has something to run against end to end.
fn extract_symbols(source_text: &str, file_index: u32) -> (Vec<FunctionSymbol>, Vec<String>) {
    let decl_re = Regex::new(r"(?m)^\s*(static\s+)?(?:[\w:<>\*&,\s]+?)\b(\w+)\s*\([^;{}]*\)\s*\{").unwrap();
    let call_re = Regex::new(r"\b(\w+)\s*\(").unwrap();

    let mut functions = Vec::new();
    let mut declaration_name_starts = std::collections::HashSet::new();
    for caps in decl_re.captures_iter(source_text) {
        let is_static = caps.get(1).is_some();
        let name_match = caps.get(2).unwrap();
        let name = name_match.as_str().to_string();
        if CONTROL_KEYWORDS.contains(&name.as_str()) {
            continue;
        }
        let line = (source_text[..caps.get(0).unwrap().start()].matches('\n').count() + 1) as i32;
        declaration_name_starts.insert(name_match.start());
        functions.push(FunctionSymbol {
            name,
            file_index,
            declaration_line: line,
            is_static,
            is_operator: false,
            is_attribute_unused: false,
            is_attribute_constructor_or_destructor: false,
            is_template_instantiation: false,
            is_exported: false,
        });
    }

    let mut calls = Vec::new();
    for caps in call_re.captures_iter(source_text) {
        let name_match = caps.get(1).unwrap();
        // Skip the occurrence that is the declaration's own name (e.g. `foo`
        // in `static void foo(){}`) so a function isn't counted as calling
        // itself just by being declared.
        if declaration_name_starts.contains(&name_match.start()) {
            continue;
        }
        let name = name_match.as_str().to_string();
        if CONTROL_KEYWORDS.contains(&name.as_str()) {
            continue;
        }
        calls.push(name);
    }
    (functions, calls)
}

fn build_token_view(
    file_name: &str,
    file_index: u32,
    config: &str,
    raw_tokens: &[RawToken],
    source_text: &str,
) -> TokenView {
    let mut view = TokenView::new(file_name, file_index, config);
    for tok in raw_tokens {
        view.push_token(Token {
            text: tok.text.clone(),
            kind: TokenKind::Other,
            file_index,
            line: tok.line,
            column: tok.column,
            macro_name: None,
        });
    }
    let (functions, calls) = extract_symbols(source_text, file_index);
    for f in functions {
        view.push_function(f);
    }
    for c in calls {
        view.push_call_site(c);
    }
    view
}

/// `analyze(file) -> exit_code`, per spec §4.4.
#[tracing::instrument(skip(ctx, sink, source_text))]
pub fn analyze(
    ctx: &AnalyzerContext,
    file_name: &str,
    file_index: u32,
    source_text: &str,
    sink: &mut FindingSink,
) -> Result<FileAnalysisOutput> {
    let unit = match ctx.preprocessor.load(file_name, source_text) {
        Ok(unit) => unit,
        Err(_) => {
            sink.report(
                Finding::new("syntaxError", Severity::Error, format!("could not parse {file_name}"))
                    .with_file0(file_name.to_string()),
            );
            return Ok(FileAnalysisOutput { file_infos: Vec::new() });
        }
    };

    // Inline suppression comments and remark comments are properties of the
    // raw source text, independent of any one configuration, so they are
    // extracted once per file right after load (spec §4.1). Suppressions
    // register into the process-wide store immediately so that every
    // config's checker findings below can already be matched against them;
    // a malformed comment is reported but does not stop the rest of the
    // file from being scanned (spec §4.1).
    for (mut suppression, err) in ctx.preprocessor.extract_inline_suppressions(&unit) {
        match err {
            Some(message) => {
                sink.report(
                    Finding::new("suppressionCommentError", Severity::Error, message)
                        .with_file0(file_name.to_string()),
                );
            }
            None => {
                // Scope the suppression to the file it was written in: an
                // inline comment's line number is otherwise only unique
                // within its own source file.
                suppression.file_name_glob = crate::path_utils::to_portable(file_name);
                ctx.suppressions.add(suppression);
            }
        }
    }
    let remarks = ctx
        .preprocessor
        .extract_remark_comments(&unit)
        .into_iter()
        .map(|r| crate::sink::Remark {
            file: crate::path_utils::to_portable(&r.file),
            line: r.line,
            text: r.text,
        })
        .collect();
    sink.add_remarks(remarks);

    // Step 1: sidecar short-circuit, gated on the fingerprint of the initial
    // load (before any config-specific preprocessing).
    let gate_config = ctx.settings.force_config.clone().unwrap_or_default();
    let fp_inputs = FingerprintInputs {
        raw_tokens: &unit.raw_tokens,
        enabled_severities: &ctx.settings.enabled_severities,
        defines: &ctx.settings.defines,
        addon_names: &[],
        relevant_suppressions: &[],
        tool_info: "ccaudit-v1",
    };
    let fingerprint = crate::preprocessor::fingerprint(&fp_inputs);

    if let Some(build_dir) = &ctx.settings.build_dir {
        let sidecar_path = analyzer_info::analyzer_info_path(build_dir, file_name, &gate_config);
        if let Some(record) = analyzer_info::try_load(&sidecar_path, fingerprint) {
            for finding in record.findings {
                sink.report(finding);
            }
            tracing::debug!(file = file_name, "sidecar hit, skipping checkers");
            return Ok(FileAnalysisOutput { file_infos: Vec::new() });
        }
    }

    let configs = ctx
        .preprocessor
        .enumerate_configs(&unit, ctx.settings.force_config.as_deref());

    let (configs, capped) = if ctx.settings.force_config.is_none() && configs.len() > ctx.settings.max_configs {
        (configs[..ctx.settings.max_configs].to_vec(), true)
    } else {
        (configs, false)
    };
    if capped {
        sink.report(
            Finding::new(
                "toomanyconfigs",
                Severity::Information,
                format!("Too many #ifdef configurations - cap is {}", ctx.settings.max_configs),
            )
            .with_file0(file_name.to_string()),
        );
    }

    let mut seen_structural_hashes = std::collections::HashSet::new();
    let mut any_config_succeeded = false;
    let mut failing_configs: Vec<(String, String)> = Vec::new();
    let mut file_infos: Vec<(&'static str, Box<dyn FileInfo>)> = Vec::new();

    for cfg in &configs {
        let tokens = match ctx.preprocessor.preprocess(&unit, cfg) {
            Ok(tokens) => tokens,
            Err(AnalysisError::Preprocessor { message, .. }) => {
                failing_configs.push((cfg.clone(), message));
                continue;
            }
            Err(other) => return Err(other),
        };

        let structural_hash = crate::preprocessor::structural_hash(&tokens);
        if !seen_structural_hashes.insert(structural_hash) {
            sink.report(
                Finding::new(
                    "purgedConfiguration",
                    Severity::Debug,
                    format!("configuration '{cfg}' is equivalent to one already analyzed"),
                )
                .with_file0(file_name.to_string()),
            );
            continue;
        }

        any_config_succeeded = true;

        let code = render_source_for_config(&unit.source_text, &tokens);
        let mut cache_hit = false;
        if let Some(cache) = ctx.cache.as_ref() {
            let guard = cache.lock();
            if let Some(cached) = guard.lookup(file_name, cfg, &code) {
                for finding in cached {
                    sink.report(finding);
                }
                cache_hit = true;
            }
        }
        if cache_hit {
            continue;
        }

        let view = build_token_view(file_name, file_index, cfg, &tokens, &unit.source_text);
        let mut local_sink = crate::sink::FindingSink::new_standalone(ctx.settings.clone());
        ctx.registry.run_all(&view, &ctx.settings, &mut local_sink);

        for f in local_sink.delivered() {
            sink.report(f.clone());
        }

        if let Some(cache) = ctx.cache.as_ref() {
            if ctx.settings.cache_dir.is_some() {
                let mut guard = cache.lock();
                guard.cache(file_name, cfg, &code, local_sink.delivered().to_vec());
            }
        }

        if let Some(build_dir) = &ctx.settings.build_dir {
            let sidecar_path = match ctx.files_txt.as_ref() {
                Some(allocator) => allocator.allocate(build_dir, file_name, cfg)?,
                None => analyzer_info::analyzer_info_path(build_dir, file_name, cfg),
            };
            let mut writer = SidecarWriter::open(sidecar_path, fingerprint)?;
            for f in local_sink.delivered() {
                writer.write_finding(f)?;
            }
            for checker in ctx.registry.iter() {
                if let Some(info) = checker.file_info(&view, &ctx.settings, cfg) {
                    writer.write_file_info(checker.name(), &info.serialize())?;
                }
            }
            writer.close()?;
        } else {
            for checker in ctx.registry.iter() {
                if let Some(info) = checker.file_info(&view, &ctx.settings, cfg) {
                    file_infos.push((checker.name(), info));
                }
            }
        }

        ctx.suppressions
            .mark_unmatched_inline_suppressions_as_checked(file_name, &view.reached_lines(file_index));
    }

    if !any_config_succeeded && configs.len() >= 2 {
        let detail = failing_configs
            .iter()
            .map(|(cfg, msg)| format!("{cfg}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        sink.report(
            Finding::new(
                "noValidConfiguration",
                Severity::Information,
                format!("No configuration could be analyzed: {detail}"),
            )
            .with_file0(file_name.to_string()),
        );
    } else if !any_config_succeeded {
        if let Some((cfg, msg)) = failing_configs.last() {
            sink.report(
                Finding::new("preprocessorErrorDirective", Severity::Error, msg.clone())
                    .with_file0(format!("{file_name} [{cfg}]")),
            );
        }
    }

    // Spec §4.2's closing rule / §8 scenario 3: an inline suppression that
    // was reached (step 6 above marked it `checked`) but never matched any
    // finding is itself reported, unless a suppression targeting
    // `unmatchedSuppression` silences it.
    for unmatched in ctx.suppressions.get_unmatched_local(file_name) {
        let query = crate::suppressions::SuppressionQuery {
            error_id: "unmatchedSuppression",
            file_name,
            line: unmatched.line,
            hash: 0,
            symbols: Vec::new(),
            macro_names: &[],
        };
        if ctx.suppressions.is_suppressed_unmatched_suppression_finding(&query) {
            continue;
        }
        sink.report(
            Finding::new(
                "unmatchedSuppression",
                Severity::Information,
                format!("Unmatched suppression: {}", unmatched.error_id_glob),
            )
            .at(crate::types::Location::new(file_name, unmatched.line, 0)),
        );
    }

    Ok(FileAnalysisOutput { file_infos })
}

/// Best-effort reconstruction of "the code that was actually analyzed" for
/// this config, used as the Result Cache's hash input (spec §4.5). Since
/// this crate does not carry a real preprocessor, the resolved token
/// stream's text stands in for "preprocessor-expanded source".
fn render_source_for_config(_original: &str, tokens: &[RawToken]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Thread-safe handle to the Result Cache shared across workers (spec §5:
/// "single-threaded build/save; workers only read via `report_cached`").
pub struct SharedCache {
    inner: Mutex<ResultCacheHandle>,
}

struct ResultCacheHandle {
    cache: ResultCache,
    path_hint: Option<std::path::PathBuf>,
}

impl SharedCache {
    pub fn new(cache: ResultCache) -> Self {
        SharedCache {
            inner: Mutex::new(ResultCacheHandle { cache, path_hint: None }),
        }
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, ResultCacheHandle> {
        self.inner.lock().unwrap()
    }
}

impl ResultCacheHandle {
    pub fn lookup(&self, path: &str, cfg: &str, code: &str) -> Option<Vec<Finding>> {
        self.cache.lookup(path, cfg, code).map(|f| f.to_vec())
    }

    pub fn cache(&mut self, path: &str, cfg: &str, code: &str, reports: Vec<Finding>) {
        self.cache.cache(path, cfg, code, reports);
    }

    pub fn set_path_hint(&mut self, path: std::path::PathBuf) {
        self.path_hint = Some(path);
    }

    pub fn save(&self) -> Result<()> {
        self.cache.save(self.path_hint.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalyzerContext;

    #[test]
    fn well_formed_file_analyzes_without_a_syntax_error() {
        let ctx = AnalyzerContext::new_default();
        let mut sink = FindingSink::new_standalone(ctx.settings.clone());
        analyze(&ctx, "f.cpp", 0, "int x;", &mut sink).unwrap();
        assert!(sink.delivered().iter().all(|f| f.id != "syntaxError"));
    }

    #[test]
    fn unmatched_inline_suppression_is_reported() {
        let ctx = AnalyzerContext::new_default();
        let mut sink = FindingSink::new_standalone(ctx.settings.clone());
        let source = "// cppcheck-suppress nullPointer\nint x;\n";
        analyze(&ctx, "f.cpp", 0, source, &mut sink).unwrap();
        let unmatched: Vec<_> = sink
            .delivered()
            .iter()
            .filter(|f| f.id == "unmatchedSuppression")
            .collect();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].primary_line(), 2);
    }

    #[test]
    fn malformed_inline_suppression_comment_is_reported_without_aborting_the_file() {
        let ctx = AnalyzerContext::new_default();
        let mut sink = FindingSink::new_standalone(ctx.settings.clone());
        let source = "// cppcheck-suppress 1bad\nint x;\n";
        analyze(&ctx, "f.cpp", 0, source, &mut sink).unwrap();
        assert!(sink.delivered().iter().any(|f| f.id == "suppressionCommentError"));
    }

    #[test]
    fn declaring_a_function_does_not_count_as_calling_itself() {
        let (_functions, calls) = extract_symbols("static void foo(){}\n", 0);
        assert!(!calls.contains(&"foo".to_string()));
    }

    #[test]
    fn extracts_static_function_declaration_and_call_site() {
        let (functions, calls) = extract_symbols("static void foo(){}\nvoid main(){foo();}", 0);
        assert!(functions.iter().any(|f| f.name == "foo" && f.is_static));
        assert!(calls.contains(&"foo".to_string()));
    }

    #[test]
    fn config_cap_emits_single_information_finding() {
        struct ManyConfigsPreprocessor;
        impl crate::preprocessor::Preprocessor for ManyConfigsPreprocessor {
            fn load(&self, file_name: &str, source_text: &str) -> Result<crate::preprocessor::TranslationUnit> {
                crate::preprocessor::PassthroughPreprocessor.load(file_name, source_text)
            }
            fn enumerate_configs(
                &self,
                _unit: &crate::preprocessor::TranslationUnit,
                forced: Option<&str>,
            ) -> Vec<String> {
                if forced.is_some() {
                    return vec![forced.unwrap().to_string()];
                }
                (0..20).map(|i| format!("CFG{i}")).collect()
            }
            fn preprocess(&self, unit: &crate::preprocessor::TranslationUnit, _cfg: &str) -> Result<Vec<RawToken>> {
                Ok(unit.raw_tokens.clone())
            }
            fn extract_remark_comments(&self, _unit: &crate::preprocessor::TranslationUnit) -> Vec<crate::preprocessor::RemarkComment> {
                Vec::new()
            }
            fn extract_inline_suppressions(
                &self,
                _unit: &crate::preprocessor::TranslationUnit,
            ) -> Vec<(crate::suppressions::Suppression, Option<String>)> {
                Vec::new()
            }
        }

        let mut ctx = AnalyzerContext::new_default();
        ctx.preprocessor = Box::new(ManyConfigsPreprocessor);
        ctx.settings.max_configs = 3;
        let mut sink = FindingSink::new_standalone(ctx.settings.clone());
        analyze(&ctx, "f.cpp", 0, "int x;", &mut sink).unwrap();
        let too_many: Vec<_> = sink.delivered().iter().filter(|f| f.id == "toomanyconfigs").collect();
        assert_eq!(too_many.len(), 1);
    }

    /// Spec §4.5's "cache hit implies replay" property, exercised the way a
    /// real second invocation of the process would see it: a brand new
    /// `AnalyzerContext` pointed at the same `cache_dir` must load the
    /// sibling context's saved `cache.xml` and skip every checker entirely
    /// on the repeat run (spec §8 end-to-end scenario 4).
    #[test]
    fn a_fresh_context_loads_the_persisted_cache_and_skips_checkers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingChecker(std::sync::Arc<AtomicUsize>);
        impl crate::checkers::Checker for CountingChecker {
            fn name(&self) -> &'static str {
                "counting"
            }
            fn run(&self, _tokens: &TokenView, _settings: &crate::config::Settings, _sink: &mut FindingSink) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let mut settings = crate::config::Settings::default();
        settings.cache_dir = Some(tmp.path().to_path_buf());
        let counter = std::sync::Arc::new(AtomicUsize::new(0));

        let mut registry = crate::checkers::CheckerRegistry::empty();
        registry.register(Box::new(CountingChecker(counter.clone())));
        let ctx = AnalyzerContext::new(settings.clone(), registry, crate::suppressions::SuppressionStore::new());
        let mut sink = FindingSink::new_standalone(ctx.settings.clone());
        analyze(&ctx, "f.cpp", 0, "int x;", &mut sink).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        ctx.cache.as_ref().unwrap().lock().save().unwrap();

        // A fresh process starts here: a new context, same cache_dir, same
        // counter shared only so the test can observe it — the context
        // itself knows nothing about the first run except what it loads
        // from `cache.xml`.
        let mut registry2 = crate::checkers::CheckerRegistry::empty();
        registry2.register(Box::new(CountingChecker(counter.clone())));
        let ctx2 = AnalyzerContext::new(settings, registry2, crate::suppressions::SuppressionStore::new());
        let mut sink2 = FindingSink::new_standalone(ctx2.settings.clone());
        analyze(&ctx2, "f.cpp", 0, "int x;", &mut sink2).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1, "cache hit must not invoke run_checks again");
        assert_eq!(sink.delivered().len(), sink2.delivered().len());
    }
}
