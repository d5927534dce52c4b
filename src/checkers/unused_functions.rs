//! Built-in unused-function checker (spec §4.3's first-class checker).
//!
//! Grounded in `original_source/lib/checkunusedfunctions.h`/`.cpp`:
//! `mFunctions` (declaration -> usage flags), `mFunctionDecl` (ordered
//! declaration list), `mFunctionCalls` (call-site name set), `merge`, and
//! `check`'s exclusion of library entry points and C++ operator functions.
//! This checker's findings only ever come out of [`Checker::whole_program`]
//! — usage can only be known once every translation unit's calls have been
//! seen, which is why `run` is a no-op and all the work happens in
//! `file_info`/`whole_program`.

use super::{Checker, FileInfo};
use crate::config::Settings;
use crate::sink::FindingSink;
use crate::token_view::TokenView;
use crate::types::{Finding, Location, Severity};
use std::any::Any;
use std::collections::{HashMap, HashSet};

/// Mirrors `CheckUnusedFunctions::FunctionDecl`.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub function_name: String,
    pub file_name: String,
    pub file_index: u32,
    pub line_number: i32,
}

/// Mirrors `CheckUnusedFunctions::FunctionUsage`.
#[derive(Debug, Clone, Default)]
struct FunctionUsage {
    file_name: String,
    file_index: u32,
    line_number: i32,
    used_same_file: bool,
    used_other_file: bool,
}

/// Strips `<...>` template-parameter lists from a name so instantiations of
/// the same template match one declaration, per spec §4.3.
fn strip_template_parameters(name: &str) -> &str {
    match name.find('<') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

fn is_library_entry_point(name: &str) -> bool {
    matches!(name, "main" | "WinMain" | "DllMain")
}

fn is_cpp_operator_function(name: &str) -> bool {
    name.starts_with("operator")
}

pub struct UnusedFunctionsFileInfo {
    pub declarations: Vec<FunctionDecl>,
    pub calls: HashSet<String>,
}

impl FileInfo for UnusedFunctionsFileInfo {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        for d in &self.declarations {
            out.push_str(&format!(
                "<functiondecl name=\"{}\" file=\"{}\" fileIndex=\"{}\" line=\"{}\"/>\n",
                d.function_name, d.file_name, d.file_index, d.line_number
            ));
        }
        for c in &self.calls {
            out.push_str(&format!("<functioncall name=\"{}\"/>\n", c));
        }
        out
    }
}

/// Parses the XML fragment emitted by [`UnusedFunctionsFileInfo::serialize`]
/// back into declarations and calls, matching the cross-TU fallback path
/// from spec §4.8 that reads `<functiondecl>`/`<functioncall>` directly.
pub fn parse_blob(blob: &str) -> UnusedFunctionsFileInfo {
    let mut declarations = Vec::new();
    let mut calls = HashSet::new();
    for line in blob.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("<functiondecl ") {
            let attrs = attr_map(rest.trim_end_matches("/>"));
            declarations.push(FunctionDecl {
                function_name: attrs.get("name").cloned().unwrap_or_default(),
                file_name: attrs.get("file").cloned().unwrap_or_default(),
                file_index: attrs.get("fileIndex").and_then(|v| v.parse().ok()).unwrap_or(0),
                line_number: attrs.get("line").and_then(|v| v.parse().ok()).unwrap_or(-1),
            });
        } else if let Some(rest) = line.strip_prefix("<functioncall ") {
            let attrs = attr_map(rest.trim_end_matches("/>"));
            if let Some(name) = attrs.get("name") {
                calls.insert(name.clone());
            }
        }
    }
    UnusedFunctionsFileInfo { declarations, calls }
}

fn attr_map(s: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for part in s.split_whitespace() {
        if let Some((k, v)) = part.split_once('=') {
            out.insert(k.to_string(), v.trim_matches('"').to_string());
        }
    }
    out
}

#[derive(Default)]
pub struct UnusedFunctionsChecker;

impl Checker for UnusedFunctionsChecker {
    fn name(&self) -> &'static str {
        "unusedFunctions"
    }

    fn run(&self, _tokens: &TokenView, _settings: &Settings, _sink: &mut FindingSink) {
        // Usage can only be decided once every TU's call sites are known;
        // see the module doc comment.
    }

    fn file_info(&self, tokens: &TokenView, _settings: &Settings, _cfg: &str) -> Option<Box<dyn FileInfo>> {
        let declarations: Vec<FunctionDecl> = tokens
            .functions()
            .iter()
            .filter(|f| {
                !f.is_attribute_unused
                    && !f.is_attribute_constructor_or_destructor
                    && !f.is_exported
            })
            .map(|f| FunctionDecl {
                function_name: strip_template_parameters(&f.name).to_string(),
                file_name: tokens.file_name.clone(),
                file_index: f.file_index,
                line_number: f.declaration_line,
            })
            .collect();
        let calls: HashSet<String> = tokens
            .call_sites()
            .iter()
            .map(|c| strip_template_parameters(c).to_string())
            .collect();
        if declarations.is_empty() && calls.is_empty() {
            return None;
        }
        Some(Box::new(UnusedFunctionsFileInfo { declarations, calls }))
    }

    fn parse_file_info(&self, blob: &str) -> Option<Box<dyn FileInfo>> {
        Some(Box::new(parse_blob(blob)))
    }

    fn whole_program(&self, infos: &[Box<dyn FileInfo>], _settings: &Settings, sink: &mut FindingSink) {
        let mut table: HashMap<String, FunctionUsage> = HashMap::new();
        let mut declared_order: Vec<String> = Vec::new();
        let mut all_calls: HashSet<String> = HashSet::new();

        for info in infos {
            let Some(file_info) = info.as_any().downcast_ref::<UnusedFunctionsFileInfo>() else {
                continue;
            };
            for decl in &file_info.declarations {
                table.entry(decl.function_name.clone()).or_insert_with(|| {
                    declared_order.push(decl.function_name.clone());
                    FunctionUsage {
                        file_name: decl.file_name.clone(),
                        file_index: decl.file_index,
                        line_number: decl.line_number,
                        used_same_file: false,
                        used_other_file: false,
                    }
                });
            }
            all_calls.extend(file_info.calls.iter().cloned());
        }

        // merge(): a call counts as same-file usage if it appears in the
        // same per-file blob as the declaration, other-file otherwise. With
        // only the merged call-name set available here (cross-TU fallback
        // path, spec §4.8) we conservatively mark any call as "used", since
        // the XML fallback intentionally trades same/other-file precision
        // for availability when in-memory FileInfo isn't present.
        for name in all_calls {
            if let Some(usage) = table.get_mut(&name) {
                usage.used_other_file = true;
            }
        }

        for name in &declared_order {
            let usage = &table[name];
            if usage.used_other_file || usage.used_same_file {
                continue;
            }
            if is_library_entry_point(name) || is_cpp_operator_function(name) {
                continue;
            }
            unused_function_finding(sink, &usage.file_name, usage.file_index, usage.line_number, name);
        }
    }
}

fn unused_function_finding(sink: &mut FindingSink, file_name: &str, file_index: u32, line: i32, func_name: &str) {
    let location = Location::new(file_name, line, 0).with_file_index(file_index);
    sink.report(
        Finding::new(
            "unusedFunction",
            Severity::Style,
            format!("The function '{func_name}' is never used."),
        )
        .at(location)
        .with_symbol(func_name),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_view::FunctionSymbol;

    fn make_view(file: &str, decls: &[&str], calls: &[&str]) -> TokenView {
        let mut view = TokenView::new(file, 0, "");
        for (i, name) in decls.iter().enumerate() {
            view.push_function(FunctionSymbol {
                name: name.to_string(),
                file_index: 0,
                declaration_line: (i + 1) as i32,
                is_static: false,
                is_operator: false,
                is_attribute_unused: false,
                is_attribute_constructor_or_destructor: false,
                is_template_instantiation: false,
                is_exported: false,
            });
        }
        for call in calls {
            view.push_call_site(*call);
        }
        view
    }

    #[test]
    fn strips_template_parameters_for_matching() {
        assert_eq!(strip_template_parameters("foo<int>"), "foo");
        assert_eq!(strip_template_parameters("bar"), "bar");
    }

    #[test]
    fn unused_function_across_two_files_reports_only_the_unused_one() {
        let checker = UnusedFunctionsChecker::default();
        let settings = Settings::default();

        let view_a = make_view("a.cpp", &["foo"], &[]);
        let view_b = make_view("b.cpp", &["bar"], &["bar"]);

        let info_a = checker.file_info(&view_a, &settings, "").unwrap();
        let info_b = checker.file_info(&view_b, &settings, "").unwrap();

        let mut sink = FindingSink::new_standalone(Settings::default());
        checker.whole_program(&[info_a, info_b], &settings, &mut sink);

        let findings = sink.delivered();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "unusedFunction");
        assert_eq!(findings[0].primary_file(), "a.cpp");
    }

    #[test]
    fn library_entry_points_are_excluded() {
        let checker = UnusedFunctionsChecker::default();
        let settings = Settings::default();
        let view = make_view("a.cpp", &["main"], &[]);
        let info = checker.file_info(&view, &settings, "").unwrap();
        let mut sink = FindingSink::new_standalone(Settings::default());
        checker.whole_program(&[info], &settings, &mut sink);
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn blob_round_trips() {
        let info = UnusedFunctionsFileInfo {
            declarations: vec![FunctionDecl {
                function_name: "foo".into(),
                file_name: "a.cpp".into(),
                file_index: 0,
                line_number: 3,
            }],
            calls: HashSet::from(["bar".to_string()]),
        };
        let blob = info.serialize();
        let parsed = parse_blob(&blob);
        assert_eq!(parsed.declarations.len(), 1);
        assert_eq!(parsed.declarations[0].function_name, "foo");
        assert!(parsed.calls.contains("bar"));
    }
}
