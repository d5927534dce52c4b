//! Finding Sink (component J): applies suppression, deduplicates, tracks
//! exit code, renders text, and is the single point allowed to change the
//! process exit code (spec §4.7).

use crate::config::Settings;
use crate::suppressions::{SuppressionQuery, SuppressionStore};
use crate::types::{Finding, Severity};
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// IDs escalated under safety mode even when suppressed (spec §4.7 step 4).
const CRITICAL_IDS: &[&str] = &[
    "cppcheckError",
    "cppcheckLimit",
    "internalAstError",
    "instantiationError",
    "internalError",
    "premium-internalError",
    "preprocessorErrorDirective",
    "syntaxError",
    "unknownMacro",
];

/// A remark comment attached by (file,line), applied at sink step 9.
#[derive(Debug, Clone)]
pub struct Remark {
    pub file: String,
    pub line: i32,
    pub text: String,
}

/// Renders a finding per the template grammar from spec §6: `{id}`,
/// `{severity}`, `{cwe}`, `{message}`, `{callstack}`, `{file}`, `{line}`,
/// `{column}`, `{code}`, `{inconclusive:...}`. Missing call-stack fields
/// default to `nofile`/`0`, matching `ErrorMessage::toString`.
pub fn render_template(finding: &Finding, template: &str, source_line: Option<&str>) -> String {
    let loc = finding.primary_location();
    let file = loc.map(|l| l.file_name.as_str()).unwrap_or("nofile");
    let line = loc.map(|l| l.line).unwrap_or(0).max(0);
    let column = loc.map(|l| l.column).unwrap_or(0);
    let callstack = if finding.call_stack.is_empty() {
        "nofile:0".to_string()
    } else {
        finding
            .call_stack
            .iter()
            .map(|l| format!("{}:{}", l.file_name, l.line))
            .collect::<Vec<_>>()
            .join(" -> ")
    };

    let inconclusive_re = Regex::new(r"\{inconclusive:([^}]*)\}").unwrap();
    let with_inconclusive = inconclusive_re.replace_all(template, |caps: &regex::Captures| {
        if finding.certainty == crate::types::Certainty::Inconclusive {
            caps[1].to_string()
        } else {
            String::new()
        }
    });

    with_inconclusive
        .replace("{id}", &finding.id)
        .replace("{severity}", finding.severity.as_str())
        .replace("{cwe}", &finding.cwe.to_string())
        .replace("{message}", &finding.short_message)
        .replace("{callstack}", &callstack)
        .replace("{file}", file)
        .replace("{line}", &line.to_string())
        .replace("{column}", &column.to_string())
        .replace("{code}", source_line.unwrap_or(""))
}

/// One worker's local view onto the sink (spec §5: "each worker owns its
/// local dedup set"). The driver merges workers' delivered findings and
/// re-deduplicates at join time via [`FindingSink::merge_from`].
pub struct FindingSink {
    settings: Settings,
    suppressions: Arc<SuppressionStore>,
    nofail_suppressions: Option<Arc<SuppressionStore>>,
    local_dedup: HashSet<String>,
    delivered: Vec<Finding>,
    remarks: Vec<Remark>,
    exit_code: Arc<AtomicU8>,
}

impl FindingSink {
    pub fn new(settings: Settings, suppressions: Arc<SuppressionStore>, exit_code: Arc<AtomicU8>) -> Self {
        FindingSink {
            settings,
            suppressions,
            nofail_suppressions: None,
            local_dedup: HashSet::new(),
            delivered: Vec::new(),
            remarks: Vec::new(),
            exit_code,
        }
    }

    /// A sink with its own private suppression store and exit-code cell,
    /// useful for checker unit tests and any single-file ad hoc run.
    pub fn new_standalone(settings: Settings) -> Self {
        FindingSink::new(settings, Arc::new(SuppressionStore::new()), Arc::new(AtomicU8::new(0)))
    }

    pub fn with_nofail_suppressions(mut self, store: Arc<SuppressionStore>) -> Self {
        self.nofail_suppressions = Some(store);
        self
    }

    /// Appends `remarks` to the ones already known, used when a worker
    /// processes several files sequentially and each file's remark comments
    /// (spec §4.1 `extract_remark_comments`) need to stay visible for the
    /// rest of the run rather than overwriting the previous file's.
    pub fn add_remarks(&mut self, remarks: Vec<Remark>) {
        self.remarks.extend(remarks);
    }

    pub fn delivered(&self) -> &[Finding] {
        &self.delivered
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code.load(Ordering::SeqCst)
    }

    fn escalate_exit_code(&self, code: u8) {
        self.exit_code.fetch_max(code, Ordering::SeqCst);
    }

    /// `report(finding)` with an empty macro-name set (spec §4.7 step 3 is a
    /// no-op when the caller has no macro information for this location).
    pub fn report(&mut self, finding: Finding) -> bool {
        self.report_with_macros(finding, &[])
    }

    /// Full algorithm per spec §4.7.
    pub fn report_with_macros(&mut self, finding: Finding, macro_names: &[String]) -> bool {
        // Step 1: Internal findings bypass suppression entirely.
        if finding.severity == Severity::Internal {
            return self.finish_delivery(finding);
        }

        if !self.settings.is_severity_enabled(finding.severity) {
            return false;
        }

        // Steps 3-4: suppression lookup.
        let symbols: Vec<&str> = finding.symbols().collect();
        let query = SuppressionQuery {
            error_id: &finding.id,
            file_name: finding.primary_file(),
            line: finding.primary_line(),
            hash: finding.hash,
            symbols,
            macro_names,
        };

        let suppressed = self.suppressions.is_suppressed(&query, false);
        let is_critical = CRITICAL_IDS.contains(&finding.id.as_str());
        // Best-effort explicit/implicit distinction: a suppression whose
        // error id glob has no wildcard characters was written specifically
        // for this id (explicit); a bare "*" or glob pattern is an implicit,
        // broader rule. Re-report with severity flipped to Internal only in
        // the explicit case, matching spec §4.7 step 4. Resolved here, while
        // `query` still borrows `finding`, since `finding` is moved below.
        let explicit_match = suppressed && self.settings.safety && is_critical && self.matched_explicitly(&query);

        let mut finding = finding;
        if suppressed {
            if self.settings.safety && is_critical {
                self.escalate_exit_code(1);
                if explicit_match {
                    finding.severity = Severity::Internal;
                }
                // fall through to delivery
            } else {
                return false;
            }
        }

        self.finish_delivery(finding)
    }

    fn matched_explicitly(&self, query: &SuppressionQuery<'_>) -> bool {
        self.suppressions
            .snapshot()
            .iter()
            .any(|s| s.matched && s.error_id_glob == query.error_id && !s.error_id_glob.contains(['*', '?']))
    }

    fn finish_delivery(&mut self, mut finding: Finding) -> bool {
        // Step 5: render and drop empty text.
        let rendered = render_template(&finding, &self.settings.template, None);
        if rendered.trim().is_empty() {
            return false;
        }

        // Step 6: dedup on rendered text.
        if !self.settings.emit_duplicates && !self.local_dedup.insert(rendered) {
            return false;
        }

        // Step 9: attach a matching remark.
        if let Some(loc) = finding.primary_location() {
            if let Some(remark) = self
                .remarks
                .iter()
                .find(|r| r.file == loc.file_name && r.line == loc.line)
            {
                finding.remark = remark.text.clone();
            }
        }

        // Step 8: auxiliary nofail list.
        let nofail_suppressed = self.nofail_suppressions.as_ref().is_some_and(|store| {
            let symbols: Vec<&str> = finding.symbols().collect();
            let query = SuppressionQuery {
                error_id: &finding.id,
                file_name: finding.primary_file(),
                line: finding.primary_line(),
                hash: finding.hash,
                symbols,
                macro_names: &[],
            };
            store.is_suppressed(&query, false)
        });
        if !nofail_suppressed && finding.severity != Severity::Internal {
            self.escalate_exit_code(1);
        }

        self.delivered.push(finding);
        true
    }

    /// Join-time merge used by the executor (spec §5): re-deduplicates
    /// across workers on rendered text.
    pub fn merge_from(&mut self, other: FindingSink) {
        for finding in other.delivered {
            let rendered = render_template(&finding, &self.settings.template, None);
            if self.settings.emit_duplicates || self.local_dedup.insert(rendered) {
                self.delivered.push(finding);
            }
        }
    }
}
