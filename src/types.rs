//! Canonical data model for the analysis pipeline.
//!
//! Every checker reports into a [`Finding`], and every output format serializes
//! from it. Once a [`Location`] is attached to a finding it is immutable; the
//! file analyzer resolves token/arena references into `{file_index, line,
//! column}` triples before the arena backing a pass is dropped (see
//! [`crate::token_view`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used throughout the pipeline for "no line number available".
pub const NO_LINE: i32 = -1;

/// A single point (or span-anchor) in a source file.
///
/// `file_name` is always forward-slash normalized; `orig_file_name` preserves
/// the pre-normalization form used when re-reading source text for templates
/// like `{code}`. Locations are created once, by the checker that reports
/// them, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_index: u32,
    pub file_name: String,
    pub orig_file_name: String,
    /// Negative means "no line", per [`NO_LINE`].
    pub line: i32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub info: String,
}

impl Location {
    pub fn new(file_name: impl Into<String>, line: i32, column: u32) -> Self {
        let file_name = file_name.into();
        let normalized = crate::path_utils::to_portable(&file_name);
        Location {
            file_index: 0,
            orig_file_name: file_name,
            file_name: normalized,
            line,
            column,
            info: String::new(),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_file_index(mut self, idx: u32) -> Self {
        self.file_index = idx;
        self
    }

    /// `[file:line]` form used by the default (template-less) text renderer.
    pub fn stringify(&self) -> String {
        format!("[{}:{}]", self.file_name, self.line)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Severity taxonomy. Ordering matters for textual rendering but not for
/// suppression matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Style,
    Performance,
    Portability,
    Information,
    Debug,
    Internal,
    None,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Style => "style",
            Severity::Performance => "performance",
            Severity::Portability => "portability",
            Severity::Information => "information",
            Severity::Debug => "debug",
            Severity::Internal => "internal",
            Severity::None => "none",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "style" => Ok(Severity::Style),
            "performance" => Ok(Severity::Performance),
            "portability" => Ok(Severity::Portability),
            "information" => Ok(Severity::Information),
            "debug" => Ok(Severity::Debug),
            "internal" => Ok(Severity::Internal),
            "none" => Ok(Severity::None),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Whether a finding is a certain defect or an inconclusive guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Normal,
    Inconclusive,
}

impl Default for Certainty {
    fn default() -> Self {
        Certainty::Normal
    }
}

/// A single diagnostic: one rule fired at one primary location with an
/// optional call stack.
///
/// Invariants (enforced by [`Finding::new`] / the sink, not by the type
/// system alone):
/// - either `call_stack` is non-empty or `file0` is non-empty;
/// - `call_stack.last()` (if present) is the innermost/primary location;
/// - `short_message` never ends with a newline;
/// - `id` is non-empty unless `severity` is `Internal` or `Debug`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub certainty: Certainty,
    /// CWE identifier, 0 if not applicable.
    pub cwe: u16,
    /// Ordered call stack; index 0 is outermost, `.last()` is innermost/primary.
    pub call_stack: Vec<Location>,
    pub short_message: String,
    pub verbose_message: String,
    /// Newline-separated list of symbol names this finding concerns.
    #[serde(default)]
    pub symbol_names: String,
    /// Primary source file, used when `call_stack` is empty (e.g. `file0`-only
    /// findings such as `noValidConfiguration`).
    #[serde(default)]
    pub file0: String,
    #[serde(default)]
    pub remark: String,
    /// Stable across runs with identical inputs; 0 when hashing is disabled.
    #[serde(default)]
    pub hash: u64,
}

impl Finding {
    pub fn new(id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        let message = message.into();
        debug_assert!(!message.ends_with('\n'));
        Finding {
            id: id.into(),
            severity,
            certainty: Certainty::Normal,
            cwe: 0,
            call_stack: Vec::new(),
            short_message: message.clone(),
            verbose_message: message,
            symbol_names: String::new(),
            file0: String::new(),
            remark: String::new(),
            hash: 0,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.call_stack.push(location);
        self
    }

    pub fn with_call_stack(mut self, stack: Vec<Location>) -> Self {
        self.call_stack = stack;
        self
    }

    pub fn with_cwe(mut self, cwe: u16) -> Self {
        self.cwe = cwe;
        self
    }

    pub fn inconclusive(mut self) -> Self {
        self.certainty = Certainty::Inconclusive;
        self
    }

    pub fn with_verbose(mut self, verbose: impl Into<String>) -> Self {
        self.verbose_message = verbose.into();
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        if self.symbol_names.is_empty() {
            self.symbol_names = symbol;
        } else {
            self.symbol_names.push('\n');
            self.symbol_names.push_str(&symbol);
        }
        self
    }

    pub fn with_file0(mut self, file0: impl Into<String>) -> Self {
        self.file0 = file0.into();
        self
    }

    /// The primary (innermost) location, if any.
    pub fn primary_location(&self) -> Option<&Location> {
        self.call_stack.last()
    }

    /// The primary file, preferring the call stack over `file0`.
    pub fn primary_file(&self) -> &str {
        self.primary_location()
            .map(|l| l.file_name.as_str())
            .unwrap_or(&self.file0)
    }

    /// The primary line, or [`NO_LINE`] when there is no call stack.
    pub fn primary_line(&self) -> i32 {
        self.primary_location().map(|l| l.line).unwrap_or(NO_LINE)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbol_names.split('\n').filter(|s| !s.is_empty())
    }

    /// Invariant 1 of the data model (§3.3): either a call stack or `file0`.
    pub fn is_well_formed(&self) -> bool {
        !self.call_stack.is_empty() || !self.file0.is_empty()
    }
}
