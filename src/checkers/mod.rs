//! Checker Registry (component E): holds checker instances and dispatches
//! them in a stable, explicit order (Design Notes §9 — no static
//! self-registration).

pub mod unused_functions;

use crate::config::Settings;
use crate::sink::FindingSink;
use crate::token_view::TokenView;
use std::any::Any;
use std::time::{Duration, Instant};

/// Per-file summary a checker hands to the Whole-Program Joiner (I),
/// round-tripped through the Analyzer-Info sidecar (F) between runs.
pub trait FileInfo: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    /// Serializes to the opaque blob stored inside `<FileInfo check="...">`.
    fn serialize(&self) -> String;
}

/// The checker contract (spec §4.3). `run` must be pure over `tokens` plus
/// `settings` and re-entrant across threads operating on different token
/// views — no checker may hold state across calls that isn't reconstructed
/// fresh from its own `file_info`/`parse_file_info` round trip.
pub trait Checker: Send + Sync {
    /// Stable identity used for registration order, sidecar `check="..."`
    /// attributes, and dispatch-order logging.
    fn name(&self) -> &'static str;

    fn run(&self, tokens: &TokenView, settings: &Settings, sink: &mut FindingSink);

    /// Returns a checker-specific serialization used for cross-TU analysis.
    /// Must be deterministic. Default: no cross-TU contribution.
    fn file_info(&self, _tokens: &TokenView, _settings: &Settings, _cfg: &str) -> Option<Box<dyn FileInfo>> {
        None
    }

    /// Inverse of `file_info` when reloading from a sidecar blob.
    fn parse_file_info(&self, _blob: &str) -> Option<Box<dyn FileInfo>> {
        None
    }

    /// Called once after all files, seeing the union of per-file `FileInfo`
    /// records. Default: no whole-program pass.
    fn whole_program(&self, _infos: &[Box<dyn FileInfo>], _settings: &Settings, _sink: &mut FindingSink) {}
}

/// Explicit registry built at start-up (Design Notes §9), as opposed to
/// checkers self-registering via static constructors.
pub struct CheckerRegistry {
    checkers: Vec<Box<dyn Checker>>,
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        CheckerRegistry::new()
    }
}

impl CheckerRegistry {
    pub fn empty() -> Self {
        CheckerRegistry { checkers: Vec::new() }
    }

    /// The default built-in registry: currently just unused-function
    /// analysis, the only checker whose contract spec §4.3 actually spells
    /// out (the rest of cppcheck's ~100 checkers are out of this spec's
    /// budget, see spec §2's implementation-budget note).
    pub fn new() -> Self {
        let mut registry = CheckerRegistry::empty();
        registry.register(Box::new(unused_functions::UnusedFunctionsChecker::default()));
        registry
    }

    pub fn register(&mut self, checker: Box<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Checker>> {
        self.checkers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Checker> {
        self.checkers.iter().find(|c| c.name() == name).map(|c| c.as_ref())
    }

    /// Dispatches every checker in registration order against `tokens`,
    /// honoring the optional `checks_max_time` wall-clock budget (spec
    /// §4.3, §5): once exceeded, remaining checkers are skipped and a Debug
    /// finding records the short-circuit.
    pub fn run_all(&self, tokens: &TokenView, settings: &Settings, sink: &mut FindingSink) {
        let budget = settings.checks_max_time_seconds.map(Duration::from_secs);
        let start = Instant::now();
        for checker in &self.checkers {
            if let Some(budget) = budget {
                if start.elapsed() >= budget {
                    sink.report(
                        crate::types::Finding::new(
                            "checksMaxTime",
                            crate::types::Severity::Debug,
                            format!("Checker '{}' and later ones skipped: time budget exceeded", checker.name()),
                        )
                        .with_file0(tokens.file_name.clone()),
                    );
                    break;
                }
            }
            tracing::debug!(checker = checker.name(), file = %tokens.file_name, "running checker");
            checker.run(tokens, settings, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_unused_functions() {
        let registry = CheckerRegistry::new();
        assert!(registry.get("unusedFunctions").is_some());
    }

    #[test]
    fn register_preserves_insertion_order() {
        let mut registry = CheckerRegistry::empty();
        registry.register(Box::new(unused_functions::UnusedFunctionsChecker::default()));
        let names: Vec<_> = registry.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["unusedFunctions"]);
    }
}
