//! Explicit `AnalyzerContext` replacing the source's process-wide singletons
//! (`Check::instances()`, `TimerResults`, remark/location macro maps) per
//! Design Notes §9.

use crate::analyzer_info::FilesTxtAllocator;
use crate::checkers::CheckerRegistry;
use crate::config::Settings;
use crate::file_analyzer::SharedCache;
use crate::preprocessor::{PassthroughPreprocessor, Preprocessor};
use crate::suppressions::SuppressionStore;
use std::sync::atomic::{AtomicBool, AtomicU8};
use std::sync::Arc;

/// Everything the File Analyzer needs, threaded explicitly instead of
/// reached for through globals.
pub struct AnalyzerContext {
    pub settings: Settings,
    pub registry: Arc<CheckerRegistry>,
    pub suppressions: Arc<SuppressionStore>,
    pub cache: Option<Arc<SharedCache>>,
    /// Shared `files.txt` stem allocator for incremental build-dir mode;
    /// `None` when `settings.build_dir` is unset.
    pub files_txt: Option<Arc<FilesTxtAllocator>>,
    /// Auxiliary suppression list consulted at sink step 8 (spec §4.7),
    /// loaded from `settings.nofail_suppression_file` by the CLI driver (or
    /// any embedder) via [`AnalyzerContext::with_nofail_suppressions`].
    pub nofail_suppressions: Option<Arc<SuppressionStore>>,
    pub preprocessor: Box<dyn Preprocessor + Send + Sync>,
    /// Process-global terminate flag (spec §5 cancellation): checked at
    /// checker-granularity and at the configuration loop by the executor.
    pub cancellation: Arc<AtomicBool>,
    pub exit_code: Arc<AtomicU8>,
}

impl AnalyzerContext {
    pub fn new(settings: Settings, registry: CheckerRegistry, suppressions: SuppressionStore) -> Self {
        let cache = settings.cache_dir.as_ref().map(|dir| {
            let cache_path = dir.join("cache.xml");
            let loaded = crate::cache::ResultCache::load(&cache_path).unwrap_or_else(|err| {
                tracing::warn!(path = %cache_path.display(), error = %err, "result cache failed to parse, starting empty");
                crate::cache::ResultCache::new()
            });
            let shared = SharedCache::new(loaded);
            shared.lock().set_path_hint(cache_path);
            Arc::new(shared)
        });
        let files_txt = settings.build_dir.as_ref().map(|_| Arc::new(FilesTxtAllocator::new()));
        AnalyzerContext {
            settings,
            registry: Arc::new(registry),
            suppressions: Arc::new(suppressions),
            cache,
            files_txt,
            nofail_suppressions: None,
            preprocessor: Box::new(PassthroughPreprocessor),
            cancellation: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Wires an auxiliary "nofail" suppression store (spec §4.7 step 8):
    /// findings matched here still deliver, but don't escalate the exit
    /// code. Kept separate from [`Self::new`] since loading the file can
    /// fail and callers may want to decide how to report that.
    pub fn with_nofail_suppressions(mut self, store: SuppressionStore) -> Self {
        self.nofail_suppressions = Some(Arc::new(store));
        self
    }

    /// A context with default settings, the built-in checker registry, and
    /// an empty suppression store — used by tests and by embedders who just
    /// want the default pipeline.
    pub fn new_default() -> Self {
        AnalyzerContext::new(Settings::default(), CheckerRegistry::new(), SuppressionStore::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_has_unused_functions_checker() {
        let ctx = AnalyzerContext::new_default();
        assert!(ctx.registry.get("unusedFunctions").is_some());
    }

    #[test]
    fn cancellation_flag_round_trips() {
        let ctx = AnalyzerContext::new_default();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn with_nofail_suppressions_installs_a_store() {
        let ctx = AnalyzerContext::new_default();
        assert!(ctx.nofail_suppressions.is_none());
        let mut store = SuppressionStore::new();
        store.add(crate::suppressions::Suppression::for_error_id("unusedFunction"));
        let ctx = ctx.with_nofail_suppressions(store);
        assert!(ctx.nofail_suppressions.is_some());
    }
}
