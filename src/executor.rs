//! Concurrency driver (spec §5): a `std::thread`-based worker pool, one
//! thread per in-flight file, each running its own sequential configuration
//! loop. Workers own a local [`FindingSink`]; the driver joins them back
//! into a single sink via [`FindingSink::merge_from`] and folds the
//! Whole-Program Joiner's pass in afterward.

use crate::context::AnalyzerContext;
use crate::sink::FindingSink;
use crate::whole_program;
use std::sync::mpsc;
use std::thread;

/// One file to analyze: its name and in-memory source text. Reading from
/// disk is the caller's concern (the CLI driver or an embedder), keeping
/// this crate's core I/O-free per Design Notes §9.
pub struct InputFile {
    pub file_name: String,
    pub source_text: String,
}

/// Runs the full pipeline over `files`: per-file analysis fanned out across
/// `jobs` worker threads (spec §5's `-j` flag), joined into one
/// [`FindingSink`], then the whole-program pass.
///
/// Returns the joined sink; its `exit_code()` is the process's final exit
/// status (spec §4.7: the Finding Sink is the only place the exit code is
/// decided).
pub fn run(ctx: &AnalyzerContext, files: Vec<InputFile>) -> FindingSink {
    let jobs = ctx.settings.jobs.max(1);
    let (tx, rx) = mpsc::channel();

    // Distribute files round-robin into `jobs` chunks so each worker thread
    // processes a disjoint subset sequentially, per spec §5 ("parallel
    // across files, sequential within one file's configuration loop").
    let mut chunks: Vec<Vec<InputFile>> = (0..jobs).map(|_| Vec::new()).collect();
    for (i, file) in files.into_iter().enumerate() {
        chunks[i % jobs].push(file);
    }

    thread::scope(|scope| {
        for chunk in chunks {
            let tx = tx.clone();
            scope.spawn(move || {
                let mut worker_sink = FindingSink::new(
                    ctx.settings.clone(),
                    ctx.suppressions.clone(),
                    ctx.exit_code.clone(),
                );
                if let Some(nofail) = ctx.nofail_suppressions.clone() {
                    worker_sink = worker_sink.with_nofail_suppressions(nofail);
                }
                let mut worker_file_infos = Vec::new();

                for (index, file) in chunk.into_iter().enumerate() {
                    if ctx.is_cancelled() {
                        break;
                    }
                    match crate::file_analyzer::analyze(
                        ctx,
                        &file.file_name,
                        index as u32,
                        &file.source_text,
                        &mut worker_sink,
                    ) {
                        Ok(output) => worker_file_infos.push(output.file_infos),
                        Err(err) => {
                            tracing::warn!(file = %file.file_name, error = %err, "file analysis failed");
                        }
                    }
                }

                let _ = tx.send((worker_sink, worker_file_infos));
            });
        }
    });
    drop(tx);

    let mut joined = FindingSink::new(ctx.settings.clone(), ctx.suppressions.clone(), ctx.exit_code.clone());
    if let Some(nofail) = ctx.nofail_suppressions.clone() {
        joined = joined.with_nofail_suppressions(nofail);
    }
    let mut all_file_infos = Vec::new();
    for (worker_sink, file_infos) in rx {
        joined.merge_from(worker_sink);
        all_file_infos.extend(file_infos);
    }

    if let Some(build_dir) = ctx.settings.build_dir.clone() {
        if let Err(err) = whole_program::join_from_build_dir(ctx, &build_dir, &mut joined) {
            tracing::warn!(error = %err, "whole-program sidecar join failed");
        }
    } else {
        whole_program::join_in_memory(&ctx.registry, &ctx.settings, all_file_infos, &mut joined);
    }

    // Global (non-inline, non-file-scoped) unmatched suppressions can only
    // be known for certain once every file has been analyzed, so they are
    // reported here rather than per-file (spec §4.2).
    for unmatched in ctx.suppressions.get_unmatched_global() {
        let query = crate::suppressions::SuppressionQuery {
            error_id: "unmatchedSuppression",
            file_name: &unmatched.file_name_glob,
            line: unmatched.line,
            hash: 0,
            symbols: Vec::new(),
            macro_names: &[],
        };
        if ctx.suppressions.is_suppressed_unmatched_suppression_finding(&query) {
            continue;
        }
        joined.report(
            crate::types::Finding::new(
                "unmatchedSuppression",
                crate::types::Severity::Information,
                format!("Unmatched suppression: {}", unmatched.error_id_glob),
            )
            .with_file0(unmatched.file_name_glob.clone()),
        );
    }

    if let Some(cache) = ctx.cache.as_ref() {
        if let Err(err) = cache.lock().save() {
            tracing::warn!(error = %err, "result cache save failed");
        }
    }

    joined
}
