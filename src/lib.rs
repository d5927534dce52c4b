//! # ccaudit
//!
//! A static analysis engine for C and C++ translation units: preprocessing
//! configuration enumeration, checker dispatch, suppression matching, and
//! cross-TU result caching.
//!
//! The engine is organized as a pipeline of small, explicitly-wired
//! components rather than a monolith with global state:
//!
//! - [`types`] — the location and finding data model shared by everything else.
//! - [`suppressions`] — the suppression store and its tri-state match algorithm.
//! - [`preprocessor`] — the translation-unit/configuration abstraction.
//! - [`token_view`] — the per-config token/symbol arena checkers read from.
//! - [`checkers`] — the checker trait and registry.
//! - [`analyzer_info`] — the incremental build directory's sidecar format.
//! - [`cache`] — the content-addressed result cache.
//! - [`sink`] — suppression application, deduplication, and exit-code bookkeeping.
//! - [`file_analyzer`] — orchestrates one file end to end.
//! - [`whole_program`] — the cross-TU join that runs after every file.
//! - [`executor`] — the worker-pool driver tying the above together.
//! - [`context`] — the explicit dependency bundle threaded through all of it.
//!
//! ## Quick start (library usage)
//!
//! ```rust,no_run
//! use ccaudit::context::AnalyzerContext;
//! use ccaudit::executor::{self, InputFile};
//!
//! let ctx = AnalyzerContext::new_default();
//! let files = vec![InputFile {
//!     file_name: "main.cpp".to_string(),
//!     source_text: std::fs::read_to_string("main.cpp").unwrap(),
//! }];
//! let sink = executor::run(&ctx, files);
//! for finding in sink.delivered() {
//!     println!("{}", finding.short_message);
//! }
//! std::process::exit(sink.exit_code() as i32);
//! ```

pub mod analyzer_info;
pub mod cache;
pub mod checkers;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod file_analyzer;
pub mod glob;
pub mod logging;
pub mod path_utils;
pub mod preprocessor;
pub mod sink;
pub mod suppressions;
pub mod token_view;
pub mod types;
pub mod whole_program;

pub use config::Settings;
pub use context::AnalyzerContext;
pub use error::{AnalysisError, Result};
pub use sink::FindingSink;
pub use types::{Certainty, Finding, Location, Severity};
