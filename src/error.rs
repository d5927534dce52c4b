//! Error taxonomy for the analysis pipeline.
//!
//! Cppcheck itself throws `InternalError` and a `TerminateException` across
//! the C++ call stack; here every fallible operation instead returns a
//! [`Result`], and the few places that genuinely need "abandon this file, keep
//! going" semantics construct an [`AnalysisError::Terminated`] and let the
//! caller decide what to do with it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("input error: {0}")]
    Input(String),

    #[error("syntax error in {file} at line {line}: {message}")]
    Syntax {
        file: String,
        line: i32,
        message: String,
    },

    #[error("preprocessor error in {file}: {message}")]
    Preprocessor { file: String, message: String },

    #[error("internal error in {checker}: {message}")]
    Internal { checker: String, message: String },

    #[error("addon '{addon}' failed: {message}")]
    Addon { addon: String, message: String },

    /// Raised to unwind out of a single file's analysis (timeout, signal,
    /// `--max-ctu-depth` exceeded, etc). Callers of [`crate::file_analyzer`]
    /// catch this at the per-file boundary and continue with the next file.
    #[error("analysis of {file} terminated: {reason}")]
    Terminated { file: String, reason: String },

    #[error("suppression list error: {0}")]
    Suppression(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
